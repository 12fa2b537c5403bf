use cardrag_core::ScoredMatch;

use crate::table::IndexEntry;

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 { return 0.0; }
	dot / (na * nb)
}

/// Score every entry against `query` and keep the best `k`.
///
/// Descending similarity; equal scores keep corpus order.
pub fn rank(entries: &[IndexEntry], query: &[f32], k: usize) -> Vec<ScoredMatch> {
	if k == 0 { return Vec::new(); }
	let mut scored: Vec<ScoredMatch> = entries
		.iter()
		.map(|e| ScoredMatch { document: e.document.clone(), score: cosine(query, &e.vector), ordinal: e.ordinal })
		.collect();
	scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.ordinal.cmp(&b.ordinal)));
	scored.truncate(k);
	scored
}

#[cfg(test)]
mod tests {
	use super::*;
	use cardrag_core::{CardDocument, CardMetadata};

	fn entry(ordinal: usize, name: &str, vector: Vec<f32>) -> IndexEntry {
		let metadata = CardMetadata {
			card_name: name.to_string(),
			bank: String::new(),
			annual_fee: 0,
			requires_app_switch: false,
			app_switch_info: String::new(),
			start_date: String::new(),
			end_date: String::new(),
			notes: String::new(),
		};
		IndexEntry { ordinal, document: CardDocument { content: name.to_string(), metadata }, vector }
	}

	#[test]
	fn ties_break_by_ordinal() {
		let entries = vec![
			entry(0, "a", vec![0.0, 1.0]),
			entry(1, "b", vec![1.0, 0.0]),
			entry(2, "c", vec![1.0, 0.0]),
		];
		let hits = rank(&entries, &[1.0, 0.0], 3);
		let names: Vec<&str> = hits.iter().map(|h| h.card_name()).collect();
		assert_eq!(names, vec!["b", "c", "a"]);
	}

	#[test]
	fn k_larger_than_corpus_returns_all() {
		let entries = vec![entry(0, "a", vec![1.0]), entry(1, "b", vec![0.5])];
		assert_eq!(rank(&entries, &[1.0], 10).len(), 2);
		assert!(rank(&entries, &[1.0], 0).is_empty());
	}

	#[test]
	fn zero_vector_scores_zero() {
		assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
	}
}
