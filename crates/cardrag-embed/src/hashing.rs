//! Deterministic feature-hashing embedder.
//!
//! Features are lower-cased character unigrams and bigrams over the
//! alphanumeric characters of the text, so it works for CJK text that has
//! no whitespace. Only the first `max_len` such characters count. Vectors
//! are L2-normalised.

use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use cardrag_core::Embedder;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 1.5;

pub struct HashingEmbedder {
    dim: usize,
    max_len: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize, max_len: usize) -> Self {
        let dim = dim.max(1);
        let max_len = max_len.max(1);
        Self { dim, max_len, id: format!("hashing:ngram12:d{}:c{}", dim, max_len) }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        ((h as usize) % self.dim, sign)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let chars: Vec<char> = text
            .chars()
            .flat_map(char::to_lowercase)
            .filter(|c| c.is_alphanumeric())
            .take(self.max_len)
            .collect();
        let mut buf = [0u8; 8];
        for c in &chars {
            let (idx, sign) = self.bucket(c.encode_utf8(&mut buf));
            v[idx] += sign * UNIGRAM_WEIGHT;
        }
        for pair in chars.windows(2) {
            let bigram: String = pair.iter().collect();
            let (idx, sign) = self.bucket(&bigram);
            v[idx] += sign * BIGRAM_WEIGHT;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[test]
    fn shared_characters_score_higher() {
        let e = HashingEmbedder::new(256, 128);
        let q = e.embed("中油加油").unwrap();
        let near = e.embed("中油聯名卡 加油回饋").unwrap();
        let far = e.embed("網購 蝦皮 momo").unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let e = HashingEmbedder::new(64, 128);
        assert_eq!(e.embed("Netflix!").unwrap(), e.embed("netflix").unwrap());
    }

    #[test]
    fn id_tracks_dimension() {
        assert_eq!(HashingEmbedder::new(384, 256).id(), "hashing:ngram12:d384:c256");
    }

    #[test]
    fn text_past_max_len_is_ignored() {
        let e = HashingEmbedder::new(128, 4);
        assert_eq!(e.embed("國泰CUBE卡").unwrap(), e.embed("國泰CU").unwrap());
        assert_ne!(e.embed("國泰C").unwrap(), e.embed("國泰CU").unwrap());
    }
}
