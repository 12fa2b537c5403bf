//! `manifest.json`: what a persisted index was built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use cardrag_core::{CardDocument, IndexError};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedder_id: String,
    pub dim: usize,
    pub document_count: usize,
    /// blake3 over the document contents in corpus order.
    pub corpus_digest: String,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn new(embedder_id: &str, dim: usize, corpus: &[CardDocument]) -> Self {
        Self {
            embedder_id: embedder_id.to_string(),
            dim,
            document_count: corpus.len(),
            corpus_digest: corpus_digest(corpus),
            built_at: Utc::now(),
        }
    }

    pub fn read(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }
        let raw = std::fs::read_to_string(&path).map_err(IndexError::storage)?;
        serde_json::from_str(&raw).map_err(|e| IndexError::Storage(format!("corrupt {}: {}", path.display(), e)))
    }

    pub fn write(&self, dir: &Path) -> Result<(), IndexError> {
        let raw = serde_json::to_string_pretty(self).map_err(IndexError::storage)?;
        std::fs::write(dir.join(MANIFEST_FILE), raw).map_err(IndexError::storage)
    }
}

pub fn corpus_digest(corpus: &[CardDocument]) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in corpus {
        hasher.update(doc.card_name().as_bytes());
        hasher.update(&[0]);
        hasher.update(doc.content.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
