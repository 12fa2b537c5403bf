//! Embedding functions for the card index.
//!
//! `get_default_embedder` picks the backend from configuration. Setting
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder, which keeps tests
//! and development fast and deterministic.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use cardrag_core::config::{resolve_with_base, EmbeddingBackend, EmbeddingConfig};
use cardrag_core::Embedder;

mod bge;
mod hashing;
mod pool;
mod tokenize;

pub use bge::BgeM3Embedder;
pub use hashing::HashingEmbedder;
pub use pool::masked_mean_l2;

pub fn get_default_embedder(config: &EmbeddingConfig, base_dir: &Path) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || config.backend == EmbeddingBackend::Hashing {
        info!(dim = config.dim, "using hashing embedder");
        return Ok(Arc::new(HashingEmbedder::new(config.dim, config.max_len)));
    }
    let model_dir = resolve_model_dir(config, base_dir)?;
    Ok(Arc::new(BgeM3Embedder::new(&model_dir, config.max_len)?))
}

fn resolve_model_dir(config: &EmbeddingConfig, base_dir: &Path) -> Result<PathBuf> {
    if let Some(dir) = &config.model_dir {
        let p = resolve_with_base(base_dir, dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("configured embedding.model_dir {} does not exist", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using {}", var); return Ok(p); } }
    }
    let default = base_dir.join("models/bge-m3"); if default.exists() { return Ok(default); }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
