use std::path::Path;

use cardrag_core::config::{EmbeddingBackend, EmbeddingConfig};
use cardrag_core::Embedder;
use cardrag_embed::get_default_embedder;

#[test]
fn hashing_embedder_shapes_and_determinism() {
    let config = EmbeddingConfig { backend: EmbeddingBackend::Hashing, model_dir: None, dim: 384, max_len: 256 };
    let embedder = get_default_embedder(&config, Path::new(".")).expect("embedder");
    let texts = vec!["中國信託中油聯名卡".to_string(), "中國信託中油聯名卡".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384, "embedding dim follows config");
    assert_eq!(embedder.dim(), 384);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn missing_model_dir_is_an_error() {
    let config = EmbeddingConfig { backend: EmbeddingBackend::BgeM3, model_dir: Some("/nonexistent/bge-m3".to_string()), dim: 1024, max_len: 256 };
    if std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok() { return; }
    assert!(get_default_embedder(&config, Path::new(".")).is_err());
}
