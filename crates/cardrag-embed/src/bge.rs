//! BGE-M3 (XLM-RoBERTa) sentence embeddings with candle.
//!
//! Expects a model directory with `tokenizer.json`, `config.json` and either
//! `model.safetensors` or `pytorch_model.bin`.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use cardrag_core::Embedder;

use crate::pool::masked_mean_l2;
use crate::tokenize::encode_batch;

/// Texts per forward pass.
const BATCH_SIZE: usize = 16;
const SLOW_TEXT_MS: u128 = 100;

pub struct BgeM3Embedder { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize, id: String }

fn pick_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => { info!("embedding on Metal"); return dev; }
            Err(e) => warn!(error = %e, "Metal unavailable, falling back to CPU"),
        }
    }
    info!("embedding on CPU");
    Device::Cpu
}

impl BgeM3Embedder {
    pub fn new(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = pick_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_raw = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_raw)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, max_len, "BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, id: format!("bge-m3:d{}", dim) })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = encode_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let rows: Vec<Vec<f32>> = masked_mean_l2(&hidden, &attention_mask)?.to_device(&Device::Cpu)?.to_vec2()?;
        if let Some(bad) = rows.iter().find(|r| r.len() != self.dim) {
            return Err(anyhow!("embedding width {} != {}", bad.len(), self.dim));
        }
        let elapsed = start.elapsed().as_millis();
        let per_text = elapsed / texts.len().max(1) as u128;
        if per_text > SLOW_TEXT_MS {
            warn!(elapsed_ms = elapsed as u64, texts = texts.len(), "slow embedding batch");
        } else {
            debug!(elapsed_ms = elapsed as u64, texts = texts.len(), "embedded batch");
        }
        Ok(rows)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        return Ok(candle_core::pickle::read_all(&pickle)?.into_iter().collect());
    }
    Err(anyhow!("no model weights under {}", model_dir.display()))
}

impl Embedder for BgeM3Embedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            out.extend(self.embed_chunk(chunk)?);
        }
        Ok(out)
    }
}
