use anyhow::Result;
use candle_core::{DType, Tensor};

/// Average of the token states whose mask is set: `[B,T,H] -> [B,H]`.
pub fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    hidden.dims3()?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// Scale each row of `[B,H]` to unit length.
pub fn l2_normalize(rows: &Tensor) -> Result<Tensor> {
    let eps = match rows.dtype() { DType::F16 | DType::BF16 => 1e-6f32, _ => 1e-12f32 };
    let norm = rows.sqr()?.sum_keepdim(1)?.sqrt()?;
    let floor = Tensor::full(eps, norm.dims(), norm.device())?.to_dtype(norm.dtype())?;
    Ok(rows.broadcast_div(&norm.maximum(&floor)?)?)
}

/// Sentence embeddings from encoder output: masked mean, then L2 norm.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    l2_normalize(&mean_pool(hidden, attention_mask)?)
}
