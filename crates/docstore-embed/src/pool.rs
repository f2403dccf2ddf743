use anyhow::{ensure, Result};
use candle_core::Tensor;

/// Mean of the unmasked token states, L2-normalized per row: `[B,T,H] -> [B,H]`.
///
/// Rows whose mask is all zero come out as zero vectors rather than NaN.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, tokens, hidden_dim) = match hidden.dims() {
        [b, t, h] => (*b, *t, *h),
        other => anyhow::bail!("hidden shape must be [B,T,H], got {other:?}"),
    };
    ensure!(
        attention_mask.dims() == [batch, tokens],
        "mask shape {:?} does not match hidden {:?}",
        attention_mask.dims(),
        hidden.dims()
    );
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = mask.sum_keepdim(1)?.clamp(1f32, f32::MAX)?;
    let mean = summed.broadcast_div(&counts)?;
    let norms = mean.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12f32, f32::MAX)?;
    let pooled = mean.broadcast_div(&norms)?;
    ensure!(pooled.dims() == [batch, hidden_dim], "pooled shape mismatch: {:?}", pooled.dims());
    Ok(pooled)
}
