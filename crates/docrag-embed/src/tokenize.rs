use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer};

/// XLM-RoBERTa `<pad>` id.
pub const PAD_ID: u32 = 1;

/// Tokenize a batch into `[B, max_len]` id and attention-mask tensors,
/// truncating or padding every row to `max_len`.
///
/// Inputs may be single texts or `(query, passage)` pairs.
pub fn tokenize_batch<'s, E>(tokenizer: &Tokenizer, inputs: Vec<E>, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)>
where
    E: Into<EncodeInput<'s>>,
{
    let batch = inputs.len();
    let mut all_ids = Vec::with_capacity(batch * max_len);
    let mut all_mask = Vec::with_capacity(batch * max_len);
    for input in inputs {
        let enc = tokenizer.encode(input, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        ids.resize(max_len, PAD_ID);
        mask.resize(max_len, 0);
        all_ids.extend(ids);
        all_mask.extend(mask);
    }
    let input_ids = Tensor::from_vec(all_ids, (batch, max_len), device)?;
    let attention_mask = Tensor::from_vec(all_mask, (batch, max_len), device)?;
    Ok((input_ids, attention_mask))
}
