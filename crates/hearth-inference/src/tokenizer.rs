use crate::tensor::Tensor;
use hearth_core::HearthResult;

/// Converts between text and a sequence model's token representation.
pub trait Tokenizer: Send + Sync {
    /// Encode `text` into token ids.
    fn encode(&self, text: &str) -> HearthResult<Vec<i64>>;

    /// Decode a model output tensor into at most `max_tokens` tokens of text.
    fn decode(&self, output: &Tensor, max_tokens: usize) -> HearthResult<String>;
}
