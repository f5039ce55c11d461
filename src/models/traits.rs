use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;

/// Sampling controls handed to the model for one generation call.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    /// Budget of tokens to produce beyond the encoded prompt.
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 50,
            temperature: 0.8,
            top_p: 0.9,
        }
    }
}

/// Interface to the loaded causal language model.
///
/// The service drives this seam as encode -> generate -> decode and owns
/// nothing below it; tokenization and sampling belong to the implementation.
/// Implementations must be safe for concurrent read-only use: `generate`
/// takes `&self` and any per-request state (such as a KV cache) is local to
/// the call.
#[async_trait]
pub trait LanguageModel: Send + Sync + Debug {
    /// Encode text into the model's token representation.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Produce a token sequence from the encoded prompt.
    ///
    /// Returns the FULL output sequence, prompt tokens included, so the
    /// caller decodes one contiguous sequence. Generation stops at the
    /// end-of-sequence token or after `params.max_new_tokens`, whichever
    /// comes first.
    async fn generate(&self, input_ids: &[u32], params: &SamplingParams) -> Result<Vec<u32>>;

    /// Decode a token sequence back to text, special tokens stripped.
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Textual end-of-sequence marker, appended to prompts before encoding.
    fn eos_token(&self) -> &str;

    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;
}

pub type SharedModel = Arc<dyn LanguageModel>;
