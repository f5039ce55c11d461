pub mod llama;
pub mod traits;

pub use llama::LlamaChatModel;
pub use traits::{LanguageModel, SamplingParams, SharedModel};
