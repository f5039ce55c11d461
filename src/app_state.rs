use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::metrics::Metrics;
use crate::models::SharedModel;

/// Shared handles for the request handlers, built once in `main`.
///
/// The model is injected here rather than held as process-global state so
/// tests can substitute a scripted implementation through the
/// `LanguageModel` trait.
#[derive(Clone)]
pub struct AppState {
    pub model: SharedModel,
    /// Identifier echoed in responses; cached so the health endpoint never
    /// touches the model itself.
    pub model_id: String,
    pub metrics: Arc<Metrics>,
    pub generation: GenerationConfig,
}

impl AppState {
    pub fn new(model: SharedModel, metrics: Arc<Metrics>, generation: GenerationConfig) -> Self {
        let model_id = model.model_id().to_string();
        Self {
            model,
            model_id,
            metrics,
            generation,
        }
    }
}
