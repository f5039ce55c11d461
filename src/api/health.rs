use axum::{Json, extract::State};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

/// Liveness report. Reads the identifier cached in `AppState` so it never
/// touches the model or tokenizer; there is no failure path.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: state.model_id.clone(),
    })
}
