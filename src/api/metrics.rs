use axum::extract::State;

use crate::app_state::AppState;

/// Prometheus scrape surface for the request counter and latency histogram.
pub async fn metrics_text(State(state): State<AppState>) -> String {
    state.metrics.to_prometheus()
}
