pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;

pub use app_state::AppState;
pub use config::Config;
pub use error::{GenerationError, Result};
