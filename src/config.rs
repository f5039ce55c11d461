use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Declarative per-request time budget, enforced by the HTTP layer.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub revision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generated-token budget applied when a request omits `max_length`.
    pub default_max_length: usize,
    /// Hard ceiling for `max_length`; requests above it are clamped.
    pub max_length_ceiling: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .unwrap_or(8080),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120),
            },
            model: ModelConfig {
                model_id: env::var("MODEL_ID")
                    .unwrap_or_else(|_| "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string()),
                revision: env::var("MODEL_REVISION").unwrap_or_else(|_| "main".to_string()),
            },
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_max_length: env::var("DEFAULT_MAX_LENGTH")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            max_length_ceiling: env::var("MAX_LENGTH_CEILING")
                .unwrap_or_else(|_| "512".to_string())
                .parse()
                .unwrap_or(512),
            temperature: env::var("GEN_TEMPERATURE")
                .unwrap_or_else(|_| "0.8".to_string())
                .parse()
                .unwrap_or(0.8),
            top_p: env::var("GEN_TOP_P")
                .unwrap_or_else(|_| "0.9".to_string())
                .parse()
                .unwrap_or(0.9),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_defaults_match_service_contract() {
        let config = GenerationConfig::default();
        assert_eq!(config.default_max_length, 50);
        assert_eq!(config.max_length_ceiling, 512);
        assert!((config.temperature - 0.8).abs() < f64::EPSILON);
        assert!((config.top_p - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn request_timeout_defaults_to_two_minutes() {
        let config = Config::default();
        assert_eq!(config.server.request_timeout_secs, 120);
    }
}
