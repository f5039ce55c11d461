use llm_inference_server::api;
use llm_inference_server::app_state::AppState;
use llm_inference_server::config::Config;
use llm_inference_server::metrics::Metrics;
use llm_inference_server::models::{LlamaChatModel, SamplingParams, SharedModel};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // HuggingFace tokenizers spawn their own thread pool, which interferes
    // with the Tokio runtime.
    std::env::set_var("TOKENIZERS_PARALLELISM", "false");

    dotenv::dotenv().ok();
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    tracing::info!("🚀 starting LLM inference server");

    let model = LlamaChatModel::load(&config.model.model_id, &config.model.revision).await?;
    let model: SharedModel = Arc::new(model);

    // First inference pays for shader compilation and allocator warm-up;
    // take that hit before accepting traffic.
    tracing::info!("warming up model...");
    let warmup_start = std::time::Instant::now();
    match model.encode("Hello") {
        Ok(ids) => {
            let params = SamplingParams {
                max_new_tokens: 5,
                ..SamplingParams::default()
            };
            if let Err(e) = model.generate(&ids, &params).await {
                tracing::warn!("warmup generation failed: {}", e);
            }
        }
        Err(e) => tracing::warn!("warmup encode failed: {}", e),
    }
    tracing::info!("model warmed up in {:?}", warmup_start.elapsed());

    let metrics = Arc::new(Metrics::new());
    let state = AppState::new(model, metrics, config.generation.clone());

    let app = api::create_router(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🌐 server listening on http://{}", addr);
    tracing::info!("available endpoints:");
    tracing::info!("  • GET  /health - health check");
    tracing::info!("  • POST /api/v1/generate - text generation");
    tracing::info!("  • GET  /metrics - Prometheus metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM as sent by container runtimes.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
