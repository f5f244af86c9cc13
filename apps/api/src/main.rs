mod config;
mod errors;
mod evaluation;
mod llm_client;
mod orchestrator;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::{AnthropicBackend, LlmClient};
use crate::orchestrator::token_bucket::TokenBucket;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Debrief API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client and evaluation backend
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    let backend = Arc::new(AnthropicBackend::new(llm));
    info!("LLM client initialized");

    // One token bucket per process, shared by every in-flight request
    let bucket = Arc::new(TokenBucket::new(config.tokens_per_minute));
    info!(
        "Token bucket initialized ({} tokens/minute)",
        config.tokens_per_minute
    );

    // Build app state
    let state = AppState {
        backend,
        bucket,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
