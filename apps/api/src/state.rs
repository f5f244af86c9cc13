use std::sync::Arc;

use crate::config::Config;
use crate::orchestrator::dispatch::EvaluationBackend;
use crate::orchestrator::token_bucket::TokenBucket;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable evaluation backend. Production: `AnthropicBackend`.
    pub backend: Arc<dyn EvaluationBackend>,
    /// The one piece of cross-request shared mutable state in the process.
    pub bucket: Arc<TokenBucket>,
    pub config: Config,
}
