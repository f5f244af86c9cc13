pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::evaluation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Evaluation API
        .route("/api/v1/evaluate", post(handlers::handle_evaluate))
        .route(
            "/api/v1/evaluate/stream",
            post(handlers::handle_evaluate_stream),
        )
        .with_state(state)
}
