use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::rate_limit;
use crate::AppState;

/// Generous enough for a full judge payload (source plus 50 capped cases).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/languages", get(handlers::languages))
        .route("/api/execute", post(handlers::execute))
        .route("/api/judge", post(handlers::judge))
        .route("/api/batch-judge", post(handlers::batch_judge))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::require_slot,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
