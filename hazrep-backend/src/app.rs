use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the primary axum router with the provided shared application state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/reports",
            post(handlers::reports::submit::submit).get(handlers::reports::list::list),
        )
        .route("/reports/{jobId}", get(handlers::reports::get::get))
        .route("/webhook", post(handlers::webhook::receive::receive))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(Extension(state))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}
