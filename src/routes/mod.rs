//! Route modules for the multipart relay

pub mod health;
pub mod upload;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_part_bytes = state.config().upload.max_part_bytes;
    let request_timeout = state.config().server.request_timeout;

    Router::new()
        .route("/health-check", get(health::health_check))
        .nest("/upload", upload::router(max_part_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
