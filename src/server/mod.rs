//! HTTP API consumed by the QC dashboard

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

use crate::CameraContext;

pub fn create_router(ctx: Arc<CameraContext>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/health", get(handlers::health))
        .route("/api/mode", post(handlers::set_mode))
        .route("/api/stream", get(handlers::stream))
        .route("/api/capture", post(handlers::capture))
        .route("/api/capture-jpeg", get(handlers::capture_jpeg))
        .route("/api/preview", get(handlers::preview))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
