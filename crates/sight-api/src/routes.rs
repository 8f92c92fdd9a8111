//! API route definitions

use crate::handlers;
use crate::state::AppState;

use axum::{routing::get, Router};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.server.cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
    };

    Router::new()
        // Health & Metrics
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))

        // Live output
        .route("/stream", get(handlers::video_stream))
        .route("/events", get(handlers::events_ws))
        .route("/api/v1/frame", get(handlers::latest_frame))

        // User binding
        .route("/set-user/{uid}", get(handlers::set_user).post(handlers::set_user))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// TESTS
// ============================================================================
