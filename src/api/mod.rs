//! HTTP/WebSocket surface.
//!
//! ## Endpoints
//!
//! - `GET  /api/health` - liveness probe
//! - `POST /api/create-test-data` - run a generation for a session
//! - `GET  /api/generation-status` - global generation status
//! - `GET  /api/generation-status/:session_id` - per-session status
//! - `GET  /api/session-info` - session overview
//! - `POST /api/generation-pause/:session_id` - pause a session's run
//! - `POST /api/generation-resume/:session_id` - resume a paused run
//! - `GET  /ws` - push channel for progress events

pub mod generation_routes;
pub mod ws;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::orchestrator::GenerationOrchestrator;
use crate::session::SessionRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub orchestrator: GenerationOrchestrator,
}

/// Build the application router with CORS and request tracing.
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = cors_layer(allowed_origins);

    Router::new()
        .route("/api/health", get(generation_routes::health_check))
        .route(
            "/api/create-test-data",
            post(generation_routes::create_test_data),
        )
        .route(
            "/api/generation-status",
            get(generation_routes::generation_status),
        )
        .route(
            "/api/generation-status/:session_id",
            get(generation_routes::session_generation_status),
        )
        .route("/api/session-info", get(generation_routes::session_info))
        .route(
            "/api/generation-pause/:session_id",
            post(generation_routes::pause_generation),
        )
        .route(
            "/api/generation-resume/:session_id",
            post(generation_routes::resume_generation),
        )
        .route("/ws", get(ws::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
