//! Router assembly: test-taker and admin endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - Proficiency test endpoints under `/api/v1/proficiency/...`
/// - Config administration under `/api/v1/admin/proficiency-configs/...`
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Test-taker
        .route("/api/v1/proficiency/start", post(http::http_start_test))
        .route("/api/v1/proficiency/sessions/:id", get(http::http_get_session))
        .route("/api/v1/proficiency/sessions/:id/submit", post(http::http_submit_phase))
        .route("/api/v1/proficiency/results/:user_id", get(http::http_get_results))
        // Admin
        .route(
            "/api/v1/admin/proficiency-configs",
            get(http::http_list_configs).post(http::http_create_config),
        )
        .route("/api/v1/admin/proficiency-configs/validate", post(http::http_validate_config))
        .route(
            "/api/v1/admin/proficiency-configs/:id",
            get(http::http_get_config).put(http::http_update_config),
        )
        .route("/api/v1/admin/proficiency-configs/:id/activate", post(http::http_activate_config))
        .route("/api/v1/admin/proficiency-configs/:id/deactivate", post(http::http_deactivate_config))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
