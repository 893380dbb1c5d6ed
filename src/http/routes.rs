use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/voice/start", post(handlers::start_session))
        .route("/voice/stop", post(handlers::stop_session))
        .route("/voice/status", get(handlers::session_status))
        // Context for the next session
        .route("/context", get(handlers::get_context))
        .route("/language", put(handlers::set_language))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
