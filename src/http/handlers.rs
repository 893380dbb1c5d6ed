use super::state::AppState;
use crate::context::{ContextSnapshot, Language, LocationData};
use crate::error::VoiceError;
use crate::session::SessionSnapshot;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    /// Language code (en, hi, te, kn, ta, ml)
    pub language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageResponse {
    pub language: Language,
    pub display_name: String,
    /// A session is live; it keeps its language until restarted
    pub session_in_progress: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub location: LocationData,
    pub language: Language,
    pub snapshot: ContextSnapshot,
    pub refreshed_at: Option<DateTime<Utc>>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &VoiceError) -> StatusCode {
    match err {
        VoiceError::PermissionDenied => StatusCode::FORBIDDEN,
        e if e.is_fatal() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/start
/// Start a live session with the current context
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Start requested over HTTP");

    match state.session.start().await {
        Ok(()) => (StatusCode::OK, Json(state.session.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to start session: {}", e);
            error_response(status_for(&e), format!("Failed to start session: {}", e))
        }
    }
}

/// POST /voice/stop
/// Hang up and clear the conversation
pub async fn stop_session(State(state): State<AppState>) -> Response {
    info!("Stop requested over HTTP");

    match state.session.stop().await {
        Ok(()) => (StatusCode::OK, Json(state.session.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to stop session: {}", e);
            error_response(status_for(&e), format!("Failed to stop session: {}", e))
        }
    }
}

/// GET /voice/status
pub async fn session_status(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// GET /context
pub async fn get_context(State(state): State<AppState>) -> Json<ContextResponse> {
    let store = state.context.read().await;
    Json(ContextResponse {
        location: store.location().clone(),
        language: store.language(),
        snapshot: store.snapshot().clone(),
        refreshed_at: store.refreshed_at(),
    })
}

/// PUT /language
/// Change the conversation language and reload localized context
pub async fn set_language(
    State(state): State<AppState>,
    Json(req): Json<LanguageRequest>,
) -> Response {
    let language = match req.language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let mut store = state.context.write().await;
    if store.set_language(language) {
        info!("Language set to {}", language.code());
        if let Err(e) = store.refresh().await {
            warn!("Keeping context after language change: {}", e);
        }
    }

    (
        StatusCode::OK,
        Json(LanguageResponse {
            language,
            display_name: language.display_name().to_string(),
            session_in_progress: state.session.snapshot().is_live,
        }),
    )
        .into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
