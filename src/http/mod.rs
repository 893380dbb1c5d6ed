//! HTTP API server for external control
//!
//! This module provides a REST API around the voice session:
//! - POST /voice/start - Start a live session
//! - POST /voice/stop - Hang up
//! - GET /voice/status - Current session snapshot
//! - GET /context - Location and local data for the next session
//! - PUT /language - Change the conversation language
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ContextResponse, ErrorResponse, LanguageRequest, LanguageResponse};
pub use routes::create_router;
pub use state::AppState;
