//! Error types for the live voice pipeline

use thiserror::Error;

/// Result type alias for voice pipeline operations
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors that can occur while running a live voice session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// Microphone access was refused
    #[error("microphone permission denied")]
    PermissionDenied,

    /// An audio device context could not be created or resumed
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Handshake or mid-session transport failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed audio payload
    #[error("decode error: {0}")]
    Decode(String),

    /// External context data provider failure
    #[error("context fetch error: {0}")]
    ContextFetch(String),
}

impl VoiceError {
    /// Whether this error ends the session (as opposed to a single dropped block)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::DeviceUnavailable(_) | Self::Connection(_)
        )
    }
}

impl From<base64::DecodeError> for VoiceError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
