use chrono::{DateTime, Utc};
use serde::Serialize;

use super::transcript::{Role, Utterance};

/// Lifecycle state of the voice session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Closing,
    /// Transient failure outcome; always followed by `Idle`
    Error,
}

/// The caption currently shown under the waveform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtitle {
    pub role: Role,
    pub text: String,
}

/// Immutable view of the session published after every transition
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// Streaming with the live service
    pub is_live: bool,

    /// Handshake in progress
    pub is_connecting: bool,

    /// Synthesized speech is (or is about to be) audible
    pub is_ai_speaking: bool,

    /// Display loudness of the microphone (0.0 to 1.0)
    pub mic_volume: f32,

    pub subtitle: Option<Subtitle>,

    /// Finalized utterances, oldest first
    pub history: Vec<Utterance>,

    pub session_id: Option<String>,

    /// When the current session went live
    pub started_at: Option<DateTime<Utc>>,

    /// User-facing reason the last session ended abnormally
    pub last_error: Option<String>,
}
