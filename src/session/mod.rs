//! Live voice session management
//!
//! This module provides the `VoiceSession` actor that manages:
//! - Microphone capture and streaming to the live service
//! - Gapless playback of synthesized speech and barge-in handling
//! - Transcript aggregation and the rolling conversation history
//! - Snapshots of session state for the presentation layer

mod config;
mod runtime;
mod session;
mod snapshot;
mod transcript;

pub use config::SessionConfig;
pub use runtime::{spawn_session, SessionCommand, SessionHandle};
pub use session::{SessionEvent, VoiceSession};
pub use snapshot::{SessionSnapshot, SessionState, Subtitle};
pub use transcript::{ConversationHistory, Role, TranscriptAggregator, Utterance};
