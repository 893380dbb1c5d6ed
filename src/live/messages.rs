use serde::{Deserialize, Serialize};

use crate::audio::PcmBlob;

/// Output modality requested from the conversation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Connection setup sent once when a session opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSetup {
    pub session_id: String,
    pub model: String,
    pub response_modalities: Vec<Modality>,
    /// Ask the service to stream transcripts of the user's speech
    pub input_audio_transcription: bool,
    /// Ask the service to stream transcripts of its own speech
    pub output_audio_transcription: bool,
    pub system_instruction: String,
    pub voice_name: String,
}

/// One captured block sent upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media: PcmBlob,
}

impl From<PcmBlob> for RealtimeInput {
    fn from(media: PcmBlob) -> Self {
        Self { media }
    }
}

/// Events pushed by the conversation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The user barged in; drop queued speech
    Interrupted,
    /// Fragment of the user's transcribed speech
    InputTranscription { text: String },
    /// Fragment of the model's transcribed speech
    OutputTranscription { text: String },
    /// The model finished its turn
    TurnComplete,
    /// Base64-encoded 24kHz PCM speech
    Audio { data: String },
    Error { message: String },
    Close,
}
