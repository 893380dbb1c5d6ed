use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;

/// Configuration for a live voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Conversation model requested from the live service
    pub model: String,

    /// Prebuilt voice used for synthesized speech
    pub voice_name: String,

    /// Sample rate of inbound speech audio (the live service emits 24kHz)
    pub output_sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Finalized utterances kept in the rolling history
    pub history_limit: usize,

    /// Microphone capture tuning
    #[serde(skip)]
    pub capture: CaptureConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            output_sample_rate: 24000,
            channels: 1,
            history_limit: 10,
            capture: CaptureConfig::default(),
        }
    }
}
