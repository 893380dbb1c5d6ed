use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioBackendConfig, CaptureConfig};
use crate::context::{Coordinates, Language, LocationData};
use crate::session::SessionConfig;

/// Default configuration file, resolved relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/agri-voice";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub live: LiveConfig,
    pub location: LocationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "agri-voice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
    pub input_gain: f32,
    pub loudness_scale: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            channels: 1,
            block_size: 4096,
            input_gain: 1.2,
            loudness_scale: 6.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub nats_url: String,
    pub subject_prefix: String,
    pub model: String,
    pub voice_name: String,
    pub history_limit: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "live".to_string(),
            model: session.model,
            voice_name: session.voice_name,
            history_limit: session.history_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
    pub fallback_place: String,
    pub default_language: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fallback_latitude: 19.0760,
            fallback_longitude: 72.8777,
            fallback_place: "Regional Hub".to_string(),
            default_language: Language::English.code().to_string(),
        }
    }
}

impl Config {
    /// Load a config file (extension optional), then apply `AGRI_VOICE__*`
    /// environment overrides such as `AGRI_VOICE__LIVE__NATS_URL`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("AGRI_VOICE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config in {}", path))
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            model: self.live.model.clone(),
            voice_name: self.live.voice_name.clone(),
            output_sample_rate: self.audio.output_sample_rate,
            channels: self.audio.channels,
            history_limit: self.live.history_limit,
            capture: self.capture(),
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.input_sample_rate,
            block_size: self.audio.block_size,
            input_gain: self.audio.input_gain,
            loudness_scale: self.audio.loudness_scale,
        }
    }

    pub fn backend(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            input_sample_rate: self.audio.input_sample_rate,
            output_sample_rate: self.audio.output_sample_rate,
            channels: self.audio.channels,
            block_size: self.audio.block_size,
        }
    }

    pub fn fallback_location(&self) -> LocationData {
        LocationData {
            coordinates: Coordinates {
                latitude: self.location.fallback_latitude,
                longitude: self.location.fallback_longitude,
            },
            place: Some(self.location.fallback_place.clone()),
            district: None,
        }
    }

    pub fn language(&self) -> Language {
        Language::from_code(&self.location.default_language)
    }
}
