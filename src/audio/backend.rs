use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Identifier of a segment handed to an output device
pub type SegmentId = u64;

/// A block of captured microphone audio (f32, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Decoded, ready-to-play synthesized speech
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Normalized samples, interleaved by channel
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioSegment {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Configuration for the audio device contexts
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Microphone sample rate (the live service expects 16kHz)
    pub input_sample_rate: u32,
    /// Playback sample rate (the live service emits 24kHz)
    pub output_sample_rate: u32,
    /// Channel count on both sides (1 = mono)
    pub channels: u16,
    /// Samples per captured block
    pub block_size: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            channels: 1,
            block_size: 4096,
        }
    }
}

/// An audio device context
///
/// Contexts are created once per client and reused across sessions: a session
/// resumes them on start and suspends them on stop, never tears them down.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Bring the context into a running state
    async fn resume(&mut self) -> Result<()>;

    /// Suspend the context, keeping it available for the next session
    async fn suspend(&mut self) -> Result<()>;

    /// Check if the context is currently running
    fn is_running(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Microphone side of the device pair
#[async_trait]
pub trait InputBackend: AudioBackend {
    /// Acquire the microphone and start streaming frames
    ///
    /// Fails with `PermissionDenied` when access is refused.
    async fn open_microphone(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Release the microphone stream (no-op if not open)
    async fn release_microphone(&mut self);

    /// Check if the microphone is currently held
    fn is_capturing(&self) -> bool;
}

/// Playback side of the device pair
///
/// The output context owns the monotonic playback clock that segment
/// scheduling is computed against.
pub trait OutputBackend: AudioBackend {
    /// Current playback clock time in seconds
    fn current_time(&self) -> f64;

    /// Schedule a segment to start sounding at `start_at` on the playback clock
    fn play(&mut self, id: SegmentId, segment: &AudioSegment, start_at: f64) -> Result<()>;

    /// Stop a scheduled or sounding segment immediately
    fn stop(&mut self, id: SegmentId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_duration_mono() {
        let segment = AudioSegment {
            samples: vec![0.0; 24000],
            sample_rate: 24000,
            channels: 1,
        };
        assert_eq!(segment.frames(), 24000);
        assert!((segment.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_duration_stereo() {
        let segment = AudioSegment {
            samples: vec![0.0; 4800],
            sample_rate: 24000,
            channels: 2,
        };
        assert_eq!(segment.frames(), 2400);
        assert!((segment.duration() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_backend_config_default() {
        let config = AudioBackendConfig::default();
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.block_size, 4096);
    }
}
