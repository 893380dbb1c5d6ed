// WAV-file microphone
//
// Streams a WAV file in fixed-size blocks at real-time pace so a recorded
// question can stand in for a live microphone.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, InputBackend};
use crate::error::{Result, VoiceError};

/// A decoded WAV file, normalized to f32
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / 32768.0))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Convert to mono at the target rate
    ///
    /// Channels are averaged, then the signal is resampled if the file rate
    /// differs from `target_rate`.
    pub fn to_mono(&self, target_rate: u32) -> anyhow::Result<Vec<f32>> {
        let channels = self.channels.max(1) as usize;
        let mono: Vec<f32> = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        if self.sample_rate == target_rate {
            return Ok(mono);
        }
        resample(&mono, self.sample_rate, target_rate)
    }
}

/// Resample mono audio with an FFT resampler
///
/// The final partial chunk is zero-padded and the resampler delay is trimmed,
/// so the output holds `len * to / from` samples aligned with the input.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> anyhow::Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == 0 || to_rate == 0 {
        anyhow::bail!("Cannot resample {}Hz to {}Hz", from_rate, to_rate);
    }

    let chunk_size = 1024;
    let sub_chunks = 2;
    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| anyhow::anyhow!("Failed to create resampler: {}", e))?;

    let expected = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay + chunk_size);
    let mut offset = 0;

    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let chunk: Vec<f64> = (offset..offset + needed)
            .map(|i| samples.get(i).map_or(0.0, |&s| f64::from(s)))
            .collect();
        offset += needed;

        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| anyhow::anyhow!("Resampling failed: {}", e))?;
        output.extend_from_slice(&result[0]);
    }

    debug!(
        "Resampled {} samples at {}Hz to {} at {}Hz",
        samples.len(),
        from_rate,
        expected,
        to_rate
    );

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

/// Input device backed by a WAV file
pub struct WavFileInput {
    path: PathBuf,
    config: AudioBackendConfig,
    running: bool,
    stream_task: Option<JoinHandle<()>>,
}

impl WavFileInput {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            running: false,
            stream_task: None,
        }
    }

    fn load(&self) -> Result<Vec<f32>> {
        if let Err(e) = std::fs::metadata(&self.path) {
            return Err(match e.kind() {
                ErrorKind::PermissionDenied => VoiceError::PermissionDenied,
                _ => VoiceError::DeviceUnavailable(format!("{}: {}", self.path.display(), e)),
            });
        }

        AudioFile::open(&self.path)
            .and_then(|file| file.to_mono(self.config.input_sample_rate))
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))
    }
}

#[async_trait]
impl AudioBackend for WavFileInput {
    async fn resume(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    async fn suspend(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn name(&self) -> &str {
        "WAV file microphone"
    }
}

#[async_trait]
impl InputBackend for WavFileInput {
    async fn open_microphone(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream_task.is_some() {
            warn!("Microphone already open, reopening");
            self.release_microphone().await;
        }

        let samples = self.load()?;
        let (tx, rx) = mpsc::channel(16);

        let sample_rate = self.config.input_sample_rate;
        let block_size = self.config.block_size.max(1);
        let block_duration = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);

        info!(
            "Streaming {} as microphone ({} blocks of {})",
            self.path.display(),
            samples.len().div_ceil(block_size),
            block_size
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_duration);
            for (index, block) in samples.chunks(block_size).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate,
                    channels: 1,
                    timestamp_ms: (index * block_size) as u64 * 1000 / sample_rate as u64,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        self.stream_task = Some(task);
        Ok(rx)
    }

    async fn release_microphone(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
            info!("Released WAV file microphone");
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream_task.is_some()
    }
}
