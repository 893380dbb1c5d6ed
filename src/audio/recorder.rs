// WAV-recording output device
//
// Plays scheduled segments "into" a WAV file: audio is committed to disk as
// the playback clock passes it, silence fills gaps between segments, and a
// stopped segment is cut at the moment it was stopped. The clock only runs
// while the device is resumed, so idle time between sessions is not recorded.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::backend::{
    AudioBackend, AudioBackendConfig, AudioSegment, OutputBackend, SegmentId,
};
use crate::error::{Result, VoiceError};

/// Source of playback clock time in seconds
pub type ClockFn = Arc<dyn Fn() -> f64 + Send + Sync>;

struct PendingSegment {
    start_frame: u64,
    samples: Vec<f32>,
}

/// Output device that records playback to a WAV file
pub struct WavRecorderOutput {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    clock: ClockFn,
    /// Raw clock reading when the device was last suspended
    paused_at: Option<f64>,
    paused_total: f64,
    running: bool,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    written_frames: u64,
    pending: BTreeMap<SegmentId, PendingSegment>,
}

impl WavRecorderOutput {
    /// Create a recorder driven by a monotonic clock starting now
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Self {
        let epoch = Instant::now();
        Self::with_clock(
            path,
            sample_rate,
            channels,
            Arc::new(move || epoch.elapsed().as_secs_f64()),
        )
    }

    /// Create a recorder at the configured output format
    pub fn from_config(path: impl Into<PathBuf>, config: &AudioBackendConfig) -> Self {
        Self::new(path, config.output_sample_rate, config.channels)
    }

    pub fn with_clock(
        path: impl Into<PathBuf>,
        sample_rate: u32,
        channels: u16,
        clock: ClockFn,
    ) -> Self {
        let paused_at = Some(clock());
        Self {
            path: path.into(),
            sample_rate,
            channels: channels.max(1),
            clock,
            paused_at,
            paused_total: 0.0,
            running: false,
            writer: None,
            written_frames: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Playback time with suspended intervals removed
    fn elapsed(&self) -> f64 {
        let raw = self.paused_at.unwrap_or_else(|| (self.clock)());
        raw - self.paused_total
    }

    fn now_frame(&self) -> u64 {
        (self.elapsed() * f64::from(self.sample_rate)).max(0.0).round() as u64
    }

    fn open_writer(&mut self) -> anyhow::Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&self.path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", self.path))?;

        info!(
            "Recording playback to {} ({}Hz, {} channels)",
            self.path.display(),
            self.sample_rate,
            self.channels
        );

        self.writer = Some(writer);
        Ok(())
    }

    /// Write everything that has sounded up to `until` (in frames)
    fn commit_until(&mut self, until: u64) -> anyhow::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let channels = self.channels as usize;

        while let Some(mut entry) = self.pending.first_entry() {
            let segment = entry.get_mut();
            if segment.start_frame >= until {
                break;
            }

            while self.written_frames < segment.start_frame {
                for _ in 0..channels {
                    writer.write_sample(0i16)?;
                }
                self.written_frames += 1;
            }

            let total = (segment.samples.len() / channels) as u64;
            let end = segment.start_frame + total;
            let from = self.written_frames.saturating_sub(segment.start_frame).min(total);
            let to = end.min(until) - segment.start_frame;

            for frame in from..to {
                let offset = frame as usize * channels;
                for sample in &segment.samples[offset..offset + channels] {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
                }
            }
            self.written_frames = self.written_frames.max(segment.start_frame + to);

            if to < total {
                break;
            }
            entry.remove();
        }

        Ok(())
    }

    /// Commit all scheduled audio and finalize the file
    pub fn finish(&mut self) -> anyhow::Result<u64> {
        self.commit_until(u64::MAX)?;
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(self.written_frames)
    }

    pub fn written_frames(&self) -> u64 {
        self.written_frames
    }
}

#[async_trait]
impl AudioBackend for WavRecorderOutput {
    async fn resume(&mut self) -> Result<()> {
        self.open_writer()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;
        if let Some(at) = self.paused_at.take() {
            self.paused_total += (self.clock)() - at;
        }
        self.running = true;
        Ok(())
    }

    async fn suspend(&mut self) -> Result<()> {
        let now = self.now_frame();
        self.commit_until(now)
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
        }
        if self.paused_at.is_none() {
            self.paused_at = Some((self.clock)());
        }
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn name(&self) -> &str {
        "WAV playback recorder"
    }
}

impl OutputBackend for WavRecorderOutput {
    fn current_time(&self) -> f64 {
        self.elapsed()
    }

    fn play(&mut self, id: SegmentId, segment: &AudioSegment, start_at: f64) -> Result<()> {
        if segment.sample_rate != self.sample_rate || segment.channels != self.channels {
            return Err(VoiceError::Decode(format!(
                "segment is {}Hz/{}ch, device is {}Hz/{}ch",
                segment.sample_rate, segment.channels, self.sample_rate, self.channels
            )));
        }

        let now = self.now_frame();
        self.commit_until(now)
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;

        let start_frame = (start_at * f64::from(self.sample_rate)).max(0.0).round() as u64;
        self.pending.insert(
            id,
            PendingSegment {
                start_frame,
                samples: segment.samples.clone(),
            },
        );
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        let now = self.now_frame();
        if let Err(e) = self.commit_until(now) {
            warn!("Failed to commit playback before stop: {:#}", e);
        }
        if self.pending.remove(&id).is_some() {
            debug!("Cut segment {} at frame {}", id, now);
        }
    }
}

impl Drop for WavRecorderOutput {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.finish() {
                warn!("Failed to finalize playback recording on drop: {:#}", e);
            }
        }
    }
}
