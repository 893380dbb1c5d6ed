// Native microphone and speaker
//
// Each cpal stream lives on its own thread for as long as it is open, since
// streams cannot move between threads. The speaker clock counts the frames
// the device has actually rendered, so it stands still while suspended.

use std::collections::BTreeMap;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{
    AudioBackend, AudioBackendConfig, AudioFrame, AudioSegment, InputBackend, OutputBackend,
    SegmentId,
};
use crate::error::{Result, VoiceError};

/// A cpal stream parked on a dedicated thread until stopped
struct StreamThread {
    stop: std_mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl StreamThread {
    /// Build and start a stream on a new thread, waiting until it plays
    async fn start<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream
                        .play()
                        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Returns on stop or when the owner is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                stop: stop_tx,
                handle,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(VoiceError::DeviceUnavailable(format!(
                "{} thread exited before the stream started",
                name
            ))),
        }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Audio stream thread panicked");
        }
    }
}

/// Pick an f32 config at `sample_rate`, preferring `channels`
fn pick_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
    channels: u16,
) -> Option<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let candidates: Vec<SupportedStreamConfigRange> = ranges
        .filter(|c| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
        .collect();

    candidates
        .iter()
        .find(|c| c.channels() == channels)
        .or_else(|| candidates.first())
        .map(|c| c.clone().with_sample_rate(rate).config())
}

fn map_build_error(err: BuildStreamError) -> VoiceError {
    match err {
        BuildStreamError::BackendSpecific { err }
            if err.description.to_lowercase().contains("permission") =>
        {
            VoiceError::PermissionDenied
        }
        other => VoiceError::DeviceUnavailable(other.to_string()),
    }
}

/// Average interleaved channels down to mono
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Default system microphone
pub struct CpalInput {
    config: AudioBackendConfig,
    running: bool,
    stream: Option<StreamThread>,
}

impl CpalInput {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            running: false,
            stream: None,
        }
    }
}

fn build_input_stream(
    sample_rate: u32,
    channels: u16,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no input device available".to_string()))?;

    let ranges = device
        .supported_input_configs()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
    let config = pick_config(ranges, sample_rate, channels).ok_or_else(|| {
        VoiceError::DeviceUnavailable(format!("no {}Hz input config", sample_rate))
    })?;
    let device_channels = config.channels as usize;

    info!(
        "Opening microphone {} ({}Hz, {} channels)",
        device.name().unwrap_or_default(),
        sample_rate,
        device_channels
    );

    let mut captured: u64 = 0;
    let mut dropped: u64 = 0;
    device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples = downmix(data, device_channels);
                let timestamp_ms = captured * 1000 / u64::from(sample_rate);
                captured += samples.len() as u64;

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels: 1,
                    timestamp_ms,
                };
                if frames.try_send(frame).is_err() {
                    dropped += 1;
                    if dropped.is_power_of_two() {
                        warn!("Capture backlog, dropped {} frames", dropped);
                    }
                }
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .map_err(map_build_error)
}

#[async_trait]
impl AudioBackend for CpalInput {
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
        "system microphone"
    }
}

#[async_trait]
impl InputBackend for CpalInput {
    async fn open_microphone(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            warn!("Microphone already open, reopening");
            self.release_microphone().await;
        }

        let (tx, rx) = mpsc::channel(32);
        let sample_rate = self.config.input_sample_rate;
        let channels = self.config.channels;
        let stream = StreamThread::start("cpal-input", move || {
            build_input_stream(sample_rate, channels, tx)
        })
        .await?;

        self.stream = Some(stream);
        Ok(rx)
    }

    async fn release_microphone(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            info!("Released system microphone");
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

struct MixSegment {
    start_frame: u64,
    samples: Vec<f32>,
}

/// Sums scheduled mono segments into the device buffer frame by frame
#[derive(Default)]
pub struct PlaybackMixer {
    /// Frames rendered so far
    frame: u64,
    segments: BTreeMap<SegmentId, MixSegment>,
}

impl PlaybackMixer {
    pub fn rendered_frames(&self) -> u64 {
        self.frame
    }

    pub fn schedule(&mut self, id: SegmentId, start_frame: u64, samples: Vec<f32>) {
        self.segments.insert(
            id,
            MixSegment {
                start_frame,
                samples,
            },
        );
    }

    pub fn cancel(&mut self, id: SegmentId) -> bool {
        self.segments.remove(&id).is_some()
    }

    pub fn active(&self) -> usize {
        self.segments.len()
    }

    /// Fill an interleaved buffer, writing the same value to every channel
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let position = self.frame;
            let value: f32 = self
                .segments
                .values()
                .filter(|s| position >= s.start_frame)
                .filter_map(|s| s.samples.get((position - s.start_frame) as usize))
                .sum();
            frame.fill(value.clamp(-1.0, 1.0));
            self.frame += 1;
        }

        let now = self.frame;
        self.segments
            .retain(|_, s| s.start_frame + s.samples.len() as u64 > now);
    }
}

/// Default system speaker
pub struct CpalOutput {
    config: AudioBackendConfig,
    mixer: Arc<Mutex<PlaybackMixer>>,
    stream: Option<StreamThread>,
}

impl CpalOutput {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            mixer: Arc::new(Mutex::new(PlaybackMixer::default())),
            stream: None,
        }
    }
}

fn build_output_stream(
    sample_rate: u32,
    channels: u16,
    mixer: Arc<Mutex<PlaybackMixer>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no output device available".to_string()))?;

    let ranges = device
        .supported_output_configs()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
    let config = pick_config(ranges, sample_rate, channels).ok_or_else(|| {
        VoiceError::DeviceUnavailable(format!("no {}Hz output config", sample_rate))
    })?;
    let device_channels = config.channels as usize;

    info!(
        "Opening speaker {} ({}Hz, {} channels)",
        device.name().unwrap_or_default(),
        sample_rate,
        device_channels
    );

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match mixer.lock() {
                Ok(mut mixer) => mixer.render(data, device_channels),
                Err(_) => data.fill(0.0),
            },
            |err| error!("Speaker stream error: {}", err),
            None,
        )
        .map_err(map_build_error)
}

#[async_trait]
impl AudioBackend for CpalOutput {
    async fn resume(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let sample_rate = self.config.output_sample_rate;
        let channels = self.config.channels;
        let mixer = Arc::clone(&self.mixer);
        let stream = StreamThread::start("cpal-output", move || {
            build_output_stream(sample_rate, channels, mixer)
        })
        .await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn suspend(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            debug!("Speaker suspended at {:.3}s", self.current_time());
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "system speaker"
    }
}

impl OutputBackend for CpalOutput {
    fn current_time(&self) -> f64 {
        let rate = f64::from(self.config.output_sample_rate.max(1));
        self.mixer
            .lock()
            .map_or(0.0, |mixer| mixer.rendered_frames() as f64 / rate)
    }

    fn play(&mut self, id: SegmentId, segment: &AudioSegment, start_at: f64) -> Result<()> {
        if segment.sample_rate != self.config.output_sample_rate {
            return Err(VoiceError::Decode(format!(
                "segment is {}Hz, speaker is {}Hz",
                segment.sample_rate, self.config.output_sample_rate
            )));
        }

        let samples = downmix(&segment.samples, segment.channels as usize);
        let start_frame = (start_at * f64::from(self.config.output_sample_rate))
            .max(0.0)
            .round() as u64;

        self.mixer
            .lock()
            .map_err(|_| VoiceError::DeviceUnavailable("playback mixer poisoned".to_string()))?
            .schedule(id, start_frame, samples);
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            if mixer.cancel(id) {
                debug!("Cut segment {} at frame {}", id, mixer.rendered_frames());
            }
        }
    }
}
