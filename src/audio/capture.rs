// Microphone capture pipeline
//
// Frames from the input device are re-blocked to a fixed size, amplified,
// measured for display loudness, encoded, and handed to the transport without
// waiting on delivery.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::codec::{create_pcm_blob, PcmBlob};

/// Tuning for the capture pipeline
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate tagged onto outgoing blobs
    pub sample_rate: u32,
    /// Samples per processing block
    pub block_size: usize,
    /// Fixed gain applied before metering and encoding (quiet mobile mics)
    pub input_gain: f32,
    /// Multiplier mapping RMS onto the 0..1 display range
    pub loudness_scale: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            block_size: 4096,
            input_gain: 1.2,
            loudness_scale: 6.0,
        }
    }
}

/// One processed block, ready to send
#[derive(Debug, Clone)]
pub struct CapturedBlock {
    /// Display loudness in [0.0, 1.0]
    pub loudness: f32,
    pub blob: PcmBlob,
}

/// Root-mean-square amplitude of a block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Turns device frames into transport-ready blocks
pub struct CapturePipeline {
    config: CaptureConfig,
    pending: Vec<f32>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig) -> Self {
        let pending = Vec::with_capacity(config.block_size);
        Self { config, pending }
    }

    /// Process one full block
    pub fn process_block(&self, block: &[f32]) -> CapturedBlock {
        let gained: Vec<f32> = block.iter().map(|s| s * self.config.input_gain).collect();
        let loudness = (rms(&gained) * self.config.loudness_scale).min(1.0);

        CapturedBlock {
            loudness,
            blob: create_pcm_blob(&gained, self.config.sample_rate),
        }
    }

    /// Feed raw device samples, returning every block that became complete
    ///
    /// At most one partial block is held between calls.
    pub fn push_samples(&mut self, samples: &[f32]) -> Vec<CapturedBlock> {
        let block_size = self.config.block_size.max(1);
        let mut blocks = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let take = (block_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == block_size {
                blocks.push(self.process_block(&self.pending));
                self.pending.clear();
            }
        }

        blocks
    }

    /// Zero-pad and process the held partial block, if any
    pub fn flush(&mut self) -> Option<CapturedBlock> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.resize(self.config.block_size.max(1), 0.0);
        let block = self.process_block(&self.pending);
        self.pending.clear();
        Some(block)
    }

    /// Run the pipeline until the frame stream ends or the transport goes away
    ///
    /// `on_loudness` is called once per block. Sends are fire-and-forget: a
    /// closed transport ends the loop, delivery errors surface elsewhere.
    /// When the frame stream ends, the trailing partial block is padded with
    /// silence and sent.
    pub fn spawn<T, F>(
        mut self,
        mut frames: mpsc::Receiver<AudioFrame>,
        media: mpsc::UnboundedSender<T>,
        on_loudness: F,
    ) -> JoinHandle<()>
    where
        T: From<PcmBlob> + Send + 'static,
        F: Fn(f32) + Send + 'static,
    {
        tokio::spawn(async move {
            info!(
                "Capture pipeline started ({}Hz, {}-sample blocks, gain {:.2})",
                self.config.sample_rate, self.config.block_size, self.config.input_gain
            );

            let mut sent: u64 = 0;
            'frames: while let Some(frame) = frames.recv().await {
                if frame.sample_rate != self.config.sample_rate {
                    warn!(
                        "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                        self.config.sample_rate, frame.sample_rate
                    );
                    continue;
                }

                for block in self.push_samples(&frame.samples) {
                    on_loudness(block.loudness);
                    if media.send(T::from(block.blob)).is_err() {
                        debug!("Transport closed, stopping capture");
                        break 'frames;
                    }
                    sent += 1;
                }
            }

            if !media.is_closed() {
                if let Some(block) = self.flush() {
                    on_loudness(block.loudness);
                    if media.send(T::from(block.blob)).is_ok() {
                        sent += 1;
                    }
                }
            }

            info!("Capture pipeline stopped after {} blocks", sent);
        })
    }
}
