//! Shared fakes for session integration tests
//!
//! Devices run against a manually advanced playback clock and the live
//! transport is a pair of in-memory channels the test drives directly.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use agri_voice::audio::{
    AudioBackend, AudioFrame, AudioSegment, InputBackend, OutputBackend, SegmentId,
};
use agri_voice::context::{
    ContextSnapshot, ContextStore, Coordinates, FixedGeolocation, Language, LocationData,
    SessionContext, SharedContext, StaticContextProvider,
};
use agri_voice::live::{
    CloseHandle, LiveConnection, LiveSetup, LiveTransport, RealtimeInput, ServerEvent,
};
use agri_voice::session::{SessionConfig, SessionEvent, VoiceSession};
use agri_voice::{Result, VoiceError};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Microphone whose frames the test pushes by hand
#[derive(Clone, Default)]
pub struct FakeInput {
    pub deny_permission: bool,
    pub running: Arc<Mutex<bool>>,
    pub frames: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
}

impl FakeInput {
    pub fn denied() -> Self {
        Self {
            deny_permission: true,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.frames.lock().unwrap().is_some()
    }

    /// Push one frame as if the device captured it
    pub async fn speak(&self, samples: Vec<f32>) {
        let sender = self.frames.lock().unwrap().clone();
        let sender = sender.expect("microphone is not open");
        sender
            .send(AudioFrame {
                samples,
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: 0,
            })
            .await
            .expect("capture pipeline stopped");
    }
}

#[async_trait]
impl AudioBackend for FakeInput {
    async fn resume(&mut self) -> Result<()> {
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    async fn suspend(&mut self) -> Result<()> {
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

#[async_trait]
impl InputBackend for FakeInput {
    async fn open_microphone(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.deny_permission {
            return Err(VoiceError::PermissionDenied);
        }
        let (tx, rx) = mpsc::channel(16);
        *self.frames.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn release_microphone(&mut self) {
        self.frames.lock().unwrap().take();
    }

    fn is_capturing(&self) -> bool {
        self.is_open()
    }
}

/// Speaker with a manual clock that records every play/stop call
#[derive(Clone, Default)]
pub struct FakeOutput {
    pub clock: Arc<Mutex<f64>>,
    pub running: Arc<Mutex<bool>>,
    pub played: Arc<Mutex<Vec<(SegmentId, f64, f64)>>>,
    pub stopped: Arc<Mutex<Vec<SegmentId>>>,
}

impl FakeOutput {
    pub fn set_time(&self, seconds: f64) {
        *self.clock.lock().unwrap() = seconds;
    }

    /// `(id, start, duration)` of every segment handed to the device
    pub fn played(&self) -> Vec<(SegmentId, f64, f64)> {
        self.played.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<SegmentId> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioBackend for FakeOutput {
    async fn resume(&mut self) -> Result<()> {
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    async fn suspend(&mut self) -> Result<()> {
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn name(&self) -> &str {
        "fake speaker"
    }
}

impl OutputBackend for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.clock.lock().unwrap()
    }

    fn play(&mut self, id: SegmentId, segment: &AudioSegment, start_at: f64) -> Result<()> {
        self.played
            .lock()
            .unwrap()
            .push((id, start_at, segment.duration()));
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        self.stopped.lock().unwrap().push(id);
    }
}

/// Service side of one fake connection
pub struct ServerSide {
    pub setup: LiveSetup,
    pub media: mpsc::UnboundedReceiver<RealtimeInput>,
    pub events: mpsc::UnboundedSender<ServerEvent>,
    pub closed: oneshot::Receiver<()>,
}

/// Transport that hands the service side of each connection to the test
#[derive(Clone, Default)]
pub struct ChannelTransport {
    pub reject: bool,
    pub connections: Arc<Mutex<Vec<ServerSide>>>,
}

impl ChannelTransport {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Take the service side of the most recent connection
    pub fn take_latest(&self) -> ServerSide {
        self.connections
            .lock()
            .unwrap()
            .pop()
            .expect("no connection was opened")
    }
}

#[async_trait]
impl LiveTransport for ChannelTransport {
    async fn connect(&self, setup: LiveSetup) -> Result<LiveConnection> {
        if self.reject {
            return Err(VoiceError::Connection("handshake rejected".to_string()));
        }

        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        self.connections.lock().unwrap().push(ServerSide {
            setup,
            media: media_rx,
            events: events_tx,
            closed: close_rx,
        });

        Ok(LiveConnection {
            media: media_tx,
            events: events_rx,
            closer: CloseHandle::new(close_tx),
        })
    }

    fn name(&self) -> &str {
        "channel transport"
    }
}

/// A session wired to fresh fakes
pub struct Harness {
    pub session: VoiceSession,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub input: FakeInput,
    pub output: FakeOutput,
    pub transport: ChannelTransport,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeInput::default(), ChannelTransport::default())
    }

    pub fn with(input: FakeInput, transport: ChannelTransport) -> Self {
        let output = FakeOutput::default();
        let (session, events) = VoiceSession::new(
            SessionConfig::default(),
            Box::new(input.clone()),
            Box::new(output.clone()),
            Arc::new(transport.clone()),
        );
        Self {
            session,
            events,
            input,
            output,
            transport,
        }
    }
}

pub fn fallback_location() -> LocationData {
    LocationData {
        coordinates: Coordinates {
            latitude: 19.0760,
            longitude: 72.8777,
        },
        place: Some("Regional Hub".to_string()),
        district: None,
    }
}

pub fn session_context(language: Language) -> SessionContext {
    SessionContext {
        location: fallback_location(),
        snapshot: ContextSnapshot::default(),
        language,
    }
}

pub fn shared_context() -> SharedContext {
    ContextStore::new(
        fallback_location(),
        Language::English,
        Arc::new(FixedGeolocation::new(None)),
        Arc::new(StaticContextProvider),
    )
    .shared()
}

/// Base64 of `seconds` of silent 24kHz mono PCM
pub fn speech_payload(seconds: f64) -> String {
    let frames = (seconds * 24000.0).round() as usize;
    agri_voice::audio::codec::encode(&vec![0u8; frames * 2])
}
