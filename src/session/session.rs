use super::config::SessionConfig;
use super::snapshot::{SessionSnapshot, SessionState, Subtitle};
use super::transcript::{ConversationHistory, Role, TranscriptAggregator, Utterance};
use crate::audio::{codec, CapturePipeline, InputBackend, OutputBackend, OutputScheduler};
use crate::context::{build_system_prompt, SessionContext};
use crate::error::{Result, VoiceError};
use crate::live::{CloseHandle, LiveConnection, LiveSetup, LiveTransport, Modality, ServerEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Work queued for the session actor by its own background tasks
///
/// Every event carries the generation of the connection that produced it so
/// stragglers from a closed connection are dropped.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Server { generation: u64, event: ServerEvent },
    Loudness { generation: u64, level: f32 },
}

/// Resources held only while a connection is open
struct ActiveLink {
    session_id: String,
    closer: CloseHandle,
    capture_task: JoinHandle<()>,
    pump_task: JoinHandle<()>,
}

/// One client's live voice session
///
/// Owns the device contexts, the output scheduler and the transcript state.
/// All methods are meant to be driven from a single task (see
/// [`super::spawn_session`]), so nothing here is locked.
pub struct VoiceSession {
    /// Session configuration
    config: SessionConfig,

    /// Microphone device context, reused across sessions
    input: Box<dyn InputBackend>,

    /// Playback scheduling over the output device context
    scheduler: OutputScheduler,

    /// Opens connections to the live service
    transport: Arc<dyn LiveTransport>,

    /// Feeds background task output back into the actor queue
    events_tx: mpsc::UnboundedSender<SessionEvent>,

    /// Latest snapshot for the presentation layer
    snapshots: watch::Sender<SessionSnapshot>,

    state: SessionState,
    generation: u64,
    link: Option<ActiveLink>,
    transcript: TranscriptAggregator,
    history: ConversationHistory,
    subtitle: Option<Subtitle>,
    ai_speaking: bool,
    mic_volume: f32,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl VoiceSession {
    /// Create an idle session; the returned receiver is the actor's event queue
    pub fn new(
        config: SessionConfig,
        input: Box<dyn InputBackend>,
        output: Box<dyn OutputBackend>,
        transport: Arc<dyn LiveTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let history = ConversationHistory::new(config.history_limit);

        info!(
            "Voice session ready (input: {}, output: {}, transport: {})",
            input.name(),
            output.name(),
            transport.name()
        );

        let session = Self {
            config,
            input,
            scheduler: OutputScheduler::new(output),
            transport,
            events_tx,
            snapshots,
            state: SessionState::Idle,
            generation: 0,
            link: None,
            transcript: TranscriptAggregator::new(),
            history,
            subtitle: None,
            ai_speaking: false,
            mic_volume: 0.0,
            started_at: None,
            last_error: None,
        };

        (session, events_rx)
    }

    /// Open a live session
    ///
    /// A no-op while already connecting or active. On failure the session is
    /// back in `Idle` with every device released, and the error is returned.
    pub async fn start(&mut self, context: SessionContext) -> Result<()> {
        if matches!(self.state, SessionState::Connecting | SessionState::Active) {
            warn!("Voice session already {:?}, ignoring start", self.state);
            return Ok(());
        }

        info!("Starting voice session ({})", context.language.code());

        self.state = SessionState::Connecting;
        self.subtitle = None;
        self.transcript.reset();
        self.last_error = None;
        self.publish();

        match self.connect(context).await {
            Ok(()) => {
                self.state = SessionState::Active;
                self.started_at = Some(Utc::now());
                self.publish();
                info!("Voice session live");
                Ok(())
            }
            Err(e) => {
                error!("Failed to start voice session: {}", e);
                self.fail(e.clone()).await;
                Err(e)
            }
        }
    }

    async fn connect(&mut self, context: SessionContext) -> Result<()> {
        let frames = self.input.open_microphone().await?;

        self.input.resume().await?;
        self.scheduler.output_mut().resume().await?;
        self.scheduler.interrupt();

        let session_id = format!("voice-{}", uuid::Uuid::new_v4());
        let setup = LiveSetup {
            session_id: session_id.clone(),
            model: self.config.model.clone(),
            response_modalities: vec![Modality::Audio],
            input_audio_transcription: true,
            output_audio_transcription: true,
            system_instruction: build_system_prompt(
                &context.location,
                &context.snapshot,
                context.language,
            ),
            voice_name: self.config.voice_name.clone(),
        };

        let LiveConnection {
            media,
            mut events,
            closer,
        } = self.transport.connect(setup).await?;

        self.generation += 1;
        let generation = self.generation;

        // Forward server events into the actor queue
        let events_tx = self.events_tx.clone();
        let pump_task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if events_tx.send(SessionEvent::Server { generation, event }).is_err() {
                    return;
                }
            }
            let _ = events_tx.send(SessionEvent::Server {
                generation,
                event: ServerEvent::Close,
            });
        });

        let loudness_tx = self.events_tx.clone();
        let capture_task = CapturePipeline::new(self.config.capture.clone()).spawn(
            frames,
            media,
            move |level| {
                let _ = loudness_tx.send(SessionEvent::Loudness { generation, level });
            },
        );

        info!("Live connection {} open", session_id);

        self.link = Some(ActiveLink {
            session_id,
            closer,
            capture_task,
            pump_task,
        });

        Ok(())
    }

    /// End the session at the user's request
    ///
    /// Closes the connection, releases the microphone and discards history and
    /// any unflushed fragments.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Idle {
            debug!("No voice session to stop");
            return;
        }

        info!("Stopping voice session");
        self.state = SessionState::Closing;
        self.publish();

        self.release().await;
        self.transcript.reset();
        self.history.clear();
        self.subtitle = None;
        self.ai_speaking = false;
        self.mic_volume = 0.0;
        self.started_at = None;

        self.state = SessionState::Idle;
        self.publish();
        info!("Voice session stopped");
    }

    /// Route one queued event
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Server { generation, event } if generation == self.generation => {
                self.handle_server_event(event).await;
            }
            SessionEvent::Loudness { generation, level } if generation == self.generation => {
                if self.state == SessionState::Active {
                    self.mic_volume = level;
                    self.publish();
                }
            }
            _ => debug!("Dropping event from a previous connection"),
        }
    }

    /// Apply one server event to the session
    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        if self.state != SessionState::Active {
            debug!("Ignoring server event while {:?}", self.state);
            return;
        }

        match event {
            ServerEvent::Interrupted => {
                let stopped = self.scheduler.interrupt();
                info!("Interrupted by user, stopped {} segments", stopped);
                self.transcript.clear(Role::Assistant);
                self.subtitle = None;
                self.ai_speaking = false;
            }

            ServerEvent::InputTranscription { text } => {
                if self.transcript.buffer(Role::User).is_empty() {
                    self.subtitle = None;
                }
                self.transcript.append_fragment(Role::User, &text);
                self.subtitle = Some(Subtitle {
                    role: Role::User,
                    text: self.transcript.buffer(Role::User).to_string(),
                });
                // User speech visually preempts the speaking indicator even
                // while queued audio drains.
                self.ai_speaking = false;
            }

            ServerEvent::OutputTranscription { text } => {
                self.transcript.append_fragment(Role::Assistant, &text);
                self.subtitle = Some(Subtitle {
                    role: Role::Assistant,
                    text: self.transcript.buffer(Role::Assistant).to_string(),
                });
                self.ai_speaking = true;
            }

            ServerEvent::TurnComplete => {
                let utterances = self.transcript.flush_turn();
                if !utterances.is_empty() {
                    debug!("Turn complete with {} utterances", utterances.len());
                    self.history.extend(utterances);
                }
                self.subtitle = None;
                self.ai_speaking = false;
            }

            ServerEvent::Audio { data } => {
                let decoded = codec::decode(&data).and_then(|bytes| {
                    codec::decode_audio_data(
                        &bytes,
                        self.config.output_sample_rate,
                        self.config.channels,
                    )
                });

                match decoded.and_then(|segment| self.scheduler.enqueue(segment)) {
                    Ok(_) => self.ai_speaking = true,
                    Err(e) => warn!("Dropping audio payload: {}", e),
                }
            }

            ServerEvent::Error { message } => {
                error!("Live connection error: {}", message);
                self.fail(VoiceError::Connection(message)).await;
                return;
            }

            ServerEvent::Close => {
                info!("Live connection closed");
                self.state = SessionState::Closing;
                self.release().await;
                self.subtitle = None;
                self.ai_speaking = false;
                self.mic_volume = 0.0;
                self.started_at = None;
                self.state = SessionState::Idle;
            }
        }

        self.publish();
    }

    /// Retire finished playback; clears the speaking flag once drained
    pub fn poll_playback(&mut self) {
        if self.scheduler.reap() {
            debug!("Playback drained");
            self.ai_speaking = false;
            self.publish();
        }
    }

    /// How long until the next segment finishes playing, if any is queued
    pub fn until_next_completion(&self) -> Option<Duration> {
        self.scheduler.until_next_completion()
    }

    /// Pass through `Error` into `Idle`, releasing everything
    async fn fail(&mut self, err: VoiceError) {
        self.state = SessionState::Error;
        self.last_error = Some(match err {
            VoiceError::Connection(_) => "disconnected".to_string(),
            other => other.to_string(),
        });
        self.publish();

        self.release().await;
        self.subtitle = None;
        self.ai_speaking = false;
        self.mic_volume = 0.0;
        self.started_at = None;

        self.state = SessionState::Idle;
        self.publish();
    }

    /// Close the connection, release the microphone, silence and suspend devices
    async fn release(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.closer.close();
            link.capture_task.abort();
            link.pump_task.abort();
            info!("Closed live connection {}", link.session_id);
        }

        self.input.release_microphone().await;
        self.scheduler.interrupt();

        if self.input.is_running() {
            if let Err(e) = self.input.suspend().await {
                warn!("Failed to suspend {}: {}", self.input.name(), e);
            }
        }
        let output = self.scheduler.output_mut();
        if output.is_running() {
            if let Err(e) = output.suspend().await {
                warn!("Failed to suspend output device: {}", e);
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Current immutable view of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            is_live: self.state == SessionState::Active,
            is_connecting: self.state == SessionState::Connecting,
            is_ai_speaking: self.ai_speaking,
            mic_volume: self.mic_volume,
            subtitle: self.subtitle.clone(),
            history: self.history.to_vec(),
            session_id: self.link.as_ref().map(|link| link.session_id.clone()),
            started_at: self.started_at,
            last_error: self.last_error.clone(),
        }
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ai_speaking(&self) -> bool {
        self.ai_speaking
    }

    pub fn mic_volume(&self) -> f32 {
        self.mic_volume
    }

    pub fn subtitle(&self) -> Option<&Subtitle> {
        self.subtitle.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &Utterance> {
        self.history.iter()
    }

    pub fn scheduler(&self) -> &OutputScheduler {
        &self.scheduler
    }

    pub fn input(&self) -> &dyn InputBackend {
        self.input.as_ref()
    }
}
