use super::session::{SessionEvent, VoiceSession};
use super::snapshot::{SessionSnapshot, SessionState};
use crate::context::SharedContext;
use crate::error::{Result, VoiceError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands accepted by the session actor
#[derive(Debug)]
pub enum SessionCommand {
    Start { reply: oneshot::Sender<Result<()>> },
    Stop { reply: oneshot::Sender<()> },
}

/// Cloneable handle to a running session actor
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Start a session with the context current at this moment
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Start { reply })
            .await
            .map_err(|_| actor_gone())?;
        rx.await.map_err(|_| actor_gone())?
    }

    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Stop { reply })
            .await
            .map_err(|_| actor_gone())?;
        rx.await.map_err(|_| actor_gone())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

fn actor_gone() -> VoiceError {
    VoiceError::DeviceUnavailable("voice session is not running".to_string())
}

/// Move the session onto its own task
///
/// Commands, background events and playback wake-ups are handled one at a
/// time in arrival order. The actor stops the session and exits once every
/// handle is dropped.
pub fn spawn_session(
    session: VoiceSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    context: SharedContext,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let handle = SessionHandle {
        commands: commands_tx,
        snapshots: session.subscribe(),
    };

    let task = tokio::spawn(run(session, commands_rx, events, context));
    (handle, task)
}

async fn run(
    mut session: VoiceSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    context: SharedContext,
) {
    info!("Session actor started");

    loop {
        let wake = session.until_next_completion();

        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Start { reply }) => {
                    let result = start(&mut session, &context).await;
                    let _ = reply.send(result);
                }
                Some(SessionCommand::Stop { reply }) => {
                    session.stop().await;
                    let _ = reply.send(());
                }
                None => break,
            },

            Some(event) = events.recv() => session.handle_event(event).await,

            _ = tokio::time::sleep(wake.unwrap_or_default()), if wake.is_some() => {
                session.poll_playback();
            }
        }
    }

    session.stop().await;
    info!("Session actor stopped");
}

/// Refresh the context, then freeze it into a new session
async fn start(session: &mut VoiceSession, context: &SharedContext) -> Result<()> {
    if matches!(session.state(), SessionState::Connecting | SessionState::Active) {
        debug!("Session already {:?}", session.state());
        return Ok(());
    }

    let frozen = {
        let mut store = context.write().await;
        if let Err(e) = store.refresh().await {
            warn!("Starting with stale context: {}", e);
        }
        store.session_context()
    };

    session.start(frozen).await
}
