use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::messages::{LiveSetup, RealtimeInput, ServerEvent};
use crate::error::Result;

/// Outbound media queue; sends never wait on delivery
pub type MediaSender = mpsc::UnboundedSender<RealtimeInput>;

/// Closes the remote side of a connection when fired or dropped
#[derive(Debug, Default)]
pub struct CloseHandle(Option<oneshot::Sender<()>>);

impl CloseHandle {
    pub fn new(signal: oneshot::Sender<()>) -> Self {
        Self(Some(signal))
    }

    pub fn close(&mut self) {
        if let Some(signal) = self.0.take() {
            let _ = signal.send(());
        }
    }
}

/// An open streaming connection to the conversation service
pub struct LiveConnection {
    pub media: MediaSender,
    /// Inbound events in arrival order; the stream ending means the
    /// connection closed
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    pub closer: CloseHandle,
}

/// Opens live conversation connections
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Perform the handshake and return the open connection
    ///
    /// Fails with `VoiceError::Connection` when the service rejects or is
    /// unreachable.
    async fn connect(&self, setup: LiveSetup) -> Result<LiveConnection>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}
