use async_nats::Client;
use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::messages::{LiveSetup, ServerEvent};
use super::transport::{CloseHandle, LiveConnection, LiveTransport};
use crate::error::{Result, VoiceError};

/// NATS subjects for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    pub setup: String,
    pub media: String,
    pub events: String,
    pub close: String,
}

impl Subjects {
    pub fn new(prefix: &str, session_id: &str) -> Self {
        Self {
            setup: format!("{}.setup.{}", prefix, session_id),
            media: format!("{}.media.{}", prefix, session_id),
            events: format!("{}.events.{}", prefix, session_id),
            close: format!("{}.close.{}", prefix, session_id),
        }
    }
}

/// Live transport relayed through a NATS server
///
/// A relay on the other side bridges each session's subjects to the
/// conversation service.
pub struct NatsTransport {
    url: String,
    subject_prefix: String,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
        }
    }
}

fn connection_error(context: &str, err: impl std::fmt::Display) -> VoiceError {
    VoiceError::Connection(format!("{}: {}", context, err))
}

#[async_trait]
impl LiveTransport for NatsTransport {
    async fn connect(&self, setup: LiveSetup) -> Result<LiveConnection> {
        info!("Connecting to NATS at {}", self.url);

        let client = async_nats::connect(self.url.as_str())
            .await
            .map_err(|e| connection_error("Failed to connect to NATS", e))?;

        let subjects = Subjects::new(&self.subject_prefix, &setup.session_id);

        // Subscribe before announcing the session so no early event is missed
        let subscriber = client
            .subscribe(subjects.events.clone())
            .await
            .map_err(|e| connection_error("Failed to subscribe to server events", e))?;

        let payload = serde_json::to_vec(&setup)
            .map_err(|e| connection_error("Failed to encode setup", e))?;
        client
            .publish(subjects.setup.clone(), payload.into())
            .await
            .map_err(|e| connection_error("Failed to publish setup", e))?;
        client
            .flush()
            .await
            .map_err(|e| connection_error("Failed to flush setup", e))?;

        info!("Live session {} opened on {}", setup.session_id, subjects.events);

        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(relay(client, subjects, subscriber, media_rx, events_tx, close_rx));

        Ok(LiveConnection {
            media: media_tx,
            events: events_rx,
            closer: CloseHandle::new(close_tx),
        })
    }

    fn name(&self) -> &str {
        "NATS relay"
    }
}

/// Pump media upstream and server events downstream until either side closes
async fn relay(
    client: Client,
    subjects: Subjects,
    mut subscriber: async_nats::Subscriber,
    mut media_rx: mpsc::UnboundedReceiver<super::messages::RealtimeInput>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let mut media_open = true;
    let mut published: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("Close requested for {}", subjects.events);
                if let Err(e) = client.publish(subjects.close.clone(), Vec::<u8>::new().into()).await {
                    warn!("Failed to publish close notice: {}", e);
                }
                break;
            }

            input = media_rx.recv(), if media_open => match input {
                Some(input) => {
                    let payload = match serde_json::to_vec(&input) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Failed to encode media block: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = client.publish(subjects.media.clone(), payload.into()).await {
                        error!("Failed to publish media block: {}", e);
                        let _ = events_tx.send(ServerEvent::Error {
                            message: format!("Failed to publish media block: {}", e),
                        });
                        break;
                    }
                    published += 1;
                }
                None => {
                    debug!("Capture finished after {} media blocks", published);
                    media_open = false;
                }
            },

            msg = subscriber.next() => match msg {
                Some(msg) => match serde_json::from_slice::<ServerEvent>(&msg.payload) {
                    Ok(event) => {
                        if events_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse server event: {}", e),
                },
                None => {
                    let _ = events_tx.send(ServerEvent::Close);
                    break;
                }
            },
        }
    }

    if let Err(e) = subscriber.unsubscribe().await {
        debug!("Unsubscribe failed: {}", e);
    }
    info!("Live relay for {} stopped ({} media blocks sent)", subjects.events, published);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_are_scoped_to_session() {
        let subjects = Subjects::new("agri.voice", "voice-123");
        assert_eq!(subjects.setup, "agri.voice.setup.voice-123");
        assert_eq!(subjects.media, "agri.voice.media.voice-123");
        assert_eq!(subjects.events, "agri.voice.events.voice-123");
        assert_eq!(subjects.close, "agri.voice.close.voice-123");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let transport = NatsTransport::new("nats://127.0.0.1:1", "agri.voice");
        let setup = LiveSetup {
            session_id: "voice-test".into(),
            model: "model".into(),
            response_modalities: vec![crate::live::messages::Modality::Audio],
            input_audio_transcription: true,
            output_audio_transcription: true,
            system_instruction: String::new(),
            voice_name: "Zephyr".into(),
        };

        let result = transport.connect(setup).await;
        assert!(matches!(result, Err(VoiceError::Connection(_))));
    }
}
