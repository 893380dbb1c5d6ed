// Integration tests for the live voice session
//
// The session is driven directly with server events against fake devices and
// a manual playback clock, so every scenario is deterministic.

use std::time::Duration;

use agri_voice::context::Language;
use agri_voice::live::{Modality, ServerEvent};
use agri_voice::session::{Role, SessionEvent, SessionState};
use agri_voice::VoiceError;
use anyhow::Result;
use tokio::time::timeout;

mod common;
use common::{session_context, speech_payload, ChannelTransport, FakeInput, Harness};

fn text(s: &str) -> String {
    s.to_string()
}

#[tokio::test]
async fn test_start_goes_live() -> Result<()> {
    let mut h = Harness::new();

    h.session.start(session_context(Language::Telugu)).await?;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, SessionState::Active);
    assert!(snapshot.is_live);
    assert!(!snapshot.is_connecting);
    assert!(snapshot.session_id.is_some());
    assert!(snapshot.started_at.is_some());

    assert!(h.input.is_open());
    assert!(*h.input.running.lock().unwrap());
    assert!(*h.output.running.lock().unwrap());

    let server = h.transport.take_latest();
    assert_eq!(server.setup.response_modalities, vec![Modality::Audio]);
    assert!(server.setup.input_audio_transcription);
    assert!(server.setup.output_audio_transcription);
    assert_eq!(server.setup.voice_name, "Zephyr");
    assert!(server.setup.system_instruction.contains("REAL-TIME CONTEXT"));
    assert!(server.setup.system_instruction.contains("Telugu"));
    assert_eq!(Some(server.setup.session_id), snapshot.session_id);

    Ok(())
}

#[tokio::test]
async fn test_clean_call_speaking_flag() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    h.output.set_time(0.0);
    h.session
        .handle_server_event(ServerEvent::Audio {
            data: speech_payload(2.0),
        })
        .await;
    assert!(h.session.is_ai_speaking());
    assert_eq!(h.session.until_next_completion(), Some(Duration::from_secs(2)));

    // Not finished yet
    h.output.set_time(1.5);
    h.session.poll_playback();
    assert!(h.session.is_ai_speaking());

    h.output.set_time(2.0);
    h.session.poll_playback();
    assert!(!h.session.is_ai_speaking());
    assert!(!h.session.snapshot().is_ai_speaking);
    assert_eq!(h.session.until_next_completion(), None);

    Ok(())
}

#[tokio::test]
async fn test_segments_play_back_to_back() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    for _ in 0..3 {
        h.session
            .handle_server_event(ServerEvent::Audio {
                data: speech_payload(0.5),
            })
            .await;
    }

    let played = h.output.played();
    let starts: Vec<f64> = played.iter().map(|(_, start, _)| *start).collect();
    assert_eq!(starts, vec![0.0, 0.5, 1.0]);
    for pair in played.windows(2) {
        let (_, start, duration) = pair[0];
        assert!(start + duration <= pair[1].1);
    }

    Ok(())
}

#[tokio::test]
async fn test_barge_in_stops_playback() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    h.session
        .handle_server_event(ServerEvent::OutputTranscription {
            text: text("The mandi price"),
        })
        .await;
    h.session
        .handle_server_event(ServerEvent::Audio {
            data: speech_payload(5.0),
        })
        .await;

    h.output.set_time(1.0);
    h.session.handle_server_event(ServerEvent::Interrupted).await;

    assert_eq!(h.output.stopped(), vec![0]);
    assert!(!h.session.is_ai_speaking());
    assert!(h.session.subtitle().is_none());
    assert_eq!(h.session.scheduler().active_count(), 0);
    assert!(h.session.scheduler().next_start_time() <= 1.0);

    h.output.set_time(1.2);
    h.session
        .handle_server_event(ServerEvent::Audio {
            data: speech_payload(1.0),
        })
        .await;

    let (_, start, _) = *h.output.played().last().expect("segment scheduled");
    assert!((start - 1.2).abs() < 1e-9);

    // The interrupted fragment never reaches history
    h.session.handle_server_event(ServerEvent::TurnComplete).await;
    assert_eq!(h.session.history().count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_permission_denied_leaves_nothing_running() {
    let mut h = Harness::with(FakeInput::denied(), ChannelTransport::default());

    let err = h
        .session
        .start(session_context(Language::English))
        .await
        .unwrap_err();

    assert_eq!(err, VoiceError::PermissionDenied);
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!*h.input.running.lock().unwrap());
    assert!(!*h.output.running.lock().unwrap());
    assert_eq!(h.transport.connection_count(), 0);

    let snapshot = h.session.snapshot();
    assert!(!snapshot.is_live);
    assert!(!snapshot.is_connecting);
    assert_eq!(snapshot.last_error.as_deref(), Some("microphone permission denied"));
}

#[tokio::test]
async fn test_rejected_handshake_releases_devices() {
    let mut h = Harness::with(FakeInput::default(), ChannelTransport::rejecting());

    let err = h
        .session
        .start(session_context(Language::English))
        .await
        .unwrap_err();

    assert!(matches!(err, VoiceError::Connection(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.input.is_open());
    assert!(!*h.input.running.lock().unwrap());
    assert!(!*h.output.running.lock().unwrap());
    assert_eq!(h.session.snapshot().last_error.as_deref(), Some("disconnected"));
}

#[tokio::test]
async fn test_double_start_is_noop() -> Result<()> {
    let mut h = Harness::new();

    h.session.start(session_context(Language::English)).await?;
    let session_id = h.session.snapshot().session_id;
    h.session.start(session_context(Language::Hindi)).await?;

    assert_eq!(h.transport.connection_count(), 1);
    assert_eq!(h.session.snapshot().session_id, session_id);
    Ok(())
}

#[tokio::test]
async fn test_turn_complete_builds_history() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    for event in [
        ServerEvent::InputTranscription { text: text("When should") },
        ServerEvent::InputTranscription { text: text(" I sow?") },
        ServerEvent::OutputTranscription { text: text("After the") },
        ServerEvent::OutputTranscription { text: text(" first rain.") },
    ] {
        h.session.handle_server_event(event).await;
    }

    let subtitle = h.session.subtitle().cloned().expect("subtitle shown");
    assert_eq!(subtitle.role, Role::Assistant);
    assert_eq!(subtitle.text, "After the first rain.");
    assert!(h.session.is_ai_speaking());

    h.session.handle_server_event(ServerEvent::TurnComplete).await;

    let history: Vec<(Role, String)> = h
        .session
        .history()
        .map(|u| (u.role, u.text.clone()))
        .collect();
    assert_eq!(
        history,
        vec![
            (Role::User, text("When should I sow?")),
            (Role::Assistant, text("After the first rain.")),
        ]
    );
    assert!(h.session.subtitle().is_none());
    assert!(!h.session.is_ai_speaking());

    Ok(())
}

#[tokio::test]
async fn test_history_is_bounded() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    for i in 0..8 {
        h.session
            .handle_server_event(ServerEvent::InputTranscription { text: format!("q{}", i) })
            .await;
        h.session
            .handle_server_event(ServerEvent::OutputTranscription { text: format!("a{}", i) })
            .await;
        h.session.handle_server_event(ServerEvent::TurnComplete).await;
    }

    let texts: Vec<String> = h.session.history().map(|u| u.text.clone()).collect();
    assert_eq!(texts.len(), 10);
    assert_eq!(texts.first().map(String::as_str), Some("q3"));
    assert_eq!(texts.last().map(String::as_str), Some("a7"));

    Ok(())
}

#[tokio::test]
async fn test_user_fragment_takes_over_subtitle() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    h.session
        .handle_server_event(ServerEvent::OutputTranscription { text: text("Spray neem") })
        .await;
    h.session
        .handle_server_event(ServerEvent::Audio {
            data: speech_payload(3.0),
        })
        .await;
    h.session
        .handle_server_event(ServerEvent::InputTranscription { text: text("Wait") })
        .await;

    let subtitle = h.session.subtitle().cloned().expect("subtitle shown");
    assert_eq!(subtitle.role, Role::User);
    assert_eq!(subtitle.text, "Wait");
    assert!(!h.session.is_ai_speaking());
    // Queued speech keeps playing until the service interrupts
    assert_eq!(h.session.scheduler().active_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_bad_audio_payload_is_dropped() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    h.session
        .handle_server_event(ServerEvent::Audio {
            data: text("not base64!"),
        })
        .await;
    // Odd byte count
    h.session
        .handle_server_event(ServerEvent::Audio {
            data: agri_voice::audio::codec::encode(&[0u8; 3]),
        })
        .await;

    assert_eq!(h.session.state(), SessionState::Active);
    assert!(!h.session.is_ai_speaking());
    assert!(h.output.played().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stop_clears_everything() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;
    let server = h.transport.take_latest();

    h.session
        .handle_server_event(ServerEvent::InputTranscription { text: text("Hello") })
        .await;
    h.session.handle_server_event(ServerEvent::TurnComplete).await;
    h.session
        .handle_server_event(ServerEvent::OutputTranscription { text: text("Namaste") })
        .await;
    h.session
        .handle_server_event(ServerEvent::Audio {
            data: speech_payload(2.0),
        })
        .await;

    h.session.stop().await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.history.is_empty());
    assert!(snapshot.subtitle.is_none());
    assert!(!snapshot.is_ai_speaking);
    assert_eq!(snapshot.mic_volume, 0.0);
    assert!(snapshot.session_id.is_none());
    assert!(snapshot.last_error.is_none());

    assert!(!h.input.is_open());
    assert!(!*h.input.running.lock().unwrap());
    assert!(!*h.output.running.lock().unwrap());
    assert_eq!(h.output.stopped(), vec![0]);
    assert!(server.closed.await.is_ok());

    // Devices are reused for the next call
    h.session.start(session_context(Language::English)).await?;
    assert_eq!(h.transport.connection_count(), 1);
    assert!(*h.output.running.lock().unwrap());
    Ok(())
}

#[tokio::test]
async fn test_transport_error_keeps_history() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    h.session
        .handle_server_event(ServerEvent::InputTranscription { text: text("Hello") })
        .await;
    h.session.handle_server_event(ServerEvent::TurnComplete).await;
    h.session
        .handle_server_event(ServerEvent::Error {
            message: text("socket reset"),
        })
        .await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.is_live);
    assert_eq!(snapshot.last_error.as_deref(), Some("disconnected"));
    assert_eq!(snapshot.history.len(), 1);
    assert!(!h.input.is_open());
    Ok(())
}

#[tokio::test]
async fn test_close_returns_to_idle() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;

    h.session.handle_server_event(ServerEvent::Close).await;
    h.session.handle_server_event(ServerEvent::Close).await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.last_error.is_none());
    assert!(!h.input.is_open());
    Ok(())
}

#[tokio::test]
async fn test_events_from_previous_connection_are_ignored() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;
    h.session.stop().await;
    h.session.start(session_context(Language::English)).await?;

    h.session
        .handle_event(SessionEvent::Server {
            generation: 1,
            event: ServerEvent::OutputTranscription { text: text("stale") },
        })
        .await;
    h.session
        .handle_event(SessionEvent::Loudness {
            generation: 1,
            level: 0.9,
        })
        .await;
    assert!(h.session.subtitle().is_none());
    assert_eq!(h.session.mic_volume(), 0.0);

    h.session
        .handle_event(SessionEvent::Server {
            generation: 2,
            event: ServerEvent::OutputTranscription { text: text("fresh") },
        })
        .await;
    assert_eq!(h.session.subtitle().map(|s| s.text.as_str()), Some("fresh"));
    Ok(())
}

#[tokio::test]
async fn test_microphone_blocks_reach_the_service() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;
    let mut server = h.transport.take_latest();

    h.input.speak(vec![0.5; 4096]).await;

    let block = timeout(Duration::from_secs(1), server.media.recv())
        .await?
        .expect("media block");
    assert_eq!(block.media.mime_type, "audio/pcm;rate=16000");
    assert_eq!(agri_voice::audio::codec::decode(&block.media.data)?.len(), 4096 * 2);

    let event = timeout(Duration::from_secs(1), h.events.recv())
        .await?
        .expect("loudness event");
    assert!(matches!(event, SessionEvent::Loudness { .. }));
    h.session.handle_event(event).await;

    // 0.5 * 1.2 gain * 6 scale saturates the meter
    assert_eq!(h.session.mic_volume(), 1.0);
    Ok(())
}

#[tokio::test]
async fn test_server_events_are_pumped() -> Result<()> {
    let mut h = Harness::new();
    h.session.start(session_context(Language::English)).await?;
    let server = h.transport.take_latest();

    server.events.send(ServerEvent::OutputTranscription {
        text: text("Hello farmer"),
    })?;
    drop(server);

    let first = timeout(Duration::from_secs(1), h.events.recv())
        .await?
        .expect("pumped event");
    h.session.handle_event(first).await;
    assert_eq!(h.session.subtitle().map(|s| s.text.as_str()), Some("Hello farmer"));

    // Dropping the service side ends the stream with a close
    let second = timeout(Duration::from_secs(1), h.events.recv())
        .await?
        .expect("close event");
    h.session.handle_event(second).await;
    assert_eq!(h.session.state(), SessionState::Idle);
    Ok(())
}
