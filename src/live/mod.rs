//! Streaming connection to the conversation service
//!
//! The service is a black box behind [`LiveTransport`]: a setup message opens
//! the session, captured blocks flow up as [`RealtimeInput`], and
//! [`ServerEvent`]s flow back.

pub mod client;
pub mod messages;
pub mod transport;

pub use client::{NatsTransport, Subjects};
pub use messages::{LiveSetup, Modality, RealtimeInput, ServerEvent};
pub use transport::{CloseHandle, LiveConnection, LiveTransport, MediaSender};
