pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioFile, AudioFrame, AudioSegment, InputBackend,
    OutputBackend, OutputScheduler, WavFileInput, WavRecorderOutput,
};
pub use config::Config;
pub use context::{ContextStore, Language, SharedContext};
pub use error::{Result, VoiceError};
pub use http::{create_router, AppState};
pub use live::{LiveTransport, NatsTransport, ServerEvent};
pub use session::{spawn_session, SessionConfig, SessionHandle, SessionSnapshot, VoiceSession};
