pub mod backend;
pub mod capture;
pub mod codec;
#[cfg(feature = "native-audio")]
pub mod device;
pub mod file;
pub mod recorder;
pub mod scheduler;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioFrame, AudioSegment, InputBackend, OutputBackend,
    SegmentId,
};
pub use capture::{CaptureConfig, CapturePipeline, CapturedBlock};
pub use codec::PcmBlob;
#[cfg(feature = "native-audio")]
pub use device::{CpalInput, CpalOutput};
pub use file::{resample, AudioFile, WavFileInput};
pub use recorder::WavRecorderOutput;
pub use scheduler::{OutputScheduler, ScheduledSegment};
