pub mod audio;
pub mod cache;
pub mod config;
pub mod recorder;
pub mod segment;
pub mod store;
pub mod transcription;

pub use audio::{AudioFile, AudioFrame, CaptureConfig, CaptureSource, FileSource, SilenceSource};
pub use cache::{CacheConfig, CacheStats, SegmentCache};
pub use config::Config;
pub use recorder::{RecorderConfig, RecorderEvent, RecorderState, RecorderStats, SegmentRecorder};
pub use segment::Segment;
pub use store::{DiskSegmentStore, SessionMetadata};
pub use transcription::{
    BackendMode, LocalBackend, OrchestratorConfig, RemoteBackend, RemoteConfig, SpeechEngine,
    Transcription, TranscriptionBackend, TranscriptionError, TranscriptionOrchestrator,
    TranscriptionStatus,
};
