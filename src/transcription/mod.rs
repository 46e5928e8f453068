//! Transcription pipeline
//!
//! A `TranscriptionBackend` turns a finalized segment into text or a
//! classified failure. The orchestrator drives each segment to a terminal
//! status against the active backend, switching from the remote to the
//! on-device backend after repeated consecutive failures and queueing
//! connectivity casualties for retry once the network returns.

mod backend;
mod error;
mod local;
mod orchestrator;
mod record;
mod remote;

pub use backend::{BackendMode, TranscriptionBackend};
pub use error::{ErrorKind, TranscriptionError};
pub use local::{LocalBackend, SpeechEngine};
pub use orchestrator::{OrchestratorConfig, OrchestratorStatus, TranscriptionOrchestrator};
pub use record::{Transcription, TranscriptionStatus};
pub use remote::{RemoteBackend, RemoteConfig};
