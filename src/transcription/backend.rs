use serde::Serialize;

use super::error::TranscriptionError;
use crate::segment::Segment;

/// Which backend variant the orchestrator is currently driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendMode {
    Remote,
    Local,
}

/// A transcription capability: audio reference in, text or classified
/// failure out.
///
/// Implementations:
/// - `RemoteBackend`: authenticated multipart upload to a transcription API
/// - `LocalBackend`: on-device recognition behind a capability check
#[async_trait::async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Transcribe a finalized segment via its durable audio reference
    async fn transcribe(&self, segment: &Segment) -> Result<String, TranscriptionError>;
}
