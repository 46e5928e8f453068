use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::backend::TranscriptionBackend;
use super::error::TranscriptionError;
use crate::segment::Segment;

/// On-device recognition engine seam.
///
/// The speech model itself is a collaborator; this crate only needs the
/// availability probe and file-reference recognition. Implementations wrap
/// whatever recognizer the platform provides.
#[async_trait::async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Authorization / capability probe, checked before every recognition
    fn is_available(&self) -> bool;

    /// Recognize a finalized audio file, returning the full (non-partial)
    /// text. An empty result for speechless audio is a `Decode` failure,
    /// not an empty success.
    async fn recognize(&self, path: &Path) -> Result<String, TranscriptionError>;
}

/// On-device transcription backend
pub struct LocalBackend {
    engine: Arc<dyn SpeechEngine>,
}

impl LocalBackend {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl TranscriptionBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn transcribe(&self, segment: &Segment) -> Result<String, TranscriptionError> {
        if !self.engine.is_available() {
            return Err(TranscriptionError::CapabilityUnavailable(
                "On-device recognizer is not authorized or not available".to_string(),
            ));
        }

        if !segment.path.exists() {
            return Err(TranscriptionError::FileMissing(
                segment.path.display().to_string(),
            ));
        }

        debug!(
            "Recognizing segment {} of session {} on device",
            segment.index, segment.session_id
        );

        self.engine.recognize(&segment.path).await
    }
}
