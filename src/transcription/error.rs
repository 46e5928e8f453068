use serde::{Deserialize, Serialize};

/// Classified transcription failure.
///
/// These are terminal state on the `Transcription` record, never propagated
/// upward as process errors. Only `Connectivity` failures on the remote
/// backend feed the offline retry queue.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Audio file missing: {0}")]
    FileMissing(String),

    #[error("Audio could not be decoded: {0}")]
    Decode(String),

    #[error("Network failure: {0}")]
    Connectivity(String),

    #[error("On-device recognizer unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Transcription failed: {0}")]
    Unknown(String),
}

/// Bare classification, stored on the transcription record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Auth,
    FileMissing,
    Decode,
    Connectivity,
    CapabilityUnavailable,
    Unknown,
}

impl TranscriptionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::FileMissing(_) => ErrorKind::FileMissing,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Connectivity(e.to_string())
        } else {
            Self::Unknown(e.to_string())
        }
    }
}
