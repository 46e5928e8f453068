use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, TranscriptionError};

/// Lifecycle of one transcription attempt chain.
///
/// `Pending -> Processing -> {Completed | Failed}`. A `Failed` record is
/// never revived in place; retry discards it and starts a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn can_transition_to(self, next: TranscriptionStatus) -> bool {
        use TranscriptionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

/// Transcription state for one segment. Created when the segment enters the
/// orchestrator and mutated only by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub session_id: String,
    pub segment_index: u32,
    pub status: TranscriptionStatus,
    pub text: String,
    pub error: Option<ErrorKind>,
    pub error_detail: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transcription {
    pub fn new(session_id: &str, segment_index: u32) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            segment_index,
            status: TranscriptionStatus::Pending,
            text: String::new(),
            error: None,
            error_detail: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the start of a backend attempt
    pub fn begin_processing(&mut self) {
        self.advance(TranscriptionStatus::Processing);
        self.attempts += 1;
    }

    /// Another attempt against the same record (fallback retry)
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, text: String) {
        self.advance(TranscriptionStatus::Completed);
        self.text = text;
        self.error = None;
        self.error_detail = None;
    }

    pub fn fail(&mut self, err: &TranscriptionError) {
        self.advance(TranscriptionStatus::Failed);
        self.error = Some(err.kind());
        self.error_detail = Some(err.to_string());
    }

    fn advance(&mut self, next: TranscriptionStatus) {
        // The orchestrator is the only mutator, so a bad edge here is a
        // programming error, not recoverable state.
        debug_assert!(
            self.status.can_transition_to(next),
            "invalid transcription transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use TranscriptionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn failure_records_classification() {
        let mut record = Transcription::new("s", 0);
        record.begin_processing();
        record.fail(&TranscriptionError::Connectivity("timed out".into()));

        assert_eq!(record.status, TranscriptionStatus::Failed);
        assert_eq!(record.error, Some(ErrorKind::Connectivity));
        assert_eq!(record.attempts, 1);
    }

    #[test]
    fn completion_clears_error_state() {
        let mut record = Transcription::new("s", 3);
        record.begin_processing();
        record.complete("hello".into());

        assert_eq!(record.status, TranscriptionStatus::Completed);
        assert_eq!(record.text, "hello");
        assert!(record.error.is_none());
    }
}
