use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::recorder::RecorderState;

/// Snapshot of the recorder's state
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStats {
    pub state: RecorderState,
    pub session_id: String,
    pub segments_finalized: u32,
    pub started_at: Option<DateTime<Utc>>,
    /// Recorded time in the currently open segment, paused time excluded
    pub elapsed_in_segment: Duration,
    pub last_error: Option<String>,
}
