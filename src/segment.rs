use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A finalized bounded-duration chunk of a recording session.
///
/// Produced by the recorder at rotation or stop time. The byte payload is
/// handed to the segment cache; `path` points at the durable WAV blob, which
/// is what transcription operates on (the cache entry may be trimmed or
/// evicted independently).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Owning session
    pub session_id: String,

    /// Position within the session; gapless and monotonically increasing
    /// once finalized
    pub index: u32,

    /// When capture of this segment began
    pub started_at: DateTime<Utc>,

    /// Recorded duration, paused time excluded
    pub duration: Duration,

    /// Durable WAV blob written by the recorder at finalize time
    pub path: PathBuf,

    /// Encoded payload size in bytes
    pub size_bytes: usize,
}
