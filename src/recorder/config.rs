use std::time::Duration;

/// Configuration for a recording run
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Recorded time per segment before rotating
    pub segment_duration: Duration,

    /// Sample rate of the captured audio
    pub sample_rate: u32,

    /// Channel count of the captured audio
    pub channels: u16,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            segment_duration: Duration::from_secs(30),
            sample_rate: 16000,
            channels: 1,
        }
    }
}
