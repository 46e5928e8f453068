//! Segment recorder
//!
//! Owns the capture timeline: rotates to a new segment when the configured
//! duration of recorded (not wall-clock) time elapses, handles
//! pause/resume and external interruption or route-change signals, and
//! hands each finalized segment to the store, the cache, and the
//! transcription orchestrator.
//!
//! The state machine runs inside one actor task; rotation is a deadline in
//! that task's select loop rather than a detached timer, so a rotation can
//! never race a pause or stop.

mod config;
mod events;
mod recorder;
mod stats;

pub use config::RecorderConfig;
pub use events::RecorderEvent;
pub use recorder::{RecorderState, SegmentRecorder};
pub use stats::RecorderStats;
