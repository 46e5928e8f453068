//! Durable segment storage
//!
//! One directory per session holding one WAV blob per segment index plus a
//! `metadata.json` record. Used by the recorder for its durable write at
//! finalize time and by the cache for spillover and reload.

mod disk;

pub use disk::{DiskSegmentStore, SessionMetadata};
