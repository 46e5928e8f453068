use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const METADATA_FILE: &str = "metadata.json";

/// Per-session metadata record, stored as `metadata.json` in the session
/// directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub segment_count: usize,
    pub total_size: u64,
    pub segment_indices: Vec<u32>,
}

impl SessionMetadata {
    fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            segment_count: 0,
            total_size: 0,
            segment_indices: Vec::new(),
        }
    }
}

/// Filesystem-backed segment store
///
/// Layout: `<root>/<session_id>/segment-00000.wav` plus `metadata.json`.
/// All operations are synchronous; callers that need them off the hot path
/// run them from their own task (the cache actor does exactly that).
#[derive(Debug, Clone)]
pub struct DiskSegmentStore {
    root: PathBuf,
}

impl DiskSegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create store root: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    pub fn segment_path(&self, session_id: &str, index: u32) -> PathBuf {
        self.session_dir(session_id)
            .join(format!("segment-{:05}.wav", index))
    }

    /// True if the session has a durable metadata record
    pub fn session_exists(&self, session_id: &str) -> bool {
        self.session_dir(session_id).join(METADATA_FILE).exists()
    }

    /// Write a single segment blob and fold it into the metadata record.
    ///
    /// This is the recorder's durable write at finalize time; it keeps the
    /// metadata incrementally consistent so a session is reloadable after
    /// any finalize point.
    pub fn append_segment(&self, session_id: &str, index: u32, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory: {}", dir.display()))?;

        let path = self.segment_path(session_id, index);
        let previous_len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write segment blob: {}", path.display()))?;

        let mut meta = self
            .read_metadata(session_id)?
            .unwrap_or_else(|| SessionMetadata::empty(session_id));

        if !meta.segment_indices.contains(&index) {
            meta.segment_indices.push(index);
            meta.segment_indices.sort_unstable();
        }
        meta.segment_count = meta.segment_indices.len();
        meta.total_size = meta.total_size.saturating_sub(previous_len) + bytes.len() as u64;

        self.write_metadata(&meta)?;

        debug!(
            "Stored segment {} of session {} ({} bytes)",
            index,
            session_id,
            bytes.len()
        );

        Ok(path)
    }

    /// Write a whole session: every blob plus a freshly computed metadata
    /// record. Used by the cache for spillover and explicit flushes.
    pub fn save(&self, session_id: &str, segments: &BTreeMap<u32, Vec<u8>>) -> Result<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory: {}", dir.display()))?;

        for (&index, bytes) in segments {
            let path = self.segment_path(session_id, index);
            fs::write(&path, bytes)
                .with_context(|| format!("Failed to write segment blob: {}", path.display()))?;
        }

        // Blobs already on disk from earlier appends stay part of the
        // session; recompute metadata from the union rather than just the
        // resident set, so a trimmed cache entry cannot shrink the record.
        let mut meta = self
            .read_metadata(session_id)?
            .unwrap_or_else(|| SessionMetadata::empty(session_id));
        for &index in segments.keys() {
            if !meta.segment_indices.contains(&index) {
                meta.segment_indices.push(index);
            }
        }
        meta.segment_indices.sort_unstable();
        meta.segment_count = meta.segment_indices.len();
        meta.total_size = meta
            .segment_indices
            .iter()
            .map(|&i| {
                fs::metadata(self.segment_path(session_id, i))
                    .map(|m| m.len())
                    .unwrap_or(0)
            })
            .sum();

        self.write_metadata(&meta)?;

        info!(
            "Saved session {} to disk ({} segments, {} bytes)",
            session_id, meta.segment_count, meta.total_size
        );

        Ok(())
    }

    /// Load a whole session. Returns `None` if the session has no durable
    /// record at all.
    pub fn load(&self, session_id: &str) -> Result<Option<(BTreeMap<u32, Vec<u8>>, SessionMetadata)>> {
        let Some(meta) = self.read_metadata(session_id)? else {
            return Ok(None);
        };

        let mut segments = BTreeMap::new();
        for &index in &meta.segment_indices {
            let path = self.segment_path(session_id, index);
            match fs::read(&path) {
                Ok(bytes) => {
                    segments.insert(index, bytes);
                }
                Err(e) => {
                    // A missing blob makes that one segment unrecoverable,
                    // not the whole session.
                    warn!(
                        "Segment blob {} of session {} unreadable: {}",
                        index, session_id, e
                    );
                }
            }
        }

        debug!(
            "Loaded session {} from disk ({} segments)",
            session_id,
            segments.len()
        );

        Ok(Some((segments, meta)))
    }

    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to delete session directory: {}", dir.display()))?;
            info!("Deleted stored session {}", session_id);
        }
        Ok(())
    }

    fn read_metadata(&self, session_id: &str) -> Result<Option<SessionMetadata>> {
        let path = self.session_dir(session_id).join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
        let meta = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed metadata record: {}", path.display()))?;
        Ok(Some(meta))
    }

    fn write_metadata(&self, meta: &SessionMetadata) -> Result<()> {
        let path = self.session_dir(&meta.session_id).join(METADATA_FILE);
        let raw = serde_json::to_string_pretty(meta)?;
        fs::write(&path, raw)
            .with_context(|| format!("Failed to write metadata: {}", path.display()))?;
        Ok(())
    }
}
