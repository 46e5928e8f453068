use anyhow::{Context, Result};
use futures::future::join_all;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{BackendMode, TranscriptionBackend};
use super::error::{ErrorKind, TranscriptionError};
use super::record::Transcription;
use crate::segment::Segment;
use crate::store::DiskSegmentStore;

const TRANSCRIPTS_FILE: &str = "transcripts.json";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Consecutive failures on the remote backend before switching to the
    /// on-device backend
    pub failure_threshold: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
        }
    }
}

/// Process-wide orchestrator state, updated atomically under one lock
struct OrchestratorState {
    mode: BackendMode,
    consecutive_failures: u32,
    /// True only for an automatic threshold-triggered switch, and only
    /// while the counter that caused it has not been reset
    fallback_active: bool,
}

/// Snapshot surfaced for UI/telemetry
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub mode: BackendMode,
    pub failure_count: u32,
    pub is_fallback_active: bool,
}

/// Drives each segment to a terminal transcription status.
///
/// Different segments may transcribe concurrently; the failure counter,
/// backend mode, record registry, and offline queue are the shared state,
/// each behind its own lock. Constructed once at startup and shared as an
/// `Arc` (no hidden globals).
pub struct TranscriptionOrchestrator {
    remote: Arc<dyn TranscriptionBackend>,
    local: Arc<dyn TranscriptionBackend>,
    store: DiskSegmentStore,
    failure_threshold: u32,
    state: Mutex<OrchestratorState>,
    records: Mutex<HashMap<(String, u32), Transcription>>,
    offline_queue: Mutex<Vec<Segment>>,
}

impl TranscriptionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        remote: Arc<dyn TranscriptionBackend>,
        local: Arc<dyn TranscriptionBackend>,
        store: DiskSegmentStore,
    ) -> Self {
        Self {
            remote,
            local,
            store,
            failure_threshold: config.failure_threshold,
            state: Mutex::new(OrchestratorState {
                mode: BackendMode::Remote,
                consecutive_failures: 0,
                fallback_active: false,
            }),
            records: Mutex::new(HashMap::new()),
            offline_queue: Mutex::new(Vec::new()),
        }
    }

    /// Transcribe one segment against the active backend, applying the
    /// fallback and offline-queue policy. The outcome lands on the returned
    /// record; failures are terminal state there, never errors to the
    /// caller.
    pub async fn transcribe(&self, segment: &Segment) -> Transcription {
        let mut record = Transcription::new(&segment.session_id, segment.index);
        record.begin_processing();
        self.upsert_record(record.clone()).await;

        let mode = self.state.lock().await.mode;
        let backend = self.backend_for(mode);

        debug!(
            "Transcribing segment {} of session {} via {} backend",
            segment.index,
            segment.session_id,
            backend.name()
        );

        match backend.transcribe(segment).await {
            Ok(text) => {
                self.note_success().await;
                record.complete(text);
            }
            Err(err) => {
                self.handle_failure(segment, mode, err, &mut record).await;
            }
        }

        self.upsert_record(record.clone()).await;
        record
    }

    /// Discard a segment's current transcription and run it again from
    /// scratch
    pub async fn retry_transcription(&self, segment: &Segment) -> Transcription {
        let key = (segment.session_id.clone(), segment.index);
        if self.records.lock().await.remove(&key).is_some() {
            debug!(
                "Discarded previous transcription for segment {} of session {}",
                segment.index, segment.session_id
            );
        }
        self.transcribe(segment).await
    }

    /// Retry every queued connectivity casualty once. No-op while the
    /// on-device backend is active (the queue is for the remote path).
    pub async fn process_offline_queue(&self) {
        if self.state.lock().await.mode == BackendMode::Local {
            debug!("Offline queue drain skipped: local backend active");
            return;
        }

        let drained: Vec<Segment> = std::mem::take(&mut *self.offline_queue.lock().await);
        if drained.is_empty() {
            return;
        }

        info!("Draining offline queue ({} segments)", drained.len());
        join_all(drained.iter().map(|s| self.retry_transcription(s))).await;
    }

    /// Explicit override to the on-device backend. Resets the failure
    /// counter; does not auto-revert.
    pub async fn switch_to_local(&self) {
        let mut state = self.state.lock().await;
        state.mode = BackendMode::Local;
        state.consecutive_failures = 0;
        state.fallback_active = false;
        info!("Switched to local transcription");
    }

    /// Explicit override back to the remote backend
    pub async fn switch_to_remote(&self) {
        let mut state = self.state.lock().await;
        state.mode = BackendMode::Remote;
        state.consecutive_failures = 0;
        state.fallback_active = false;
        info!("Switched to remote transcription");
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let state = self.state.lock().await;
        OrchestratorStatus {
            mode: state.mode,
            failure_count: state.consecutive_failures,
            is_fallback_active: state.fallback_active,
        }
    }

    pub async fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().await.len()
    }

    pub async fn get_transcription(&self, session_id: &str, index: u32) -> Option<Transcription> {
        self.records
            .lock()
            .await
            .get(&(session_id.to_string(), index))
            .cloned()
    }

    fn backend_for(&self, mode: BackendMode) -> &Arc<dyn TranscriptionBackend> {
        match mode {
            BackendMode::Remote => &self.remote,
            BackendMode::Local => &self.local,
        }
    }

    async fn note_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
        state.fallback_active = false;
    }

    async fn handle_failure(
        &self,
        segment: &Segment,
        mode: BackendMode,
        err: TranscriptionError,
        record: &mut Transcription,
    ) {
        match mode {
            BackendMode::Local => {
                self.state.lock().await.consecutive_failures += 1;
                warn!(
                    "Local transcription failed for segment {} of session {}: {}",
                    segment.index, segment.session_id, err
                );
                record.fail(&err);
            }
            BackendMode::Remote => {
                let crossed_threshold = {
                    let mut state = self.state.lock().await;
                    state.consecutive_failures += 1;
                    if state.mode == BackendMode::Remote
                        && state.consecutive_failures >= self.failure_threshold
                    {
                        state.mode = BackendMode::Local;
                        state.fallback_active = true;
                        true
                    } else {
                        false
                    }
                };

                if crossed_threshold {
                    warn!(
                        "Remote backend failed {} consecutive times, falling back to local \
                         transcription (segment {} of session {})",
                        self.failure_threshold, segment.index, segment.session_id
                    );
                    // Immediate retry of the triggering segment against the
                    // local backend; this attempt does not count toward any
                    // threshold.
                    record.record_attempt();
                    match self.local.transcribe(segment).await {
                        Ok(text) => {
                            self.note_success().await;
                            record.complete(text);
                        }
                        Err(local_err) => {
                            warn!(
                                "Fallback retry failed for segment {} of session {}: {}",
                                segment.index, segment.session_id, local_err
                            );
                            record.fail(&local_err);
                        }
                    }
                } else {
                    warn!(
                        "Remote transcription failed for segment {} of session {}: {}",
                        segment.index, segment.session_id, err
                    );
                    if err.kind() == ErrorKind::Connectivity {
                        self.offline_queue.lock().await.push(segment.clone());
                        info!(
                            "Queued segment {} of session {} for offline retry",
                            segment.index, segment.session_id
                        );
                    }
                    record.fail(&err);
                }
            }
        }
    }

    /// Keep the registry and the per-session transcripts file current.
    /// The registry lock is held across the write so concurrent segments
    /// serialize their read-modify-write of the same file.
    async fn upsert_record(&self, record: Transcription) {
        let session_id = record.session_id.clone();
        let mut records = self.records.lock().await;
        records.insert((session_id.clone(), record.segment_index), record);

        let mut session_records: Vec<&Transcription> = records
            .iter()
            .filter(|((sid, _), _)| *sid == session_id)
            .map(|(_, r)| r)
            .collect();
        session_records.sort_by_key(|r| r.segment_index);

        if let Err(e) = self.write_transcripts(&session_id, &session_records) {
            warn!(
                "Failed to persist transcription records for session {}: {:#}",
                session_id, e
            );
        }
    }

    fn write_transcripts(&self, session_id: &str, records: &[&Transcription]) -> Result<()> {
        let dir = self.store.session_dir(session_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory: {}", dir.display()))?;
        let path = dir.join(TRANSCRIPTS_FILE);
        let raw = serde_json::to_string_pretty(records)?;
        fs::write(&path, raw)
            .with_context(|| format!("Failed to write transcripts: {}", path.display()))?;
        Ok(())
    }
}
