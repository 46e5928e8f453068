use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::entry::CacheEntry;
use crate::store::DiskSegmentStore;

/// Cache bounds. Deserializable so the file config can carry this section
/// directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of sessions held in memory at once
    pub max_resident_sessions: usize,
    /// Per-session byte budget; crossing it trims the oldest indices
    pub session_byte_cap: usize,
    /// How many of the newest indices survive a trim
    pub trim_retain: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_resident_sessions: 10,
            session_byte_cap: 50 * 1024 * 1024,
            trim_retain: 30,
        }
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub resident_sessions: usize,
    pub max_resident_sessions: usize,
    pub resident_bytes: usize,
}

enum CacheCommand {
    Create {
        session_id: String,
        reply: oneshot::Sender<()>,
    },
    AddSegment {
        session_id: String,
        index: u32,
        bytes: Vec<u8>,
        reply: oneshot::Sender<()>,
    },
    GetSegment {
        session_id: String,
        index: u32,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
    GetAllSegments {
        session_id: String,
        reply: oneshot::Sender<BTreeMap<u32, Vec<u8>>>,
    },
    SaveToDisk {
        session_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    LoadFromDisk {
        session_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearAll {
        reply: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<CacheStats>,
    },
}

/// Cloneable async handle to the cache actor.
///
/// Every operation is a message on the actor's queue; getters await a
/// oneshot reply, so they are safe to call from any task.
#[derive(Clone)]
pub struct SegmentCache {
    cmd_tx: mpsc::Sender<CacheCommand>,
}

impl SegmentCache {
    /// Spawn the cache actor and return its handle
    pub fn spawn(config: CacheConfig, store: DiskSegmentStore) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = CacheActor {
            config,
            store,
            entries: HashMap::new(),
            ledger: VecDeque::new(),
        };
        tokio::spawn(actor.run(cmd_rx));

        Self { cmd_tx }
    }

    /// Register an empty entry for a session and mark it most recently used
    pub async fn create(&self, session_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::Create {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("Cache actor dropped reply")
    }

    /// Append segment bytes to a session's entry. A write against an
    /// unknown session is rejected (logged by the actor, not an error).
    pub async fn add_segment(&self, session_id: &str, index: u32, bytes: Vec<u8>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::AddSegment {
            session_id: session_id.to_string(),
            index,
            bytes,
            reply,
        })
        .await?;
        rx.await.context("Cache actor dropped reply")
    }

    /// Fetch one segment, reloading the session from the store if it was
    /// evicted. `None` if neither memory nor the store has it.
    pub async fn get_segment(&self, session_id: &str, index: u32) -> Result<Option<Vec<u8>>> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::GetSegment {
            session_id: session_id.to_string(),
            index,
            reply,
        })
        .await?;
        rx.await.context("Cache actor dropped reply")
    }

    /// Fetch every segment of a session, reloading from the store if
    /// needed. Empty if the session is unknown everywhere.
    pub async fn get_all_segments(&self, session_id: &str) -> Result<BTreeMap<u32, Vec<u8>>> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::GetAllSegments {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("Cache actor dropped reply")
    }

    /// Explicit flush of one resident session to the store
    pub async fn save_to_disk(&self, session_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::SaveToDisk {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("Cache actor dropped reply")?
    }

    /// Explicit reload of one session from the store
    pub async fn load_from_disk(&self, session_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::LoadFromDisk {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("Cache actor dropped reply")?
    }

    /// Flush every resident session to the store, then empty the cache
    pub async fn clear_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::ClearAll { reply }).await?;
        rx.await.context("Cache actor dropped reply")
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::Stats { reply }).await?;
        rx.await.context("Cache actor dropped reply")
    }

    async fn send(&self, cmd: CacheCommand) -> Result<()> {
        if self.cmd_tx.send(cmd).await.is_err() {
            bail!("Segment cache task has terminated");
        }
        Ok(())
    }
}

/// Owns all cache state. Mutations are serialized by construction: the
/// actor processes one command at a time, which is what guarantees the
/// ledger/entries bijection under concurrent producers and consumers.
struct CacheActor {
    config: CacheConfig,
    store: DiskSegmentStore,
    entries: HashMap<String, CacheEntry>,
    /// Resident session ids ordered by recency of access, most recent last
    ledger: VecDeque<String>,
}

impl CacheActor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<CacheCommand>) {
        debug!(
            "Segment cache actor started (max {} resident sessions)",
            self.config.max_resident_sessions
        );

        while let Some(cmd) = cmd_rx.recv().await {
            self.handle(cmd);
        }

        debug!("Segment cache actor stopped");
    }

    fn handle(&mut self, cmd: CacheCommand) {
        match cmd {
            CacheCommand::Create { session_id, reply } => {
                self.create(&session_id);
                let _ = reply.send(());
            }
            CacheCommand::AddSegment {
                session_id,
                index,
                bytes,
                reply,
            } => {
                self.add_segment(&session_id, index, bytes);
                let _ = reply.send(());
            }
            CacheCommand::GetSegment {
                session_id,
                index,
                reply,
            } => {
                let bytes = self.with_resident(&session_id, |entry| entry.get(index).cloned());
                let _ = reply.send(bytes.flatten());
            }
            CacheCommand::GetAllSegments { session_id, reply } => {
                let segments = self.with_resident(&session_id, |entry| entry.segments().clone());
                let _ = reply.send(segments.unwrap_or_default());
            }
            CacheCommand::SaveToDisk { session_id, reply } => {
                let _ = reply.send(self.save_to_disk(&session_id));
            }
            CacheCommand::LoadFromDisk { session_id, reply } => {
                let _ = reply.send(self.load_from_disk(&session_id));
            }
            CacheCommand::ClearAll { reply } => {
                self.clear_all();
                let _ = reply.send(());
            }
            CacheCommand::Stats { reply } => {
                let _ = reply.send(CacheStats {
                    resident_sessions: self.entries.len(),
                    max_resident_sessions: self.config.max_resident_sessions,
                    resident_bytes: self.entries.values().map(CacheEntry::total_bytes).sum(),
                });
            }
        }
    }

    fn create(&mut self, session_id: &str) {
        if !self.entries.contains_key(session_id) {
            self.entries
                .insert(session_id.to_string(), CacheEntry::new());
            debug!("Created cache entry for session {}", session_id);
        }
        self.touch(session_id);
        self.evict_to_cap();
    }

    fn add_segment(&mut self, session_id: &str, index: u32, bytes: Vec<u8>) {
        let Some(entry) = self.entries.get_mut(session_id) else {
            warn!(
                "Rejected segment {} for unknown session {} ({} bytes)",
                index,
                session_id,
                bytes.len()
            );
            return;
        };

        entry.insert(index, bytes);

        if entry.total_bytes() > self.config.session_byte_cap {
            let dropped = entry.trim_oldest(self.config.trim_retain);
            info!(
                "Session {} exceeded byte cap, trimmed {} oldest segments ({} resident)",
                session_id,
                dropped,
                entry.segment_count()
            );
        }

        self.touch(session_id);
        self.evict_to_cap();
    }

    /// Run `f` against a resident entry, reloading the session from the
    /// store first if it was evicted. `None` when the session is unknown
    /// everywhere (a cache miss is not an error).
    fn with_resident<T>(&mut self, session_id: &str, f: impl FnOnce(&CacheEntry) -> T) -> Option<T> {
        if !self.entries.contains_key(session_id) && !self.reload(session_id) {
            return None;
        }

        self.touch(session_id);
        let result = self.entries.get(session_id).map(f);
        self.evict_to_cap();
        result
    }

    /// Populate a fresh entry from the store. False if nothing durable
    /// exists (or the load failed, which the caller sees as a miss).
    fn reload(&mut self, session_id: &str) -> bool {
        match self.store.load(session_id) {
            Ok(Some((segments, meta))) => {
                debug!(
                    "Reloaded evicted session {} ({} segments)",
                    session_id, meta.segment_count
                );
                self.entries
                    .insert(session_id.to_string(), CacheEntry::from_segments(segments));
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("Failed to reload session {}: {:#}", session_id, e);
                false
            }
        }
    }

    fn save_to_disk(&mut self, session_id: &str) -> Result<()> {
        match self.entries.get(session_id) {
            Some(entry) => self.store.save(session_id, entry.segments()),
            // Nothing resident to flush; whatever exists is already durable
            None => Ok(()),
        }
    }

    fn load_from_disk(&mut self, session_id: &str) -> Result<()> {
        let Some((segments, _)) = self.store.load(session_id)? else {
            bail!("No stored session {}", session_id);
        };
        self.entries
            .insert(session_id.to_string(), CacheEntry::from_segments(segments));
        self.touch(session_id);
        self.evict_to_cap();
        Ok(())
    }

    fn clear_all(&mut self) {
        for (session_id, entry) in self.entries.drain() {
            if let Err(e) = self.store.save(&session_id, entry.segments()) {
                error!("Failed to flush session {} during clear: {:#}", session_id, e);
            }
        }
        self.ledger.clear();
        info!("Segment cache cleared");
    }

    /// Mark a session most recently used
    fn touch(&mut self, session_id: &str) {
        if let Some(pos) = self.ledger.iter().position(|id| id == session_id) {
            self.ledger.remove(pos);
        }
        self.ledger.push_back(session_id.to_string());
    }

    /// Evict least-recently-used sessions until the resident count fits.
    /// Each victim is flushed first; a failed flush is logged and the entry
    /// is dropped regardless, trading potential data loss for the memory
    /// bound.
    fn evict_to_cap(&mut self) {
        while self.entries.len() > self.config.max_resident_sessions {
            let Some(victim) = self.ledger.pop_front() else {
                break;
            };
            let Some(entry) = self.entries.remove(&victim) else {
                continue;
            };
            match self.store.save(&victim, entry.segments()) {
                Ok(()) => info!(
                    "Evicted session {} to disk ({} segments, {} bytes)",
                    victim,
                    entry.segment_count(),
                    entry.total_bytes()
                ),
                Err(e) => error!(
                    "Spillover failed for evicted session {}, dropping from memory anyway: {:#}",
                    victim, e
                ),
            }
        }
    }
}
