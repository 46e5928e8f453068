use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::RecorderConfig;
use super::events::RecorderEvent;
use super::stats::RecorderStats;
use crate::audio::{encode_wav, AudioFrame, CaptureSource};
use crate::cache::SegmentCache;
use crate::segment::Segment;
use crate::store::DiskSegmentStore;
use crate::transcription::TranscriptionOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

enum RecorderCommand {
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<RecorderStats>,
    },
    SetSegmentDuration {
        duration: Duration,
        reply: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<RecorderStats>,
    },
}

/// Handle to the recorder actor
pub struct SegmentRecorder {
    cmd_tx: mpsc::Sender<RecorderCommand>,
    event_tx: mpsc::Sender<RecorderEvent>,
}

impl SegmentRecorder {
    /// Spawn the recorder actor. The actor owns the capture source and
    /// drives the rotation/pause state machine until the handle is
    /// dropped.
    pub fn spawn(
        config: RecorderConfig,
        source: Box<dyn CaptureSource>,
        store: DiskSegmentStore,
        cache: SegmentCache,
        orchestrator: Arc<TranscriptionOrchestrator>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);

        let actor = RecorderActor {
            config,
            source,
            store,
            cache,
            orchestrator,
            state: RecorderState::Idle,
            segment_index: 0,
            segment_started_at: Utc::now(),
            samples: Vec::new(),
            elapsed_before_pause: Duration::ZERO,
            armed_at: Instant::now(),
            deadline: Instant::now(),
            segments_finalized: 0,
            started_at: None,
            last_error: None,
        };
        tokio::spawn(actor.run(cmd_rx, event_rx));

        Self { cmd_tx, event_tx }
    }

    /// Sender for interruption/route-change events
    pub fn event_sender(&self) -> mpsc::Sender<RecorderEvent> {
        self.event_tx.clone()
    }

    /// Start recording: opens segment 0 and arms the rotation deadline.
    /// Fails (and stays idle) if the capture source cannot start.
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderCommand::Start { reply }).await?;
        rx.await.context("Recorder actor dropped reply")?
    }

    pub async fn pause(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderCommand::Pause { reply }).await?;
        rx.await.context("Recorder actor dropped reply")
    }

    pub async fn resume(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderCommand::Resume { reply }).await?;
        rx.await.context("Recorder actor dropped reply")
    }

    /// Stop recording, finalizing the open segment the same way rotation
    /// does. In-flight transcriptions keep running to completion.
    pub async fn stop(&self) -> Result<RecorderStats> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderCommand::Stop { reply }).await?;
        rx.await.context("Recorder actor dropped reply")
    }

    /// Reconfigure the segment duration, applying the elapsed-time formula
    /// to the currently open segment
    pub async fn set_segment_duration(&self, duration: Duration) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderCommand::SetSegmentDuration { duration, reply })
            .await?;
        rx.await.context("Recorder actor dropped reply")
    }

    pub async fn stats(&self) -> Result<RecorderStats> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderCommand::Stats { reply }).await?;
        rx.await.context("Recorder actor dropped reply")
    }

    async fn send(&self, cmd: RecorderCommand) -> Result<()> {
        if self.cmd_tx.send(cmd).await.is_err() {
            bail!("Recorder task has terminated");
        }
        Ok(())
    }
}

struct RecorderActor {
    config: RecorderConfig,
    source: Box<dyn CaptureSource>,
    store: DiskSegmentStore,
    cache: SegmentCache,
    orchestrator: Arc<TranscriptionOrchestrator>,

    state: RecorderState,
    segment_index: u32,
    segment_started_at: DateTime<Utc>,
    samples: Vec<i16>,
    /// Recorded time accumulated in the open segment before the current
    /// arming (i.e. across pauses)
    elapsed_before_pause: Duration,
    /// When the rotation deadline was last armed
    armed_at: Instant,
    /// Rotation fires here; only observed while `Recording`
    deadline: Instant,
    segments_finalized: u32,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl RecorderActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<RecorderCommand>,
        mut event_rx: mpsc::Receiver<RecorderEvent>,
    ) {
        debug!("Recorder actor started for session {}", self.config.session_id);

        let mut frames_rx: Option<mpsc::Receiver<AudioFrame>> = None;

        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd, &mut frames_rx).await,
                    None => break,
                },

                Some(event) = event_rx.recv() => self.handle_event(event).await,

                // Guarded on state: a deadline that fires after a pause or
                // stop was processed is simply never observed, which is
                // what rules out double-finalizing a segment.
                _ = tokio::time::sleep_until(self.deadline),
                    if self.state == RecorderState::Recording =>
                {
                    debug!("Rotation deadline reached for session {}", self.config.session_id);
                    self.rotate().await;
                }

                frame = recv_frame(&mut frames_rx) => match frame {
                    Some(frame) => self.push_frame(frame),
                    None => frames_rx = None,
                },
            }
        }

        debug!("Recorder actor stopped for session {}", self.config.session_id);
    }

    async fn handle_command(
        &mut self,
        cmd: RecorderCommand,
        frames_rx: &mut Option<mpsc::Receiver<AudioFrame>>,
    ) {
        match cmd {
            RecorderCommand::Start { reply } => {
                let _ = reply.send(self.start(frames_rx).await);
            }
            RecorderCommand::Pause { reply } => {
                self.pause_recording();
                let _ = reply.send(());
            }
            RecorderCommand::Resume { reply } => {
                self.resume_recording().await;
                let _ = reply.send(());
            }
            RecorderCommand::Stop { reply } => {
                self.stop_recording(frames_rx).await;
                let _ = reply.send(self.snapshot());
            }
            RecorderCommand::SetSegmentDuration { duration, reply } => {
                self.reconfigure_duration(duration).await;
                let _ = reply.send(());
            }
            RecorderCommand::Stats { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_event(&mut self, event: RecorderEvent) {
        debug!("Recorder event: {:?}", event);
        match event {
            RecorderEvent::InterruptionBegan => self.pause_recording(),
            RecorderEvent::InterruptionEnded { should_resume } => {
                if should_resume {
                    self.resume_recording().await;
                }
            }
            RecorderEvent::RouteChanged { device_lost } => {
                if device_lost {
                    self.pause_recording();
                }
            }
        }
    }

    async fn start(&mut self, frames_rx: &mut Option<mpsc::Receiver<AudioFrame>>) -> Result<()> {
        match self.state {
            RecorderState::Recording | RecorderState::Paused => {
                warn!("Recording already started");
                return Ok(());
            }
            RecorderState::Idle | RecorderState::Stopped => {}
        }

        let rx = match self.source.start().await {
            Ok(rx) => rx,
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Capture source failed to start: {}", message);
                self.last_error = Some(message);
                return Err(e.context("Failed to start capture"));
            }
        };
        *frames_rx = Some(rx);

        if let Err(e) = self.cache.create(&self.config.session_id).await {
            warn!("Failed to register cache entry: {:#}", e);
        }

        self.state = RecorderState::Recording;
        self.started_at = Some(Utc::now());
        self.last_error = None;
        self.segment_index = 0;
        self.segments_finalized = 0;
        self.open_segment();

        info!(
            "Recording started: session {} ({:?} segments, {} Hz)",
            self.config.session_id, self.config.segment_duration, self.config.sample_rate
        );

        Ok(())
    }

    fn pause_recording(&mut self) {
        if self.state != RecorderState::Recording {
            debug!("Pause ignored in state {:?}", self.state);
            return;
        }

        self.elapsed_before_pause += self.armed_at.elapsed();
        self.state = RecorderState::Paused;
        info!(
            "Recording paused at {:?} into segment {}",
            self.elapsed_before_pause, self.segment_index
        );
    }

    async fn resume_recording(&mut self) {
        if self.state != RecorderState::Paused {
            debug!("Resume ignored in state {:?}", self.state);
            return;
        }

        self.state = RecorderState::Recording;

        let remaining = self
            .config
            .segment_duration
            .saturating_sub(self.elapsed_before_pause);

        if remaining.is_zero() {
            // The segment already used up its budget before the pause.
            // Re-arm first so the finalized duration doesn't count the gap.
            self.arm(Duration::ZERO);
            self.rotate().await;
        } else {
            self.arm(remaining);
            info!(
                "Recording resumed, {:?} left in segment {}",
                remaining, self.segment_index
            );
        }
    }

    async fn stop_recording(&mut self, frames_rx: &mut Option<mpsc::Receiver<AudioFrame>>) {
        match self.state {
            RecorderState::Recording | RecorderState::Paused => {}
            _ => {
                warn!("Stop ignored in state {:?}", self.state);
                return;
            }
        }

        // A short final segment is finalized exactly like a rotation
        self.finalize_segment().await;
        self.state = RecorderState::Stopped;
        *frames_rx = None;

        if let Err(e) = self.source.stop().await {
            warn!("Capture source failed to stop cleanly: {:#}", e);
        }

        info!(
            "Recording stopped: session {} ({} segments)",
            self.config.session_id, self.segments_finalized
        );
    }

    async fn reconfigure_duration(&mut self, duration: Duration) {
        let previous = self.config.segment_duration;
        self.config.segment_duration = duration;
        info!("Segment duration changed: {:?} -> {:?}", previous, duration);

        match self.state {
            RecorderState::Recording => {
                let elapsed = self.elapsed_before_pause + self.armed_at.elapsed();
                match duration.checked_sub(elapsed) {
                    Some(remaining) if !remaining.is_zero() => self.arm(remaining),
                    // Already over the new budget
                    _ => self.rotate().await,
                }
            }
            RecorderState::Paused => {
                if self.elapsed_before_pause >= duration {
                    // Over budget while paused: finalize now, keep the
                    // fresh segment paused until resume arms its deadline
                    self.finalize_segment().await;
                    self.segment_index += 1;
                    self.open_segment_paused();
                }
            }
            _ => {}
        }
    }

    /// Finalize the open segment and open the next one
    async fn rotate(&mut self) {
        self.finalize_segment().await;
        self.segment_index += 1;
        self.open_segment();
    }

    fn open_segment(&mut self) {
        self.segment_started_at = Utc::now();
        self.samples.clear();
        self.elapsed_before_pause = Duration::ZERO;
        self.arm(self.config.segment_duration);
        debug!(
            "Opened segment {} of session {}",
            self.segment_index, self.config.session_id
        );
    }

    /// Open the next segment without arming the deadline (used when a
    /// rotation happens while paused)
    fn open_segment_paused(&mut self) {
        self.segment_started_at = Utc::now();
        self.samples.clear();
        self.elapsed_before_pause = Duration::ZERO;
        debug!(
            "Opened segment {} of session {} (paused)",
            self.segment_index, self.config.session_id
        );
    }

    fn arm(&mut self, remaining: Duration) {
        self.armed_at = Instant::now();
        self.deadline = self.armed_at + remaining;
    }

    fn push_frame(&mut self, frame: AudioFrame) {
        // Frames that arrive while paused or stopped are discarded;
        // tearing capture down is the source's concern, not the state
        // machine's.
        if self.state == RecorderState::Recording {
            self.samples.extend_from_slice(&frame.samples);
        }
    }

    /// Finalize the open segment: encode, write durably, hand bytes to the
    /// cache, and kick off transcription. Transcription is fire-and-forget;
    /// a later stop does not cancel it.
    async fn finalize_segment(&mut self) {
        let recorded = self.recorded_in_segment();

        let bytes = match encode_wav(&self.samples, self.config.sample_rate, self.config.channels) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Failed to encode segment {} of session {}: {:#}",
                    self.segment_index, self.config.session_id, e
                );
                self.last_error = Some(format!("{:#}", e));
                return;
            }
        };

        let path = match self
            .store
            .append_segment(&self.config.session_id, self.segment_index, &bytes)
        {
            Ok(path) => path,
            Err(e) => {
                // Keep going: the cache still gets the bytes, and
                // transcription will classify the missing blob itself.
                error!(
                    "Durable write failed for segment {} of session {}: {:#}",
                    self.segment_index, self.config.session_id, e
                );
                self.store
                    .segment_path(&self.config.session_id, self.segment_index)
            }
        };

        if let Err(e) = self
            .cache
            .add_segment(&self.config.session_id, self.segment_index, bytes.clone())
            .await
        {
            warn!("Failed to cache segment {}: {:#}", self.segment_index, e);
        }

        let segment = Segment {
            session_id: self.config.session_id.clone(),
            index: self.segment_index,
            started_at: self.segment_started_at,
            duration: recorded,
            path,
            size_bytes: bytes.len(),
        };

        info!(
            "Finalized segment {} of session {} ({:?} recorded, {} bytes)",
            segment.index, segment.session_id, segment.duration, segment.size_bytes
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.transcribe(&segment).await;
        });

        self.segments_finalized += 1;
    }

    fn recorded_in_segment(&self) -> Duration {
        match self.state {
            RecorderState::Recording => self.elapsed_before_pause + self.armed_at.elapsed(),
            RecorderState::Paused => self.elapsed_before_pause,
            _ => Duration::ZERO,
        }
    }

    fn snapshot(&self) -> RecorderStats {
        RecorderStats {
            state: self.state,
            session_id: self.config.session_id.clone(),
            segments_finalized: self.segments_finalized,
            started_at: self.started_at,
            elapsed_in_segment: self.recorded_in_segment(),
            last_error: self.last_error.clone(),
        }
    }
}

async fn recv_frame(rx: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
