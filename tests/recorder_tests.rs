// Integration tests for the segment recorder state machine
//
// These run under tokio's paused clock so rotation deadlines, pauses, and
// interruptions can be driven deterministically. The capture source is a
// hand-fed channel; rotation timing does not depend on frames arriving.

use anyhow::Result;
use memoscribe::audio::{AudioFrame, CaptureSource};
use memoscribe::transcription::{
    OrchestratorConfig, TranscriptionBackend, TranscriptionError, TranscriptionOrchestrator,
};
use memoscribe::{
    CacheConfig, DiskSegmentStore, RecorderConfig, RecorderEvent, Segment, SegmentCache,
    SegmentRecorder,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Capture source backed by a channel the test feeds by hand
struct ManualSource {
    rx: Option<mpsc::Receiver<AudioFrame>>,
}

impl ManualSource {
    fn new() -> (Self, mpsc::Sender<AudioFrame>) {
        let (tx, rx) = mpsc::channel(100);
        (Self { rx: Some(rx) }, tx)
    }
}

#[async_trait::async_trait]
impl CaptureSource for ManualSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("source already started"))
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.rx.is_none()
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Backend that always succeeds instantly
struct InstantBackend;

#[async_trait::async_trait]
impl TranscriptionBackend for InstantBackend {
    fn name(&self) -> &str {
        "instant"
    }

    async fn transcribe(&self, _segment: &Segment) -> Result<String, TranscriptionError> {
        Ok("ok".to_string())
    }
}

struct Harness {
    recorder: SegmentRecorder,
    cache: SegmentCache,
    frames_tx: mpsc::Sender<AudioFrame>,
    session_id: String,
    _tmp: TempDir,
}

fn harness(segment_duration: Duration) -> Result<Harness> {
    let tmp = TempDir::new()?;
    let store = DiskSegmentStore::new(tmp.path())?;
    let cache = SegmentCache::spawn(CacheConfig::default(), store.clone());

    let orchestrator = Arc::new(TranscriptionOrchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(InstantBackend),
        Arc::new(InstantBackend),
        store.clone(),
    ));

    let (source, frames_tx) = ManualSource::new();

    let config = RecorderConfig {
        session_id: "test-session".to_string(),
        segment_duration,
        sample_rate: 16000,
        channels: 1,
    };

    let recorder = SegmentRecorder::spawn(config, Box::new(source), store, cache.clone(), orchestrator);

    Ok(Harness {
        recorder,
        cache,
        frames_tx,
        session_id: "test-session".to_string(),
        _tmp: tmp,
    })
}

#[tokio::test(start_paused = true)]
async fn test_rotation_fires_at_segment_duration() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(29)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    sleep(Duration::from_secs(2)).await;
    let stats = h.recorder.stats().await?;
    assert_eq!(stats.segments_finalized, 1);

    // Segment 0 landed in the cache; recording continues into segment 1
    assert!(h.cache.get_segment(&h.session_id, 0).await?.is_some());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_excludes_paused_time_from_rotation() -> Result<()> {
    // Pause at 10s into a 30s segment, resume after a 5s gap: the next
    // rotation fires 20s of recording time after resume.
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(10)).await;
    h.recorder.pause().await?;

    sleep(Duration::from_secs(5)).await;
    h.recorder.resume().await?;

    sleep(Duration::from_secs(19)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_rotation_while_paused() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(10)).await;
    h.recorder.pause().await?;

    // Well past the original deadline: the armed rotation must not fire
    sleep(Duration::from_secs(120)).await;
    let stats = h.recorder.stats().await?;
    assert_eq!(stats.segments_finalized, 0);
    assert_eq!(stats.elapsed_in_segment, Duration::from_secs(10));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_finalizes_short_segment() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(10)).await;
    let stats = h.recorder.stop().await?;

    assert_eq!(stats.segments_finalized, 1);
    assert!(h.cache.get_segment(&h.session_id, 0).await?.is_some());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_captured_frames_land_in_segment_bytes() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
    h.frames_tx
        .send(AudioFrame {
            samples: samples.clone(),
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        })
        .await?;

    sleep(Duration::from_millis(10)).await;
    h.recorder.stop().await?;

    let bytes = h
        .cache
        .get_segment(&h.session_id, 0)
        .await?
        .expect("segment bytes cached");
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes))?;
    let decoded: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(decoded, samples);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duration_reconfigure_rotates_when_over_budget() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(20)).await;
    // 20s already recorded against a new 10s budget: rotate immediately
    h.recorder
        .set_segment_duration(Duration::from_secs(10))
        .await?;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 1);

    // The fresh segment runs on the new duration
    sleep(Duration::from_secs(11)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duration_reconfigure_extends_open_segment() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(10)).await;
    h.recorder
        .set_segment_duration(Duration::from_secs(60))
        .await?;

    // Past the old 30s deadline but under the new budget
    sleep(Duration::from_secs(25)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    // 60s of recording time since the segment opened
    sleep(Duration::from_secs(26)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interruption_pauses_and_conditionally_resumes() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    let events = h.recorder.event_sender();
    h.recorder.start().await?;

    sleep(Duration::from_secs(10)).await;
    events.send(RecorderEvent::InterruptionBegan).await?;
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    // An end without resume permission stays paused
    events
        .send(RecorderEvent::InterruptionEnded {
            should_resume: false,
        })
        .await?;
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    events
        .send(RecorderEvent::InterruptionEnded {
            should_resume: true,
        })
        .await?;
    // 20s of budget left after the 10s recorded before the interruption
    sleep(Duration::from_secs(21)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_route_loss_pauses_recording() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    let events = h.recorder.event_sender();
    h.recorder.start().await?;

    sleep(Duration::from_secs(5)).await;
    events
        .send(RecorderEvent::RouteChanged { device_lost: true })
        .await?;
    sleep(Duration::from_secs(60)).await;

    let stats = h.recorder.stats().await?;
    assert_eq!(stats.segments_finalized, 0);
    assert_eq!(stats.elapsed_in_segment, Duration::from_secs(5));

    // A route change that keeps the device is ignored
    events
        .send(RecorderEvent::RouteChanged { device_lost: false })
        .await?;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_near_deadline_never_double_finalizes() -> Result<()> {
    let h = harness(Duration::from_secs(30))?;
    h.recorder.start().await?;

    // Pause just before the deadline; the armed rotation must not fire
    sleep(Duration::from_millis(29_900)).await;
    h.recorder.pause().await?;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 0);

    // Only the remaining 100ms of budget runs after resume
    h.recorder.resume().await?;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(h.recorder.stats().await?.segments_finalized, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_rotations_produce_gapless_indices() -> Result<()> {
    let h = harness(Duration::from_secs(10))?;
    h.recorder.start().await?;

    sleep(Duration::from_secs(35)).await;
    let stats = h.recorder.stop().await?;

    // Three full rotations plus the final short segment
    assert_eq!(stats.segments_finalized, 4);
    let segments = h.cache.get_all_segments(&h.session_id).await?;
    let indices: Vec<u32> = segments.keys().copied().collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    Ok(())
}
