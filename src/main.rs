use anyhow::Result;
use clap::Parser;
use memoscribe::audio::{CaptureConfig, CaptureSource, FileSource, SilenceSource};
use memoscribe::transcription::{
    LocalBackend, OrchestratorConfig, RemoteBackend, RemoteConfig, SpeechEngine,
    TranscriptionError, TranscriptionOrchestrator,
};
use memoscribe::{Config, DiskSegmentStore, RecorderConfig, SegmentCache, SegmentRecorder};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "memoscribe")]
#[command(about = "Record audio in transcribed segments")]
struct Args {
    /// Config file (without extension), e.g. config/memoscribe
    #[arg(short, long)]
    config: Option<String>,

    /// WAV file to replay instead of capturing silence
    #[arg(short, long)]
    input: Option<String>,

    /// How long to record, in seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// Session identifier (generated if omitted)
    #[arg(short, long)]
    session_id: Option<String>,
}

/// Placeholder engine until a platform recognizer is wired up; reports the
/// capability unavailable so fallback outcomes are classified correctly.
struct NoopEngine;

#[async_trait::async_trait]
impl SpeechEngine for NoopEngine {
    fn is_available(&self) -> bool {
        false
    }

    async fn recognize(&self, _path: &Path) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::CapabilityUnavailable(
            "No on-device recognizer configured".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    info!("memoscribe v{}", env!("CARGO_PKG_VERSION"));
    info!("Storage root: {}", cfg.storage.root_path);
    info!(
        "Segments: {}s at {} Hz",
        cfg.recording.segment_duration_secs, cfg.recording.sample_rate
    );

    let store = DiskSegmentStore::new(&cfg.storage.root_path)?;
    let cache = SegmentCache::spawn(cfg.cache.clone(), store.clone());

    let api_key = std::env::var(&cfg.transcription.api_key_env).unwrap_or_else(|_| {
        warn!(
            "{} not set; remote transcription will fail authentication",
            cfg.transcription.api_key_env
        );
        String::new()
    });

    let remote = RemoteBackend::new(RemoteConfig::new(
        cfg.transcription.endpoint.clone(),
        cfg.transcription.model.clone(),
        api_key,
    ))?;
    let local = LocalBackend::new(Arc::new(NoopEngine));

    let orchestrator = Arc::new(TranscriptionOrchestrator::new(
        OrchestratorConfig {
            failure_threshold: cfg.transcription.failure_threshold,
        },
        Arc::new(remote),
        Arc::new(local),
        store.clone(),
    ));

    let source: Box<dyn CaptureSource> = match &args.input {
        Some(path) => Box::new(FileSource::new(path)),
        None => Box::new(SilenceSource::new(CaptureConfig {
            sample_rate: cfg.recording.sample_rate,
            channels: cfg.recording.channels,
            ..CaptureConfig::default()
        })),
    };

    let recorder_config = RecorderConfig {
        session_id: args
            .session_id
            .unwrap_or_else(|| RecorderConfig::default().session_id),
        segment_duration: Duration::from_secs(cfg.recording.segment_duration_secs),
        sample_rate: cfg.recording.sample_rate,
        channels: cfg.recording.channels,
    };
    let session_id = recorder_config.session_id.clone();

    let recorder = SegmentRecorder::spawn(
        recorder_config,
        source,
        store,
        cache.clone(),
        Arc::clone(&orchestrator),
    );

    recorder.start().await?;
    info!("Recording session {} for {}s", session_id, args.duration);

    sleep(Duration::from_secs(args.duration)).await;

    let stats = recorder.stop().await?;
    info!(
        "Recording finished: {} segments finalized",
        stats.segments_finalized
    );

    // Let in-flight transcriptions settle before reporting
    sleep(Duration::from_secs(2)).await;

    let cache_stats = cache.stats().await?;
    info!(
        "Cache: {}/{} resident sessions, {} bytes",
        cache_stats.resident_sessions, cache_stats.max_resident_sessions, cache_stats.resident_bytes
    );

    let status = orchestrator.status().await;
    info!(
        "Transcription: mode={:?}, consecutive failures={}, fallback active={}",
        status.mode, status.failure_count, status.is_fallback_active
    );

    for index in 0..stats.segments_finalized {
        if let Some(record) = orchestrator.get_transcription(&session_id, index).await {
            info!(
                "Segment {}: {:?} {}",
                index,
                record.status,
                if record.text.is_empty() {
                    record
                        .error_detail
                        .unwrap_or_else(|| "(no text)".to_string())
                } else {
                    record.text
                }
            );
        }
    }

    Ok(())
}
