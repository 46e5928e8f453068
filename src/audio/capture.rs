use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture source
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 100,
        }
    }
}

/// Continuous audio capture seam
///
/// Implementations push fixed-size frames into a channel until stopped:
/// file replay for tests and batch runs, silence for dry runs, a real
/// device backend in an embedding application.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Start capturing; returns the frame receiver
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing
    async fn stop(&mut self) -> Result<()>;

    /// Whether the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Emits zeroed frames at the configured cadence until stopped. Stands in
/// for a device when none is wired up.
pub struct SilenceSource {
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl SilenceSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config, task: None }
    }
}

#[async_trait::async_trait]
impl CaptureSource for SilenceSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(100);
        let config = self.config.clone();

        let samples_per_frame = (config.sample_rate as u64 * config.frame_duration_ms / 1000)
            as usize
            * config.channels as usize;

        self.task = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(config.frame_duration_ms));
            let mut timestamp_ms = 0u64;

            loop {
                interval.tick().await;
                let frame = AudioFrame {
                    samples: vec![0i16; samples_per_frame],
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += config.frame_duration_ms;
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "silence"
    }
}
