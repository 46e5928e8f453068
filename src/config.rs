use anyhow::Result;
use serde::Deserialize;

use crate::cache::CacheConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub recording: RecordingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub transcription: TranscriptionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    pub segment_duration_secs: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    /// Remote transcription endpoint URL
    pub endpoint: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Consecutive remote failures before falling back to local
    pub failure_threshold: u32,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub root_path: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recording: RecordingConfig {
                segment_duration_secs: 30,
                sample_rate: 16000,
                channels: 1,
            },
            cache: CacheConfig::default(),
            transcription: TranscriptionConfig {
                endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                model: "whisper-1".to_string(),
                api_key_env: "MEMOSCRIBE_API_KEY".to_string(),
                failure_threshold: 5,
            },
            storage: StorageConfig {
                root_path: "recordings".to_string(),
            },
        }
    }
}
