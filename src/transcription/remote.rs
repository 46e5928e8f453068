use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::backend::TranscriptionBackend;
use super::error::TranscriptionError;
use crate::segment::Segment;

/// Remote transcription endpoint settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Transcription endpoint URL
    pub endpoint: String,
    /// Model identifier sent alongside the audio
    pub model: String,
    /// Bearer token
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Networked transcription backend: authenticated multipart POST with a
/// model field and a file field, expecting a JSON body with a `text` field.
pub struct RemoteBackend {
    client: Client,
    config: RemoteConfig,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("memoscribe/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    fn classify_status(status: StatusCode, body: &str) -> TranscriptionError {
        let snippet: String = body.chars().take(200).collect();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TranscriptionError::Auth(format!("HTTP {}: {}", status.as_u16(), snippet))
            }
            StatusCode::BAD_REQUEST
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UNPROCESSABLE_ENTITY => {
                TranscriptionError::Decode(format!("HTTP {}: {}", status.as_u16(), snippet))
            }
            _ => TranscriptionError::Unknown(format!("HTTP {}: {}", status.as_u16(), snippet)),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn transcribe(&self, segment: &Segment) -> Result<String, TranscriptionError> {
        let bytes = tokio::fs::read(&segment.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranscriptionError::FileMissing(segment.path.display().to_string())
            } else {
                TranscriptionError::Unknown(format!(
                    "Failed to read {}: {}",
                    segment.path.display(),
                    e
                ))
            }
        })?;

        debug!(
            "Uploading segment {} of session {} ({} bytes) to {}",
            segment.index,
            segment.session_id,
            bytes.len(),
            self.config.endpoint
        );

        let file_name = format!("segment-{:05}.wav", segment.index);
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Unknown(e.to_string()))?;

        let form = Form::new()
            .text("model", self.config.model.clone())
            .part("file", part);

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(TranscriptionError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Unknown(format!("Malformed response body: {}", e)))?;

        Ok(parsed.text)
    }
}
