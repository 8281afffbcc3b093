//! Transcription service client
//!
//! [`TranscriptionService`] turns a WAV payload into a raw provider
//! JSON value; normalization into tokens happens separately in the
//! transcript adapters so the pipeline can mix providers and scripted
//! test responses behind the same trait.

use crate::config::SttConfig;
use crate::error::{Result, SubweaveError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// A speech-to-text backend
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe a WAV payload and return the raw provider response
    async fn transcribe(&self, audio: Vec<u8>) -> Result<serde_json::Value>;
}

#[async_trait]
impl<T: TranscriptionService + ?Sized> TranscriptionService for std::sync::Arc<T> {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<serde_json::Value> {
        (**self).transcribe(audio).await
    }
}

/// Client for the ElevenLabs speech-to-text endpoint
#[derive(Debug)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    config: SttConfig,
}

impl ElevenLabsClient {
    pub fn new(config: SttConfig) -> Result<Self> {
        if config.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(SubweaveError::AuthFailed {
                service: "stt".to_string(),
                message: "no API key configured; set SUBWEAVE_STT_API_KEY".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SubweaveError::Other(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TranscriptionService for ElevenLabsClient {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<serde_json::Value> {
        debug!(bytes = audio.len(), "uploading audio for transcription");

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SubweaveError::Other(format!("failed to build upload part: {}", e)))?;
        let mut form = reqwest::multipart::Form::new()
            .text("model_id", "scribe_v1")
            .text("timestamps_granularity", "word")
            .part("file", part);
        if let Some(language) = &self.config.language {
            form = form.text("language_code", language.clone());
        }

        let response = self
            .client
            .post(&self.config.base_url)
            .header("xi-api-key", self.config.api_key.as_deref().unwrap_or(""))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubweaveError::ServiceTimeout {
                        service: "stt".to_string(),
                        seconds: self.config.timeout_secs,
                    }
                } else {
                    SubweaveError::MalformedResponse {
                        service: "stt".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SubweaveError::MalformedResponse {
            service: "stt".to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => SubweaveError::AuthFailed {
                    service: "stt".to_string(),
                    message: status.to_string(),
                },
                429 => SubweaveError::QuotaExceeded {
                    service: "stt".to_string(),
                },
                _ => SubweaveError::MalformedResponse {
                    service: "stt".to_string(),
                    message: format!("{}: {}", status, body),
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| SubweaveError::MalformedResponse {
            service: "stt".to_string(),
            message: format!("invalid json response: {}", e),
        })
    }
}

/// Placeholder for runs that never touch audio
///
/// The convert path feeds the pipeline an existing transcript, so no
/// transcription backend is configured. Any attempt to use it is a
/// bug in the caller.
pub struct UnconfiguredService;

#[async_trait]
impl TranscriptionService for UnconfiguredService {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<serde_json::Value> {
        Err(SubweaveError::AuthFailed {
            service: "stt".to_string(),
            message: "no transcription service configured for this run".to_string(),
        })
    }
}

/// Scripted transcription service for tests
#[cfg(test)]
pub struct MockTranscriptionService {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<serde_json::Value>>>,
}

#[cfg(test)]
impl MockTranscriptionService {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn with_response(self, response: serde_json::Value) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn with_failure(self, error: SubweaveError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }
}

#[cfg(test)]
#[async_trait]
impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<serde_json::Value> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!({ "words": [] })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_service_scripted_responses() {
        let service = MockTranscriptionService::new()
            .with_response(json!({"words": [{"text": "hi", "start": 0.0, "end": 0.3}]}))
            .with_failure(SubweaveError::QuotaExceeded {
                service: "stt".to_string(),
            });

        let first = service.transcribe(Vec::new()).await.unwrap();
        assert_eq!(first["words"][0]["text"], "hi");

        let second = service.transcribe(Vec::new()).await;
        assert!(matches!(
            second.unwrap_err(),
            SubweaveError::QuotaExceeded { .. }
        ));
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = SttConfig::default();
        assert!(matches!(
            ElevenLabsClient::new(config).unwrap_err(),
            SubweaveError::AuthFailed { .. }
        ));
    }
}
