//! Language model client
//!
//! The segmenter only needs one operation: send a system and user
//! prompt, get text back. [`LanguageModel`] keeps that surface minimal
//! so tests can script responses, and [`OpenAiCompatClient`] speaks
//! the OpenAI-compatible chat completions shape used by DeepSeek and
//! most hosted models.

use crate::config::LlmConfig;
use crate::defaults;
use crate::error::{Result, SubweaveError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A chat-style language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one exchange and return the assistant's text
    ///
    /// Low temperatures keep retries meaningful; callers pass the
    /// value so one client can serve phases with different needs.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<T> {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        (**self).complete(system, user, temperature).await
    }
}

/// Retry an async operation with exponential backoff
///
/// Only errors classified retryable by [`SubweaveError::is_retryable`]
/// are retried; the rest surface immediately. After the final attempt
/// the error is wrapped in [`SubweaveError::ServiceUnavailable`].
pub async fn with_retries<T, F, Fut>(
    service: &'static str,
    unit: &'static str,
    index: usize,
    retries: u32,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = retries.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = defaults::RETRY_BASE_DELAY_MS * (1u64 << (attempt - 1));
            warn!(service, unit, index, attempt, delay_ms = delay, "retrying");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(SubweaveError::ServiceUnavailable {
        service: service.to_string(),
        unit: unit.to_string(),
        index,
        attempts,
        message: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string()),
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for OpenAI-compatible chat completion endpoints
#[derive(Debug)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(SubweaveError::AuthFailed {
                service: "llm".to_string(),
                message: "no API key configured; set SUBWEAVE_LLM_API_KEY".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SubweaveError::Other(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn map_status(&self, status: reqwest::StatusCode, body: &str) -> SubweaveError {
        match status.as_u16() {
            401 | 403 => SubweaveError::AuthFailed {
                service: "llm".to_string(),
                message: format!("{}: {}", status, truncate(body, 200)),
            },
            429 => SubweaveError::QuotaExceeded {
                service: "llm".to_string(),
            },
            _ => SubweaveError::MalformedResponse {
                service: "llm".to_string(),
                message: format!("{}: {}", status, truncate(body, 200)),
            },
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatClient {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature,
        };
        debug!(model = %self.config.model, user_chars = user.len(), "sending chat request");

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or(""))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubweaveError::ServiceTimeout {
                        service: "llm".to_string(),
                        seconds: self.config.timeout_secs,
                    }
                } else {
                    SubweaveError::MalformedResponse {
                        service: "llm".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SubweaveError::MalformedResponse {
            service: "llm".to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(self.map_status(status, &body));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| SubweaveError::MalformedResponse {
                service: "llm".to_string(),
                message: format!("invalid chat response: {}", e),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SubweaveError::MalformedResponse {
                service: "llm".to_string(),
                message: "response contained no choices".to_string(),
            })
    }
}

/// Scripted language model for tests
#[cfg(test)]
pub struct MockLanguageModel {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
    pub calls: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.into()));
        self
    }

    pub fn with_failure(self, error: SubweaveError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }
}

#[cfg(test)]
#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, system: &str, user: &str, _temperature: f32) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}
