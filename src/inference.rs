//! Language-model client abstraction and the Ollama implementation.
//!
//! Every model-touching stage of the pipeline goes through the
//! [`InferenceClient`] trait, which keeps the stages testable with stub
//! clients and keeps transport details in one place.
//!
//! # Retry Strategy
//!
//! [`OllamaClient`] makes at most `inference.max_attempts` attempts (two by
//! default):
//! - network errors, per-call timeouts, HTTP 429 and 5xx → retry
//! - HTTP 404 → [`ModelError::ModelNotFound`], no retry
//! - other HTTP 4xx → fail immediately
//! - backoff doubles from `inference.retry_backoff_ms`

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::error::ModelError;

/// Generation options understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    /// Temperature 0, for classification, extraction and SQL drafting.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A completed (non-streaming) generation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Generation {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Text generation backend.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Returns the model identifier (e.g. `"deepseek-r1:1.5b"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ModelError>;
}

// ============ Ollama ============

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Client for a local Ollama instance's `POST /api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ModelError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        let endpoint = format!("{}/api/generate", self.url);

        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.retry_backoff * (1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<Generation>()
                            .await
                            .map_err(|e| ModelError::InvalidResponse(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = if status == reqwest::StatusCode::NOT_FOUND {
                        ModelError::ModelNotFound(self.model.clone())
                    } else {
                        ModelError::Status {
                            status: status.as_u16(),
                            body: body_text,
                        }
                    };

                    if !err.is_transient() {
                        tracing::error!(model = %self.model, error = %err, "inference request failed");
                        return Err(err);
                    }
                    tracing::warn!(attempt, error = %err, "inference request failed, retrying");
                    last_err = Some(err);
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        ModelError::Timeout
                    } else {
                        ModelError::Connection {
                            url: self.url.clone(),
                            message: e.to_string(),
                        }
                    };
                    tracing::warn!(attempt, error = %err, "inference request failed, retrying");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(ModelError::Timeout))
    }
}

/// Build the configured inference client, shared by every in-flight request.
pub fn create_client(config: &InferenceConfig) -> anyhow::Result<Arc<dyn InferenceClient>> {
    Ok(Arc::new(OllamaClient::new(config)?))
}

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?(</think>|\z)").expect("static regex"))
}

/// Remove `<think>…</think>` reasoning blocks (closed or truncated) and trim.
///
/// Reasoning models emit their chain of thought inline; none of it may
/// influence parsing of the actual answer.
pub fn visible_text(raw: &str) -> String {
    think_block().replace_all(raw, "").trim().to_string()
}

/// Scripted clients for unit tests.
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&str) -> Result<String, ModelError> + Send + Sync>;

    /// Answers every prompt through a closure, optionally after a delay.
    pub struct StubClient {
        responder: Responder,
        delay: Option<Duration>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl StubClient {
        pub fn new(
            f: impl Fn(&str) -> Result<String, ModelError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(f),
                delay: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            let text = text.to_string();
            Self::new(move |_| Ok(text.clone()))
        }

        pub fn failing() -> Self {
            Self::new(|_| {
                Err(ModelError::Status {
                    status: 500,
                    body: "boom".into(),
                })
            })
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for StubClient {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<Generation, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.responder)(prompt).map(|response| Generation {
                model: "stub".into(),
                response,
                done: true,
            })
        }
    }
}
