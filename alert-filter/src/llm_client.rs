use crate::config::LlmConfig;
use crate::prompt::SYSTEM_MESSAGE;
use crate::traits::CompletionClient;
use crate::types::{FilterError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

enum AttemptError {
    Retryable(String),
    Fatal(FilterError),
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (DeepSeek by default)
pub struct ChatCompletionClient {
    client: Client,
    config: LlmConfig,
    api_key: String,
    endpoint: String,
}

impl ChatCompletionClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        let client = Client::builder()
            .user_agent("alert-filter/0.1")
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            api_key,
            endpoint,
        })
    }

    async fn attempt(&self, prompt: &str) -> std::result::Result<String, AttemptError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AttemptError::Retryable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(AttemptError::Fatal(FilterError::LlmResponse(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            ))));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Retryable(format!("unreadable response body: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AttemptError::Retryable("response contained no content".to_string()))
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    fn client_name(&self) -> String {
        format!("{} ({})", self.config.model, self.config.base_url)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let base_delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff = ExponentialBackoff {
            current_interval: base_delay,
            initial_interval: base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: base_delay * 32,
            max_elapsed_time: None,
            ..Default::default()
        };

        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            debug!("Sending prompt of {} chars (attempt {}/{})", prompt.len(), attempt, attempts);

            match self.attempt(prompt).await {
                Ok(content) => return Ok(content),
                Err(AttemptError::Fatal(e)) => {
                    error!("LLM request failed permanently: {}", e);
                    return Err(e);
                }
                Err(AttemptError::Retryable(message)) => {
                    last_error = message;
                    if attempt < attempts {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "Attempt {} failed for {}: {}, retrying in {:?}",
                                attempt, self.endpoint, last_error, delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        error!("LLM request failed after {} attempts: {}", attempts, last_error);
        Err(FilterError::LlmExhausted { attempts, last_error })
    }
}

/// Completion client that replays scripted replies, for development and tests.
///
/// `None` entries, and calls past the end of the script, fail like an exhausted client.
pub struct MockCompletionClient {
    name: String,
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            name: "mock".to_string(),
            replies: Mutex::new(replies.into_iter().map(|reply| reply.map(Into::into)).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn client_name(&self) -> String {
        format!("Mock completion client ({})", self.name)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .flatten();

        reply.ok_or_else(|| FilterError::LlmExhausted {
            attempts: 1,
            last_error: "scripted failure".to_string(),
        })
    }
}
