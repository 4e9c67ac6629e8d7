//! Client for the text-generation oracle (OpenAI-style chat completions).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::OracleConfig;
use crate::services::retry::{retry_with_backoff, RetryConfig, Retryable};
use crate::services::suggestion::{extract_template_dirs, strip_code_fences};

/// Longest error body kept in an error message.
const MAX_ERROR_BODY_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle API key is missing or invalid")]
    NotConfigured,

    #[error("Oracle returned transient status {status}: {body}")]
    Transient { status: u16, body: String },

    #[error("Oracle returned status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle response contained no usable template directories")]
    NoUsableSuggestions,
}

impl Retryable for OracleError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Statuses worth another attempt: rate limiting and gateway/server hiccups.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// A text-generation service answering one free-form prompt.
#[async_trait]
pub trait TemplateOracle: Send + Sync + std::fmt::Debug {
    /// Send `prompt` and return the generated text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, OracleError>;
}

/// Ask for template directories and extract them from the reply.
pub async fn suggest_directories(
    oracle: &dyn TemplateOracle,
    prompt: &str,
    max_tokens: u32,
) -> Result<Vec<String>, OracleError> {
    let text = oracle.complete(prompt, max_tokens).await?;
    tracing::debug!(raw = %text, "Raw oracle suggestion");
    extract_template_dirs(&text).ok_or(OracleError::NoUsableSuggestions)
}

/// Ask for a complete template document and strip fence markers from it.
pub async fn generate_document(
    oracle: &dyn TemplateOracle,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, OracleError> {
    let text = oracle.complete(prompt, max_tokens).await?;
    let document = strip_code_fences(&text);
    if document.is_empty() {
        return Err(OracleError::MalformedResponse("empty document".to_string()));
    }
    Ok(document)
}

/// Chat-completions client with bearer auth, a per-call timeout and
/// exponential backoff on transient failures.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl ChatCompletionClient {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config.api_key.clone().ok_or(OracleError::NotConfigured)?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            retry: RetryConfig::from(config),
        })
    }

    /// Build a shareable oracle, or `None` when no credential is configured.
    pub fn shared(config: &OracleConfig) -> Option<Arc<dyn TemplateOracle>> {
        match Self::new(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "Oracle disabled");
                None
            }
        }
    }

    async fn send_once(&self, body: &Value) -> Result<String, OracleError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY_LEN {
                let mut cut = MAX_ERROR_BODY_LEN;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(if is_transient_status(status) {
                OracleError::Transient {
                    status: status.as_u16(),
                    body: text,
                }
            } else {
                OracleError::Http {
                    status: status.as_u16(),
                    body: text,
                }
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                OracleError::MalformedResponse("missing choices[0].message.content".to_string())
            })
    }
}

#[async_trait]
impl TemplateOracle for ChatCompletionClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
        });

        retry_with_backoff(&self.retry, "oracle_completion", || self.send_once(&body)).await
    }
}
