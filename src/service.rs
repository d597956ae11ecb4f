//! Completion service boundary.
//!
//! The extractor only ever sees [`CompletionService`]: one prompt in, raw reply
//! text or a [`ServiceError`] out. The OpenAI chat-completions client below is
//! the production implementation; tests substitute canned fakes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ServiceError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// One batch's request: the prompt plus sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send one prompt, return the generated text. The text is untrusted and
    /// may violate every formatting instruction in the prompt.
    async fn call_for_batch(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    async fn call_for_batch(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        (**self).call_for_batch(request).await
    }
}

// ================================
// OpenAI chat completions
// ================================

#[derive(Debug, Clone)]
pub struct OpenAiService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiService {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("HTTP client build failed")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiService {
    async fn call_for_batch(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });

        let send_started = Instant::now();
        debug!("[OpenAI] POST {} ({} prompt chars)", url, request.prompt.len());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let send_elapsed = send_started.elapsed();

        let status = resp.status();
        let raw = resp.text().await?;

        if !status.is_success() {
            warn!("[OpenAI] Non-success status {} (network={}ms)", status, send_elapsed.as_millis());
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: raw,
            });
        }

        let val: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| ServiceError::Transport(format!("undecodable completion payload: {e}")))?;
        info!("[OpenAI] Reply received (network={}ms)", send_elapsed.as_millis());
        reply_text(&val).ok_or(ServiceError::MissingContent)
    }
}

/// `choices[0].message.content` of a chat-completions payload.
fn reply_text(val: &serde_json::Value) -> Option<String> {
    val.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}
