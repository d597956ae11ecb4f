use std::time::Duration;

use anyhow::{bail, Result};

/// Everything the extractor needs to know about a run. Built once by the
/// caller and passed in; nothing is read from the environment here.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Messages per service call.
    pub batch_size: usize,
    /// Prefer `clean_text` over `raw_text` when both exist.
    pub use_clean_text: bool,
    /// Sampling temperature. 0 asks for the most deterministic output the
    /// service offers, which is still not guaranteed to be deterministic.
    pub temperature: f32,
    /// Reply truncation budget.
    pub max_output_tokens: u32,
    /// Model identifier forwarded to the service.
    pub model: String,
    /// Batches allowed in flight at once. 1 keeps the strictly sequential order of calls.
    pub concurrency: usize,
    /// Extra attempts per batch after a retryable service failure.
    pub max_retries: usize,
    /// Overall run deadline, measured from the start of `extract`.
    pub deadline: Option<Duration>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            use_clean_text: true,
            temperature: 0.0,
            max_output_tokens: 2048,
            model: "gpt-3.5-turbo".to_string(),
            concurrency: 1,
            max_retries: 0,
            deadline: None,
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            bail!("temperature must be a non-negative number, got {}", self.temperature);
        }
        if self.model.trim().is_empty() {
            bail!("model identifier must not be empty");
        }
        Ok(())
    }
}
