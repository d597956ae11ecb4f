//! Batch extractor.
//!
//! Partition -> prompt -> call -> parse -> align, with failures isolated to the
//! batch that caused them. Output length and order always mirror the input.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ExtractConfig;
use crate::error::{BatchFailure, ServiceError};
use crate::message::Message;
use crate::prompt::build_prompt;
use crate::reply::parse_reply;
use crate::service::{CompletionRequest, CompletionService};

/// Loosely-typed trade: whatever keys the model produced.
pub type TradeRecord = Map<String, Value>;

/// One output row per input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub timestamp: String,
    /// `None` means either "no trade" or "the batch failed"; see [`RunReport`]
    /// to tell them apart.
    pub llm_structured: Option<TradeRecord>,
}

/// Why and where a batch fell back to nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDiagnostic {
    pub batch_index: usize,
    /// Offset of the batch's first message in the input.
    pub first_message: usize,
    pub len: usize,
    pub first_timestamp: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub messages: usize,
    pub batches: usize,
    pub extracted: usize,
    pub failed_batches: Vec<BatchDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct ExtractionRun {
    pub results: Vec<ExtractionResult>,
    pub report: RunReport,
}

type Slots = Vec<Option<TradeRecord>>;

pub struct Extractor<S> {
    service: S,
    config: ExtractConfig,
    progress: ProgressBar,
}

impl<S: CompletionService> Extractor<S> {
    pub fn new(service: S, config: ExtractConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            service,
            config,
            progress: ProgressBar::hidden(),
        })
    }

    /// Tick `progress` once per finished batch.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Extract one message sequence. Never fails: batch problems become
    /// null results plus a [`BatchDiagnostic`].
    pub async fn extract(&self, messages: &[Message]) -> ExtractionRun {
        let run_id = Uuid::new_v4();
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let batches: Vec<&[Message]> = messages.chunks(self.config.batch_size).collect();

        info!(
            "run {}: {} messages in {} batches (batch_size={}, concurrency={}, model={})",
            run_id,
            messages.len(),
            batches.len(),
            self.config.batch_size,
            self.config.concurrency,
            self.config.model
        );
        self.progress.set_position(0);
        self.progress.set_length(batches.len() as u64);

        // Completion order is arbitrary once concurrency > 1; slots are
        // filled by batch index.
        let mut slots: Vec<Option<Slots>> = (0..batches.len()).map(|_| None).collect();
        let mut failed_batches = Vec::new();

        let mut outcomes = stream::iter(batches.iter().enumerate().map(|(index, batch)| async move {
            (index, self.run_batch(batch, deadline).await)
        }))
        .buffer_unordered(self.config.concurrency);

        while let Some((index, outcome)) = outcomes.next().await {
            self.progress.inc(1);
            let batch = batches[index];
            match outcome {
                Ok(records) => slots[index] = Some(records),
                Err(failure) => {
                    let first_message = index * self.config.batch_size;
                    warn!(
                        "run {}: batch {} (messages {}..{}) fell back to nulls: {}",
                        run_id,
                        index,
                        first_message,
                        first_message + batch.len(),
                        failure
                    );
                    failed_batches.push(BatchDiagnostic {
                        batch_index: index,
                        first_message,
                        len: batch.len(),
                        first_timestamp: batch[0].timestamp.clone(),
                        reason: failure.to_string(),
                    });
                }
            }
        }
        drop(outcomes);
        failed_batches.sort_by_key(|d| d.batch_index);

        let mut results = Vec::with_capacity(messages.len());
        for (batch, slot) in batches.iter().zip(slots) {
            let records = slot.unwrap_or_else(|| vec![None; batch.len()]);
            results.extend(batch.iter().zip(records).map(|(msg, llm_structured)| ExtractionResult {
                timestamp: msg.timestamp.clone(),
                llm_structured,
            }));
        }

        let extracted = results.iter().filter(|r| r.llm_structured.is_some()).count();
        info!(
            "run {}: {} of {} messages carry a trade, {} failed batches",
            run_id,
            extracted,
            results.len(),
            failed_batches.len()
        );

        ExtractionRun {
            report: RunReport {
                run_id,
                messages: messages.len(),
                batches: batches.len(),
                extracted,
                failed_batches,
            },
            results,
        }
    }

    async fn run_batch(&self, batch: &[Message], deadline: Option<Instant>) -> Result<Slots, BatchFailure> {
        // batches dispatched after the deadline never reach the service
        if deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(ServiceError::DeadlineExceeded.into());
        }

        let request = CompletionRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(batch, self.config.use_clean_text),
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_output_tokens,
        };

        let reply = match deadline {
            Some(at) => tokio::time::timeout_at(at, self.call_with_retries(&request))
                .await
                .map_err(|_| ServiceError::DeadlineExceeded)??,
            None => self.call_with_retries(&request).await?,
        };

        Ok(parse_reply(&reply, batch.len())?)
    }

    async fn call_with_retries(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let mut attempt = 0usize;
        let mut delay_ms = 750u64;

        loop {
            attempt += 1;
            match self.service.call_for_batch(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt <= self.config.max_retries => {
                    warn!("attempt {} failed ({}), retrying in {}ms", attempt, e, delay_ms);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms as f64 * 1.75).min(5000.0) as u64;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out canned replies in call order.
    struct Scripted(Mutex<VecDeque<Result<String, ServiceError>>>);

    impl Scripted {
        fn new(replies: Vec<Result<String, ServiceError>>) -> Self {
            Self(Mutex::new(replies.into()))
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn call_for_batch(&self, _request: &CompletionRequest) -> Result<String, ServiceError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transport("script exhausted".into())))
        }
    }

    fn msgs(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::new(format!("09:30:{i:02}"), format!("m{i}"))).collect()
    }

    fn cfg(batch_size: usize) -> ExtractConfig {
        ExtractConfig { batch_size, ..Default::default() }
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let ex = Extractor::new(Scripted::new(vec![]), cfg(3)).unwrap();
        let run = ex.extract(&[]).await;
        assert!(run.results.is_empty());
        assert_eq!(run.report.batches, 0);
        assert!(run.report.failed_batches.is_empty());
    }

    #[tokio::test]
    async fn total_failure_keeps_alignment() {
        let ex = Extractor::new(Scripted::new(vec![]), cfg(2)).unwrap();
        let input = msgs(5);
        let run = ex.extract(&input).await;
        assert_eq!(run.results.len(), 5);
        for (r, m) in run.results.iter().zip(&input) {
            assert_eq!(r.timestamp, m.timestamp);
            assert!(r.llm_structured.is_none());
        }
        assert_eq!(run.report.failed_batches.len(), 3);
        assert_eq!(run.report.failed_batches[2].first_message, 4);
        assert_eq!(run.report.failed_batches[2].len, 1);
    }

    #[tokio::test]
    async fn malformed_batch_is_isolated() {
        let svc = Scripted::new(vec![
            Ok(r#"[{"ticker":"SPY"}, null]"#.into()),
            Ok("[null]".into()), // too short for a batch of two
            Ok(r#"[{"ticker":"QQQ"}]"#.into()),
        ]);
        let ex = Extractor::new(svc, cfg(2)).unwrap();
        let run = ex.extract(&msgs(5)).await;

        let tickers: Vec<Option<&str>> = run
            .results
            .iter()
            .map(|r| r.llm_structured.as_ref().and_then(|t| t["ticker"].as_str()))
            .collect();
        assert_eq!(tickers, vec![Some("SPY"), None, None, None, Some("QQQ")]);
        assert_eq!(run.report.failed_batches.len(), 1);
        assert_eq!(run.report.failed_batches[0].batch_index, 1);
        assert_eq!(run.report.failed_batches[0].first_timestamp, "09:30:02");
        assert!(run.report.failed_batches[0].reason.contains("expected 2 elements"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_recover_transient_failures() {
        let svc = Scripted::new(vec![
            Err(ServiceError::Status { status: 429, body: "slow down".into() }),
            Ok(r#"[{"ticker":"SPY"}]"#.into()),
        ]);
        let ex = Extractor::new(svc, ExtractConfig { batch_size: 1, max_retries: 1, ..Default::default() }).unwrap();
        let run = ex.extract(&msgs(1)).await;
        assert_eq!(run.results[0].llm_structured, Some(json!({"ticker": "SPY"}).as_object().unwrap().clone()));
        assert!(run.report.failed_batches.is_empty());
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let svc = Scripted::new(vec![
            Err(ServiceError::Timeout),
            Ok(r#"[{"ticker":"SPY"}]"#.into()),
        ]);
        let ex = Extractor::new(svc, cfg(1)).unwrap();
        let run = ex.extract(&msgs(2)).await;
        // first batch consumed the timeout, second batch got the success
        assert!(run.results[0].llm_structured.is_none());
        assert!(run.results[1].llm_structured.is_some());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        assert!(Extractor::new(Scripted::new(vec![]), cfg(0)).is_err());
    }
}
