//! Failure taxonomy.
//!
//! Batch-level failures ([`ServiceError`], [`ReplyError`]) are absorbed by the
//! extractor and turned into null results; [`StoreError`] is structural and
//! always propagates to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// The completion service could not produce reply text for a batch.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reply payload had no message content")]
    MissingContent,
    #[error("request timed out")]
    Timeout,
    #[error("run deadline exceeded before the batch completed")]
    DeadlineExceeded,
}

impl ServiceError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport(_) | ServiceError::Timeout => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::MissingContent | ServiceError::DeadlineExceeded => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// The reply text did not satisfy the positional array contract.
#[derive(Debug, Error, PartialEq)]
pub enum ReplyError {
    #[error("no JSON array found in reply")]
    NoArray,
    #[error("JSON decode failed: {0}")]
    Decode(String),
    #[error("decoded value is not an array")]
    NotArray,
    #[error("expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Why a whole batch fell back to nulls.
#[derive(Debug, Error)]
pub enum BatchFailure {
    #[error("service failure: {0}")]
    Service(#[from] ServiceError),
    #[error("malformed reply: {0}")]
    MalformedReply(#[from] ReplyError),
}

/// Structural problems with an input source. Fatal for that source.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: expected an array of messages or an object with a `messages` array")]
    Shape { path: PathBuf },
    #[error("{path}: message {index} has no string `timestamp`")]
    MissingTimestamp { path: PathBuf, index: usize },
}
