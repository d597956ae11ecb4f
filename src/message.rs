//! Loader for the message files written by the ingestion/tagging stages.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::StoreError;

/// One timestamped chat line. Timestamps are unique within a file only.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub timestamp: String,
    /// `raw_text`, or the ingestion stage's `text` when `raw_text` is absent or null.
    pub raw_text: Option<String>,
    pub clean_text: Option<String>,
}

impl Message {
    pub fn new(timestamp: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            raw_text: Some(raw_text.into()),
            clean_text: None,
        }
    }

    pub fn with_clean_text(mut self, clean_text: impl Into<String>) -> Self {
        self.clean_text = Some(clean_text.into());
        self
    }

    /// Text sent to the model: clean text when requested and non-empty,
    /// otherwise raw text, otherwise nothing.
    pub fn text(&self, use_clean_text: bool) -> &str {
        if use_clean_text {
            if let Some(clean) = self.clean_text.as_deref().filter(|t| !t.is_empty()) {
                return clean;
            }
        }
        self.raw_text.as_deref().unwrap_or("")
    }
}

/// Read a message file. Accepts either a bare array of messages or the
/// ingestion wrapper `{"broker": ..., "messages": [...]}`.
pub fn load_messages(path: &Path) -> Result<Vec<Message>, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    messages_from_value(doc, path)
}

fn messages_from_value(doc: Value, path: &Path) -> Result<Vec<Message>, StoreError> {
    let items = match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => items,
            _ => return Err(StoreError::Shape { path: path.to_path_buf() }),
        },
        _ => return Err(StoreError::Shape { path: path.to_path_buf() }),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let timestamp = item
                .get("timestamp")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::MissingTimestamp {
                    path: path.to_path_buf(),
                    index,
                })?;
            let raw_text = item
                .get("raw_text")
                .and_then(Value::as_str)
                .or_else(|| item.get("text").and_then(Value::as_str))
                .map(str::to_string);
            let clean_text = item.get("clean_text").and_then(Value::as_str).map(str::to_string);
            Ok(Message {
                timestamp: timestamp.to_string(),
                raw_text,
                clean_text,
            })
        })
        .collect()
}
