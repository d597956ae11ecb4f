//! Fingerprint deduplication and the loader that pools extractor output.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::Value;
use tracing::info;

use crate::error::StoreError;
use crate::extract::TradeRecord;
use crate::fingerprint::fingerprint;

/// Suffix of extractor output files.
pub const LLM_SUFFIX: &str = "_llm.json";

/// Keep the first record for each fingerprint, in encounter order.
///
/// Lossy on purpose: a later record with the same identity but a different
/// `size` (or any other field outside the fingerprint) is dropped without
/// being merged into the survivor.
pub fn dedupe(records: impl IntoIterator<Item = TradeRecord>) -> Vec<TradeRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in records {
        if seen.insert(fingerprint(&record)) {
            out.push(record);
        }
    }
    out
}

/// `*_llm.json` files in `dir`, sorted by file name so pooling order (and
/// therefore dedupe's first-seen winner) does not depend on the filesystem.
pub fn llm_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let io_err = |source| StoreError::Io { path: dir.to_path_buf(), source };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_llm = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(LLM_SUFFIX))
            .unwrap_or(false);
        if is_llm && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Pool every non-empty trade object from the extractor output files in `dir`.
/// Files are parsed in parallel; the pooled order is file-name order, then
/// message order within each file.
pub fn load_trades_from_dir(dir: &Path) -> Result<Vec<TradeRecord>, StoreError> {
    let files = llm_files(dir)?;
    let per_file: Vec<Vec<TradeRecord>> = files
        .par_iter()
        .map(|path| load_trades_from_file(path))
        .collect::<Result<_, _>>()?;

    let trades: Vec<TradeRecord> = per_file.into_iter().flatten().collect();
    info!("Loaded {} parsed trades from {} files in {}", trades.len(), files.len(), dir.display());
    Ok(trades)
}

pub fn load_trades_from_file(path: &Path) -> Result<Vec<TradeRecord>, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Array(rows) = doc else {
        return Err(StoreError::Shape { path: path.to_path_buf() });
    };

    Ok(rows
        .into_iter()
        .filter_map(|mut row| match row.get_mut("llm_structured").map(Value::take) {
            Some(Value::Object(trade)) if !trade.is_empty() => Some(trade),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> TradeRecord {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn first_record_wins() {
        let first = rec(json!({"ticker": "SPY", "type": "call", "strike": 420, "size": 10}));
        let second = rec(json!({"ticker": "spy", "type": "call", "strike": 420, "size": 99}));
        let out = dedupe(vec![first.clone(), second]);
        assert_eq!(out, vec![first]);
    }

    #[test]
    fn keeps_encounter_order_of_distinct_trades() {
        let a = rec(json!({"ticker": "QQQ"}));
        let b = rec(json!({"ticker": "SPY"}));
        let out = dedupe(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn idempotent() {
        let input = vec![
            rec(json!({"ticker": "SPY", "price": 1.23})),
            rec(json!({"ticker": "SPY", "price": 1.24})),
            rec(json!({"ticker": "SPY", "price": 1.32})),
            rec(json!({})),
            rec(json!({"size": 5})),
        ];
        let once = dedupe(input);
        assert_eq!(once.len(), 3);
        assert_eq!(dedupe(once.clone()), once);
    }
}
