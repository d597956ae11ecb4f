//! Reply parsing: model text -> exactly `k` positional slots.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ReplyError;

/// Pull the JSON array out of a reply and check it against the batch length.
///
/// The slice runs from the first `[` to the last `]`, so prose or code fences
/// around the array are tolerated. Anything else (undecodable slice, a
/// non-array value, a wrong element count) rejects the whole reply: the
/// positional contract is the only thing tying elements back to messages.
pub fn parse_reply(text: &str, expected: usize) -> Result<Vec<Option<Map<String, Value>>>, ReplyError> {
    let start = text.find('[').ok_or(ReplyError::NoArray)?;
    let end = text.rfind(']').ok_or(ReplyError::NoArray)?;
    if end < start {
        return Err(ReplyError::NoArray);
    }

    let decoded: Value =
        serde_json::from_str(&text[start..=end]).map_err(|e| ReplyError::Decode(e.to_string()))?;
    let Value::Array(items) = decoded else {
        return Err(ReplyError::NotArray);
    };
    if items.len() != expected {
        return Err(ReplyError::LengthMismatch {
            expected,
            actual: items.len(),
        });
    }

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                debug!("slot {} holds a non-object ({}); storing null", i + 1, other);
                None
            }
        })
        .collect())
}
