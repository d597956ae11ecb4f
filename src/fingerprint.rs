//! Trade identity for deduplication.

use serde_json::Value;

use crate::extract::TradeRecord;

/// Fields that make up a trade's identity, in key order.
pub const FINGERPRINT_FIELDS: [&str; 6] = ["ticker", "expiry", "strike", "type", "direction", "price"];

/// Prices are bucketed to this tick before comparison.
const PRICE_TICK: f64 = 0.05;

/// Normalized identity key: the six fields above, lowercased and trimmed,
/// joined with `|`. Total: any field that can't be normalized contributes an
/// empty component instead of an error. Fields outside the projection are never read.
pub fn fingerprint(record: &TradeRecord) -> String {
    FINGERPRINT_FIELDS
        .iter()
        .map(|&field| {
            let value = record.get(field);
            if field == "price" {
                price_component(value)
            } else {
                text_component(value)
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn text_component(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_lowercase(),
        Some(other) => other.to_string().to_lowercase(),
    }
}

fn price_component(value: Option<&Value>) -> String {
    let price = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match price.and_then(snap_to_tick) {
        Some(snapped) => format!("{:.2}", snapped),
        None => String::new(),
    }
}

/// Nearest multiple of the tick, ties to even. `None` for NaN/inf and for
/// values too large to bucket.
fn snap_to_tick(price: f64) -> Option<f64> {
    if !price.is_finite() {
        return None;
    }
    // + 0.0 turns -0.0 into 0.0
    let snapped = (price / PRICE_TICK).round_ties_even() * PRICE_TICK + 0.0;
    snapped.is_finite().then_some(snapped)
}
