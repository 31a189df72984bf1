//! Token-usage extraction from arbitrary JSON responses.
//!
//! Providers report usage in different shapes. The configured key selects a
//! field of the response (dotted paths reach into nested objects) and the
//! value is reduced to a single count:
//!
//! | Value at key | Result |
//! |--------------|--------|
//! | `1234` | `1234` |
//! | `{"total_tokens": 1234, …}` | `1234` |
//! | `{"prompt_tokens": 1000, "completion_tokens": 234}` | `1234` (`None` on overflow) |
//! | `"1234"` | `1234` |
//! | anything else / missing | `None` |

use serde_json::Value;

/// Extract a token count from `response` using `key`.
pub fn extract_token_usage(response: &Value, key: &str) -> Option<u64> {
    let value = lookup(response, key)?;
    match value {
        Value::Object(fields) => match fields.get("total_tokens").and_then(as_count) {
            Some(total) => Some(total),
            None => {
                // A sum that overflows is not a usable count.
                let mut counts = fields.values().filter_map(as_count).peekable();
                counts.peek()?;
                counts.try_fold(0u64, u64::checked_add)
            }
        },
        other => as_count(other),
    }
}

/// Resolve `key` against `root`. A key present verbatim wins over its
/// dotted-path interpretation.
fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    if let Some(v) = root.get(key) {
        return Some(v);
    }
    key.split('.')
        .try_fold(root, |node, segment| node.get(segment))
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
