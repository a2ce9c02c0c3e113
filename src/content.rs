//! Extracting the real text from arbitrarily nested tool-output shapes.
//!
//! Tool results arrive as JSON of unpredictable shape: a bare string, a
//! `{"content": ...}` wrapper, a list of content blocks, or several of those
//! nested. [`extract_text`] is a pure, depth-bounded tree walk: well-known
//! keys are tried in priority order, sequences are concatenated, and when no
//! key matches, the longest string anywhere in the subtree wins.

use serde_json::Value;

/// Keys tried first on mappings, in order.
const PRIORITY_KEYS: &[&str] = &["content", "text", "message", "body", "output", "result", "value"];

/// Recursion stops below this depth.
const MAX_DEPTH: usize = 8;

/// Pull the most plausible human text out of a parsed JSON value.
pub fn extract_text(value: &Value) -> String {
    walk(value, MAX_DEPTH).trim().to_string()
}

fn walk(value: &Value, depth: usize) -> String {
    if depth == 0 {
        return String::new();
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            for key in PRIORITY_KEYS {
                if let Some(inner) = map.get(*key) {
                    let text = walk(inner, depth - 1);
                    if !text.trim().is_empty() {
                        return text;
                    }
                }
            }
            // No priority key produced text: longest string wins
            map.values()
                .map(|v| walk(v, depth - 1))
                .max_by_key(|s| s.chars().count())
                .unwrap_or_default()
        }
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|v| walk(v, depth - 1))
                .filter(|s| !s.trim().is_empty())
                .collect();
            parts.join("\n")
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => String::new(),
    }
}
