//! Structured-or-fallback parsing of model replies.
//!
//! Replies are expected to carry one JSON object, either inside a fenced
//! code block or inline among prose. Each top-level section is decoded on
//! its own so a single malformed section does not discard the rest.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"))
}

fn outer_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

/// Finds the JSON object in a model reply: fenced block first, then the
/// widest `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    for caps in fenced_block().captures_iter(text) {
        if let Some(body) = caps.get(1) {
            if let Some(value) = parse_object(body.as_str()) {
                return Some(value);
            }
        }
    }

    let span = outer_object().find(text)?;
    let value = parse_object(span.as_str());
    if value.is_none() {
        debug!(reply_len = text.len(), "No parseable JSON object in reply");
    }
    value
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => None,
        Err(_) => {
            let span = outer_object().find(candidate)?;
            match serde_json::from_str::<Value>(span.as_str()) {
                Ok(value @ Value::Object(_)) => Some(value),
                _ => None,
            }
        }
    }
}

/// Decodes `root[key]`, falling back to `T::default()` when the section is
/// missing or does not match the expected shape.
pub fn section<T>(root: &Value, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match root.get(key) {
        Some(value) if !value.is_null() => {
            serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                debug!(section = key, error = %e, "Malformed section, using defaults");
                T::default()
            })
        }
        _ => T::default(),
    }
}

/// Decodes a list section item by item, dropping entries that do not fit.
pub fn section_items<T>(root: &Value, key: &str) -> Vec<T>
where
    T: DeserializeOwned,
{
    match root.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Raw sub-object, kept as JSON for strategy fields whose shape is model-defined.
pub fn raw_section(root: &Value, key: &str) -> Option<Value> {
    root.get(key)
        .filter(|v| v.is_object() && v.as_object().is_some_and(|m| !m.is_empty()))
        .cloned()
}
