//! Tolerant JSON extraction from model output.
//!
//! Models wrap JSON in code fences or surround it with prose. The extractor
//! tries, in order: the whole text, the first fenced block, and the outermost
//! `{...}` or `[...]` span.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("valid regex")
});

/// Parse the JSON value embedded in `raw`, if any.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let fenced = FENCE_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|inner| serde_json::from_str::<Value>(inner.as_str().trim()).ok());
    if fenced.is_some() {
        debug!("JSON extracted from code fence");
        return fenced;
    }

    let embedded = [('{', '}'), ('[', ']')].into_iter().find_map(|(open, close)| {
        let start = trimmed.find(open)?;
        let end = trimmed.rfind(close)?;
        if start >= end {
            return None;
        }
        serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
    });
    if embedded.is_some() {
        debug!("JSON extracted from surrounding prose");
    }
    embedded
}
