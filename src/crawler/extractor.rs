//! Payload extraction from listing responses
//!
//! The listing endpoint wraps its JSON in a JSONP callback, and occasionally
//! returns an HTML error page instead. The payload is located by its
//! `{"rc":` prefix and the `]}}` that closes the row array, so the callback
//! name and any trailing text are irrelevant.

use crate::quote::{Quote, RecordNormalizer};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Shortest span from `{"rc":` to the first `]}}`
static PAYLOAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{"rc":.*?\]\}\}"#).expect("payload pattern should compile")
});

/// Rows and counts produced from one page body
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub page: u32,
    pub quotes: Vec<Quote>,
    /// Rows that failed the validity gate
    pub dropped: u64,
    /// False when the body carried no recognizable payload
    pub payload_found: bool,
}

/// Locates and parses the embedded payload object
///
/// Returns `None` when no payload is present or it is not valid JSON.
pub fn extract_payload(body: &str) -> Option<Value> {
    let Some(found) = PAYLOAD_PATTERN.find(body) else {
        tracing::debug!("No payload found in response ({} bytes)", body.len());
        return None;
    };

    match serde_json::from_str(found.as_str()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to parse embedded payload: {}", e);
            None
        }
    }
}

/// Row values under `data.diff`
///
/// The endpoint normally sends an array but has been seen to send an
/// object keyed by row index; both are accepted.
pub fn listing_rows(payload: &Value) -> Vec<&Value> {
    match payload.pointer("/data/diff") {
        Some(Value::Array(rows)) => rows.iter().collect(),
        Some(Value::Object(rows)) => rows.values().collect(),
        _ => Vec::new(),
    }
}

/// Extracts and normalizes every row of one page
///
/// Never fails: a body without a payload yields an empty result.
pub fn parse_page(
    page: u32,
    body: &str,
    normalizer: &RecordNormalizer,
    captured_at: DateTime<Utc>,
) -> PageResult {
    let Some(payload) = extract_payload(body) else {
        tracing::warn!("Page {} returned no usable data", page);
        return PageResult {
            page,
            ..PageResult::default()
        };
    };

    let rows = listing_rows(&payload);
    let mut quotes = Vec::with_capacity(rows.len());
    let mut dropped = 0;

    for row in rows {
        match normalizer.normalize(row, captured_at) {
            Some(quote) => quotes.push(quote),
            None => dropped += 1,
        }
    }

    tracing::debug!(
        "Page {}: {} quotes, {} rows dropped",
        page,
        quotes.len(),
        dropped
    );

    PageResult {
        page,
        quotes,
        dropped,
        payload_found: true,
    }
}
