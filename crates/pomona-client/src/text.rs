//! Text helpers shared by the adapters.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use pomona_core::config::SourceEntry;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6])\s*/?>").expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

/// Converts an HTML fragment to plain text.
///
/// Greenhouse and some feeds double-escape their markup, so entities are
/// decoded before tags are removed and once more afterwards.
pub fn strip_html(html: &str) -> String {
    let decoded = decode_entities(html);
    let with_breaks = BLOCK_BREAK.replace_all(&decoded, "\n");
    let stripped = TAG.replace_all(&with_breaks, " ");
    let text = decode_entities(&stripped);
    let text = WHITESPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Infers `remote`/`hybrid` from free text. `None` means on-site or unknown.
pub fn detect_remote_type<'a>(texts: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut remote = false;
    for text in texts {
        let lower = text.to_lowercase();
        if lower.contains("hybrid") {
            return Some("hybrid".to_string());
        }
        if lower.contains("remote")
            || lower.contains("work from home")
            || lower.contains("anywhere")
        {
            remote = true;
        }
    }
    remote.then(|| "remote".to_string())
}

/// Parses a provider salary figure such as `"85000.00"` or `"£45,000"`.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    (value > 0.0).then(|| value.round() as i64)
}

/// Rounds a numeric salary, dropping zero and negative values.
pub fn round_amount(value: Option<f64>) -> Option<i64> {
    value.filter(|v| *v > 0.0).map(|v| v.round() as i64)
}

/// Stable identifier for records that carry none: hex SHA-256 of the parts.
pub fn fallback_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Deserializes a provider id sent as either a JSON string or a number.
pub fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or numeric id, got {}",
            other
        ))),
    }
}

/// Entry parameter, or `default` when absent or blank.
pub fn param_or<'a>(entry: &'a SourceEntry, key: &str, default: &'a str) -> &'a str {
    entry
        .param(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

/// Entry's `base_url`, or the adapter's default host, without a trailing slash.
pub fn base_url(entry: &SourceEntry, default: &str) -> String {
    entry
        .base_url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Whole days from `since` to `now`, rounded up and at least 1. Used by
/// providers that filter by posting age instead of a timestamp.
pub fn lookback_days(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<u32> {
    let elapsed = now.signed_duration_since(since?);
    let mut days = elapsed.num_days();
    if elapsed > TimeDelta::days(days) {
        days += 1;
    }
    Some(u32::try_from(days.max(1)).unwrap_or(u32::MAX))
}

/// Splits a comma-separated parameter into trimmed, non-empty values.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
