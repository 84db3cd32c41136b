//! Claim parsing from raw completion text.
//!
//! Two tiers: strict JSON first, then line-splitting heuristics. The parser
//! never fails; malformed input yields an empty or partial claim list.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    /// Markdown code fence around a payload, with optional language tag
    static ref CODE_FENCE: Regex = Regex::new(
        r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(?P<body>.*?)\n?\s*```\s*$"
    ).unwrap();

    /// Leading bullet or dash markers on a fallback line
    static ref BULLET_PREFIX: Regex = Regex::new(r"^[\s\-*•]+").unwrap();
}

/// Parse raw completion output into claim texts.
///
/// # Behavior
/// - Blank input yields no claims
/// - A JSON array yields every object element with a non-empty `text`
/// - A JSON object with a `claims` array is read the same way
/// - Any other JSON value yields no claims
/// - Non-JSON text is split into lines with bullet markers removed
pub fn parse_claims(raw_output: &str) -> Vec<String> {
    if raw_output.trim().is_empty() {
        return Vec::new();
    }

    let payload = strip_code_fence(raw_output);

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => claims_from_json(&value),
        Err(_) => claims_from_lines(payload),
    }
}

pub(crate) fn strip_code_fence(raw: &str) -> &str {
    CODE_FENCE
        .captures(raw)
        .and_then(|caps| caps.name("body"))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

fn claims_from_json(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("claims") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

fn claims_from_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| BULLET_PREFIX.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
