//! Structured-data extraction from free-text model output.
//!
//! Models wrap JSON in prose, fence it with or without a language tag, or
//! break it outright. The extractor tries an ordered list of pure strategies
//! and returns the first structured value any of them produces.

mod recovery;

pub use recovery::{FieldRecovery, ItemPattern, ListRecovery};

use crate::error::{EnrichError, EnrichResult};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// One way of locating JSON in a response.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// A fenced block tagged `json`.
    TaggedFence,
    /// Any fenced block whose content opens with `{` or `[`.
    AnyFence,
    /// The first single-line `{...}` span (greedy).
    FirstBraceSpan,
    /// Everything between the first `{` and the last `}`.
    OuterBraces,
    /// Field-by-field regex recovery.
    Fields(FieldRecovery),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::TaggedFence => "tagged_fence",
            Strategy::AnyFence => "any_fence",
            Strategy::FirstBraceSpan => "first_brace_span",
            Strategy::OuterBraces => "outer_braces",
            Strategy::Fields(_) => "field_recovery",
        }
    }

    /// Run this strategy alone.
    pub fn apply(&self, text: &str) -> Option<Value> {
        match self {
            Strategy::TaggedFence => tagged_fence(text),
            Strategy::AnyFence => any_fence(text),
            Strategy::FirstBraceSpan => first_brace_span(text),
            Strategy::OuterBraces => outer_braces(text),
            Strategy::Fields(recovery) => recovery.recover(text),
        }
    }
}

/// Successful extraction plus the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub value: Value,
    pub strategy: &'static str,
}

#[derive(Debug, Clone)]
pub struct ResponseExtractor {
    strategies: Vec<Strategy>,
}

impl ResponseExtractor {
    /// The four structural strategies, without field recovery.
    pub fn structural() -> Self {
        Self {
            strategies: vec![
                Strategy::TaggedFence,
                Strategy::AnyFence,
                Strategy::FirstBraceSpan,
                Strategy::OuterBraces,
            ],
        }
    }

    /// The full chain ending in field recovery.
    pub fn with_recovery(recovery: FieldRecovery) -> Self {
        let mut extractor = Self::structural();
        extractor.strategies.push(Strategy::Fields(recovery));
        extractor
    }

    /// First strategy to succeed wins; all failing is a `ParseFailure`.
    pub fn extract(&self, text: &str) -> EnrichResult<Extraction> {
        if text.trim().is_empty() {
            return Err(EnrichError::parse("empty response"));
        }
        for strategy in &self.strategies {
            if let Some(value) = strategy.apply(text) {
                tracing::debug!(strategy = strategy.name(), "extracted structured response");
                return Ok(Extraction {
                    value,
                    strategy: strategy.name(),
                });
            }
        }
        let names = self
            .strategies
            .iter()
            .map(Strategy::name)
            .collect::<Vec<_>>()
            .join(", ");
        Err(EnrichError::parse(format!(
            "no strategy matched ({names}); response starts with: {}",
            preview(text, 200)
        )))
    }
}

fn tagged_fence(text: &str) -> Option<Value> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)```[ \t]*json[ \t]*\r?\n(.*?)```").expect("tagged fence regex")
    });
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| parse_candidate(body.as_str()))
}

fn any_fence(text: &str) -> Option<Value> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("fence regex"));
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
        .filter(|body| body.starts_with('{') || body.starts_with('['))
        .find_map(parse_candidate)
}

fn first_brace_span(text: &str) -> Option<Value> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\{.*\}").expect("brace span regex"));
    re.find(text).and_then(|m| parse_candidate(m.as_str()))
}

fn outer_braces(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_candidate(&text[start..=end])
}

/// Parse a candidate as-is, then again after fixing common model slips.
///
/// Only objects and arrays count as structured data.
pub(crate) fn parse_candidate(candidate: &str) -> Option<Value> {
    let candidate = candidate.trim().trim_start_matches('\u{feff}');
    if candidate.is_empty() {
        return None;
    }
    let parsed = serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&fix_common_slips(candidate)).ok())?;
    match parsed {
        Value::Object(_) | Value::Array(_) => Some(parsed),
        _ => None,
    }
}

/// Repair trailing commas and typographic quotes.
fn fix_common_slips(json: &str) -> String {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let trailing =
        TRAILING_COMMA.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"));
    let quotes_fixed = json
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    trailing.replace_all(&quotes_fixed, "$1").into_owned()
}

/// Truncate at a char boundary for log and error previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
