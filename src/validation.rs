//! Phase contracts checked after every successful parse.
//!
//! Rules collect every violation before deciding, so a rejected attempt
//! carries the full diagnostic list into the next prompt. Text bounds have
//! two bands: the strict band always passes, the tolerant band passes with a
//! warning on early attempts, and anything else is rejected.

mod editorial;
mod technical;

pub use editorial::{EditorialBounds, EditorialRules};
pub use technical::{TechnicalBounds, TechnicalRules};

use crate::error::{EnrichError, EnrichResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Band {
    pub min: usize,
    pub max: usize,
}

impl Band {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: usize) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether `self` lies entirely inside `outer`.
    pub fn within(&self, outer: &Band) -> bool {
        self.min >= outer.min && self.max <= outer.max
    }

    pub fn midpoint(&self) -> usize {
        self.min + (self.max - self.min) / 2
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Strict and tolerant bands for one text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextBounds {
    pub strict: Band,
    pub tolerant: Band,
}

impl TextBounds {
    pub const fn new(strict: Band, tolerant: Band) -> Self {
        Self { strict, tolerant }
    }
}

/// How a text field is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextUnit {
    Chars,
    Words,
}

impl TextUnit {
    pub fn measure(&self, text: &str) -> usize {
        match self {
            TextUnit::Chars => char_count(text),
            TextUnit::Words => word_count(text),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextUnit::Chars => "characters",
            TextUnit::Words => "words",
        }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn char_count(text: &str) -> usize {
    text.trim().chars().count()
}

/// One broken rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of checking one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(field, message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Accepted payloads yield their warnings; rejected ones a `ValidationFailure`.
    pub fn into_result(self) -> EnrichResult<Vec<String>> {
        if self.violations.is_empty() {
            Ok(self.warnings)
        } else {
            Err(EnrichError::ValidationFailure {
                violations: self.violations,
            })
        }
    }

    /// Check a text field against its bands on the given attempt.
    pub fn check_text(
        &mut self,
        field: &str,
        text: &str,
        bounds: &TextBounds,
        unit: TextUnit,
        soft_accept: bool,
    ) {
        if text.trim().is_empty() {
            self.reject(field, "must be a non-empty string");
            return;
        }
        let measured = unit.measure(text);
        if bounds.strict.contains(measured) {
            return;
        }
        if soft_accept && bounds.tolerant.contains(measured) {
            self.warn(format!(
                "{field}: {measured} {} outside {} but inside tolerance {}",
                unit.label(),
                bounds.strict,
                bounds.tolerant
            ));
            return;
        }
        self.reject(
            field,
            format!(
                "has {measured} {}; expected {}",
                unit.label(),
                bounds.strict
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: TextBounds = TextBounds::new(Band::new(10, 20), Band::new(5, 30));

    #[test]
    fn strict_band_passes_without_warning() {
        let mut report = ValidationReport::default();
        report.check_text("f", "abcdefghijkl", &BOUNDS, TextUnit::Chars, false);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn tolerant_band_only_soft_accepts_when_allowed() {
        let mut early = ValidationReport::default();
        early.check_text("f", "abcdefg", &BOUNDS, TextUnit::Chars, true);
        assert!(early.is_valid());
        assert_eq!(early.warnings.len(), 1);

        let mut late = ValidationReport::default();
        late.check_text("f", "abcdefg", &BOUNDS, TextUnit::Chars, false);
        assert!(!late.is_valid());
        assert!(late.violations[0].message.contains("expected 10-20"));
    }

    #[test]
    fn outside_tolerance_always_rejects() {
        let mut report = ValidationReport::default();
        report.check_text("f", "abc", &BOUNDS, TextUnit::Chars, true);
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn blank_text_is_rejected_before_measuring() {
        let mut report = ValidationReport::default();
        report.check_text("f", "   ", &BOUNDS, TextUnit::Words, true);
        assert_eq!(
            report.violations,
            vec![Violation::new("f", "must be a non-empty string")]
        );
    }

    #[test]
    fn word_count_ignores_repeated_whitespace() {
        assert_eq!(word_count("  um  dois\ttrês\n quatro "), 4);
        assert_eq!(char_count("  ação  "), 4);
    }
}
