//! Editorial phase contract.

use super::{Band, TextBounds, TextUnit, ValidationReport};
use crate::payload::EditorialPayload;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Editorial bounds; defaults follow the published content guidelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditorialBounds {
    /// Measured in characters.
    pub short_summary: TextBounds,
    /// Measured in words.
    pub introduction: TextBounds,
    /// Measured in words.
    pub closing: TextBounds,
    pub faq_count: Band,
    pub faq_answer_words: Band,
    /// Last attempt on which the tolerant band is accepted.
    pub soft_accept_through_attempt: u32,
}

impl Default for EditorialBounds {
    fn default() -> Self {
        Self {
            short_summary: TextBounds::new(Band::new(120, 320), Band::new(100, 400)),
            introduction: TextBounds::new(Band::new(120, 300), Band::new(80, 400)),
            closing: TextBounds::new(Band::new(80, 200), Band::new(60, 250)),
            faq_count: Band::new(3, 6),
            faq_answer_words: Band::new(15, 80),
            soft_accept_through_attempt: 2,
        }
    }
}

/// Matches pressure figures such as "32 PSI", "2,2 bar", "35 libras".
fn pressure_figure() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b\d{1,3}(?:[.,]\d+)?\s*(?:psi|lbs?|libras|bar|kpa)\b")
            .expect("pressure regex")
    })
}

/// Whether the text quotes a numeric tire pressure.
pub fn contains_pressure_figure(text: &str) -> bool {
    pressure_figure().is_match(text)
}

#[derive(Debug, Clone)]
pub struct EditorialRules {
    bounds: EditorialBounds,
}

impl EditorialRules {
    pub fn new(bounds: EditorialBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &EditorialBounds {
        &self.bounds
    }

    /// Check every field; `attempt` is 1-based.
    pub fn validate(&self, payload: &EditorialPayload, attempt: u32) -> ValidationReport {
        let bounds = &self.bounds;
        let soft_accept = attempt <= bounds.soft_accept_through_attempt;
        let mut report = ValidationReport::default();

        report.check_text(
            "resumo_curto",
            &payload.short_summary,
            &bounds.short_summary,
            TextUnit::Chars,
            soft_accept,
        );
        if contains_pressure_figure(&payload.short_summary) {
            report.reject(
                "resumo_curto",
                "must not quote numeric pressure values (e.g. \"32 PSI\")",
            );
        }

        report.check_text(
            "introducao",
            &payload.introduction,
            &bounds.introduction,
            TextUnit::Words,
            soft_accept,
        );
        report.check_text(
            "consideracoes_finais",
            &payload.closing,
            &bounds.closing,
            TextUnit::Words,
            soft_accept,
        );

        let count = payload.faq.len();
        if !bounds.faq_count.contains(count) {
            report.reject(
                "perguntas_frequentes",
                format!("has {count} entries; expected {}", bounds.faq_count),
            );
        }
        for (idx, entry) in payload.faq.iter().enumerate() {
            let field = format!("perguntas_frequentes[{idx}]");
            if entry.question.trim().is_empty() {
                report.reject(format!("{field}.pergunta"), "must be non-empty");
            }
            if entry.answer.trim().is_empty() {
                report.reject(format!("{field}.resposta"), "must be non-empty");
                continue;
            }
            let words = super::word_count(&entry.answer);
            if !bounds.faq_answer_words.contains(words) {
                report.reject(
                    format!("{field}.resposta"),
                    format!(
                        "has {words} words; expected {}",
                        bounds.faq_answer_words
                    ),
                );
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FaqEntry;

    fn words(n: usize) -> String {
        vec!["palavra"; n].join(" ")
    }

    fn chars(n: usize) -> String {
        "a".repeat(n)
    }

    fn valid_payload() -> EditorialPayload {
        EditorialPayload {
            short_summary: chars(200),
            introduction: words(150),
            closing: words(100),
            faq: (0..4)
                .map(|i| FaqEntry {
                    question: format!("Pergunta {i}?"),
                    answer: words(30),
                })
                .collect(),
        }
    }

    #[test]
    fn valid_payload_passes_on_every_attempt() {
        let rules = EditorialRules::new(EditorialBounds::default());
        for attempt in 1..=3 {
            let report = rules.validate(&valid_payload(), attempt);
            assert!(report.is_valid(), "{:?}", report.violations);
            assert!(report.warnings.is_empty());
        }
    }

    #[test]
    fn summary_with_pressure_is_rejected_regardless_of_length() {
        let rules = EditorialRules::new(EditorialBounds::default());
        let mut payload = valid_payload();
        payload.short_summary = format!(
            "Calibre os pneus do Onix com 32 PSI na dianteira e confira {}",
            chars(120)
        );
        let report = rules.validate(&payload, 1);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].field, "resumo_curto");
        assert!(report.violations[0].message.contains("numeric pressure"));
    }

    #[test]
    fn pressure_detection_covers_common_units() {
        assert!(contains_pressure_figure("use 2,2 bar"));
        assert!(contains_pressure_figure("cerca de 35 libras"));
        assert!(contains_pressure_figure("32psi"));
        assert!(!contains_pressure_figure("modelo 2024 com motor 1.0"));
    }

    #[test]
    fn tolerant_introduction_is_soft_accepted_only_early() {
        let rules = EditorialRules::new(EditorialBounds::default());
        let mut payload = valid_payload();
        payload.introduction = words(90);

        let early = rules.validate(&payload, 2);
        assert!(early.is_valid());
        assert_eq!(early.warnings.len(), 1);

        let late = rules.validate(&payload, 3);
        assert!(!late.is_valid());
        assert_eq!(late.violations[0].field, "introducao");
    }

    #[test]
    fn collects_every_violation() {
        let rules = EditorialRules::new(EditorialBounds::default());
        let payload = EditorialPayload {
            short_summary: String::new(),
            introduction: words(10),
            closing: words(500),
            faq: vec![FaqEntry {
                question: String::new(),
                answer: words(5),
            }],
        };
        let report = rules.validate(&payload, 1);
        let fields: Vec<&str> = report.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "resumo_curto",
                "introducao",
                "consideracoes_finais",
                "perguntas_frequentes",
                "perguntas_frequentes[0].pergunta",
                "perguntas_frequentes[0].resposta",
            ]
        );
    }
}
