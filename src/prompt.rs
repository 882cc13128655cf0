//! Phase prompt assembly.
//!
//! Templates live under `prompts/` and are filled with `{placeholder}`
//! substitution. Numeric limits come from the same bounds the validators
//! use, so the model is told exactly what will be checked. From the second
//! attempt on, a strictness preamble quotes the previous failure and the
//! advertised text targets narrow toward the band minimum.

pub mod vocabulary;

use crate::extract::preview;
use crate::record::ContentRecord;
use crate::repair::StructuralIssue;
use crate::retry::AttemptContext;
use crate::validation::{Band, EditorialBounds, TechnicalBounds};
use serde_json::Value;

const EDITORIAL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/editorial.md"));
const TECHNICAL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/technical.md"));
const STRICTNESS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/strictness.md"));
const REPAIR: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/repair.md"));

const MAX_CONTEXT_SECTIONS: usize = 8;
const SECTION_PREVIEW_CHARS: usize = 300;
const PREVIOUS_ERROR_CHARS: usize = 1500;

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    editorial: EditorialBounds,
    technical: TechnicalBounds,
}

impl PromptBuilder {
    pub fn new(editorial: EditorialBounds, technical: TechnicalBounds) -> Self {
        Self {
            editorial,
            technical,
        }
    }

    pub fn editorial(&self, record: &ContentRecord, ctx: &AttemptContext) -> String {
        let bounds = &self.editorial;
        let summary = narrow(bounds.short_summary.strict, ctx.attempt);
        let intro = narrow(bounds.introduction.strict, ctx.attempt);
        let closing = narrow(bounds.closing.strict, ctx.attempt);

        EDITORIAL
            .replace("{strictness}", &strictness(ctx))
            .replace("{vehicle_name}", &record.vehicle.display_name())
            .replace("{category}", record.vehicle.category.label())
            .replace("{base_context}", &base_context(record))
            .replace("{summary_min}", &summary.min.to_string())
            .replace("{summary_max}", &summary.max.to_string())
            .replace("{summary_target}", &summary.midpoint().to_string())
            .replace("{intro_min}", &intro.min.to_string())
            .replace("{intro_max}", &intro.max.to_string())
            .replace("{intro_target}", &intro.midpoint().to_string())
            .replace("{closing_min}", &closing.min.to_string())
            .replace("{closing_max}", &closing.max.to_string())
            .replace("{closing_target}", &closing.midpoint().to_string())
            .replace("{faq_min}", &bounds.faq_count.min.to_string())
            .replace("{faq_max}", &bounds.faq_count.max.to_string())
            .replace("{answer_min}", &bounds.faq_answer_words.min.to_string())
            .replace("{answer_max}", &bounds.faq_answer_words.max.to_string())
    }

    pub fn technical(&self, record: &ContentRecord, ctx: &AttemptContext) -> String {
        let bounds = &self.technical;
        let editorial_summary = record
            .phase_outputs
            .editorial
            .as_ref()
            .map(|output| output.content.short_summary.trim().to_string())
            .filter(|summary| !summary.is_empty())
            .unwrap_or_else(|| "(indisponível)".to_string());
        let forbidden = bounds
            .forbidden_terms
            .iter()
            .map(|term| format!("\"{term}\""))
            .collect::<Vec<_>>()
            .join(", ");

        TECHNICAL
            .replace("{strictness}", &strictness(ctx))
            .replace("{vehicle_name}", &record.vehicle.display_name())
            .replace("{category}", record.vehicle.category.label())
            .replace("{base_context}", &base_context(record))
            .replace("{editorial_summary}", &editorial_summary)
            .replace("{vocabulary}", &vocabulary::render(&record.vehicle))
            .replace("{variants_min}", &bounds.variant_count.min.to_string())
            .replace("{variants_max}", &bounds.variant_count.max.to_string())
            .replace("{name_min_chars}", &bounds.min_variant_name_chars.to_string())
            .replace("{forbidden_terms}", &forbidden)
            .replace("{psi_min}", &bounds.pressure_psi.min.to_string())
            .replace("{psi_max}", &bounds.pressure_psi.max.to_string())
    }

    /// One-shot shape correction prompt for the fields in `issues`.
    pub fn repair(
        &self,
        record: &ContentRecord,
        issues: &[StructuralIssue],
        current: &Value,
        reference: &Value,
        ctx: &AttemptContext,
    ) -> String {
        let issues = issues
            .iter()
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n");
        REPAIR
            .replace("{vehicle_name}", &record.vehicle.display_name())
            .replace("{category}", record.vehicle.category.label())
            .replace("{strictness}", &strictness(ctx))
            .replace("{issues}", &issues)
            .replace("{current}", &pretty(current))
            .replace("{reference}", &pretty(reference))
    }
}

/// Narrow a band toward its minimum: the width halves on every retry.
pub fn narrow(band: Band, attempt: u32) -> Band {
    if attempt <= 1 {
        return band;
    }
    let shift = (attempt - 1).min(usize::BITS - 1);
    let width = (band.max - band.min) >> shift;
    Band::new(band.min, band.min + width)
}

fn strictness(ctx: &AttemptContext) -> String {
    if !ctx.is_retry() {
        return String::new();
    }
    let previous = ctx
        .previous_error
        .as_deref()
        .map(|err| preview(err, PREVIOUS_ERROR_CHARS))
        .unwrap_or_else(|| "resposta inválida".to_string());
    STRICTNESS
        .replace("{attempt}", &ctx.attempt.to_string())
        .replace("{max_attempts}", &ctx.max_attempts.to_string())
        .replace("{previous_error}", &previous)
}

/// First sections of the base article, each truncated.
fn base_context(record: &ContentRecord) -> String {
    if record.base_article.is_empty() {
        return "(sem conteúdo base)".to_string();
    }
    record
        .base_article
        .iter()
        .take(MAX_CONTEXT_SECTIONS)
        .map(|(section, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            format!("## {section}\n{}", preview(&text, SECTION_PREVIEW_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
