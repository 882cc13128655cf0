//! Structural repair of published base articles.
//!
//! Fields the renderer needs as objects or arrays sometimes arrive as plain
//! strings. Detection compares each field's runtime shape to the renderer
//! contract. Stringified JSON is decoded locally first; whatever is left goes
//! to the model with a known-good reference from the same category. There is
//! no deterministic fallback here: exhausting retries is an error, because
//! the content is already live.

mod detect;

pub use detect::{
    decode_locally, default_requirements, detect_issues, Shape, ShapeRequirement,
    StructuralIssue,
};

use crate::config::EnrichConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::extract::ResponseExtractor;
use crate::journal::Journal;
use crate::llm::{LlmClient, LlmSettings};
use crate::lm_log::{LmInvocationKind, LmLogBuilder, LmLogEntry};
use crate::orchestrator::RecordLocks;
use crate::prompt::PromptBuilder;
use crate::record::{ContentRecord, Phase, RecordId};
use crate::retry::{AttemptContext, RetryPolicy, Sleeper, ThreadSleeper};
use crate::store::RecordStore;
use crate::validation::Violation;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    NoFixNeeded,
    /// Issues found, nothing written.
    DryRun,
    RepairedLocally,
    Repaired,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub record_id: RecordId,
    pub status: RepairStatus,
    pub issues: Vec<StructuralIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repaired_fields: Vec<String>,
    /// LLM attempts spent; zero when no request was needed.
    pub attempts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RepairOptions {
    /// Known-good record to show the model; picked by category if unset.
    pub reference: Option<RecordId>,
    pub dry_run: bool,
}

pub struct StructuralRepairService {
    store: Arc<dyn RecordStore>,
    client: Arc<dyn LlmClient>,
    sleeper: Arc<dyn Sleeper>,
    llm: LlmSettings,
    retry: RetryPolicy,
    prompts: PromptBuilder,
    requirements: Vec<ShapeRequirement>,
    journal: Option<Journal>,
    locks: Arc<RecordLocks>,
}

impl StructuralRepairService {
    pub fn new(
        config: &EnrichConfig,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            store,
            client,
            sleeper: Arc::new(ThreadSleeper),
            llm: config.llm.clone(),
            retry: RetryPolicy::new(config.retry.clone()),
            prompts: PromptBuilder::new(config.editorial.clone(), config.technical.clone()),
            requirements: default_requirements(),
            journal: None,
            locks: Arc::new(RecordLocks::default()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Share per-record locks with an orchestrator in the same process.
    pub fn with_locks(mut self, locks: Arc<RecordLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Report structural issues without writing. A record with issues comes
    /// back as `DryRun`.
    pub fn inspect(&self, id: &RecordId) -> EnrichResult<RepairReport> {
        let record = self.store.load(id)?;
        ensure_published(&record)?;
        let issues = detect_issues(&record.base_article, &self.requirements);
        Ok(RepairReport {
            record_id: id.clone(),
            status: if issues.is_empty() {
                RepairStatus::NoFixNeeded
            } else {
                RepairStatus::DryRun
            },
            issues,
            repaired_fields: Vec::new(),
            attempts: 0,
        })
    }

    /// Fix misshaped `base_article` fields of a `completed` record.
    pub fn repair(&self, id: &RecordId, options: &RepairOptions) -> EnrichResult<RepairReport> {
        if options.dry_run {
            return self.inspect(id);
        }
        let _guard = self.locks.try_acquire(id)?;
        let mut record = self.store.load(id)?;
        ensure_published(&record)?;

        let issues = detect_issues(&record.base_article, &self.requirements);
        let mut report = RepairReport {
            record_id: id.clone(),
            status: RepairStatus::NoFixNeeded,
            issues: issues.clone(),
            repaired_fields: Vec::new(),
            attempts: 0,
        };
        if issues.is_empty() {
            tracing::info!(record_id = %id, "no structural issues");
            return Ok(report);
        }

        let mut article = record.base_article.clone();
        let mut pending = Vec::new();
        for issue in issues {
            let decoded = self
                .requirement(&issue.field)
                .zip(article.get(&issue.field))
                .and_then(|(requirement, value)| decode_locally(value, requirement));
            match decoded {
                Some(value) => {
                    tracing::debug!(record_id = %id, field = %issue.field, "decoded locally");
                    report.repaired_fields.push(issue.field.clone());
                    article.insert(issue.field, value);
                }
                None => pending.push(issue),
            }
        }

        report.status = if pending.is_empty() {
            RepairStatus::RepairedLocally
        } else {
            let reference = self.reference_for(&record, &pending, options.reference.as_ref())?;
            let current = field_subset(&article, &pending);
            let resolved = self.retry.run("repair", self.sleeper.as_ref(), |ctx| {
                self.attempt(&record, &article, &pending, &current, &reference, ctx)
            })?;
            report.attempts = resolved.attempts();
            for (field, value) in resolved.value {
                report.repaired_fields.push(field.clone());
                article.insert(field, value);
            }
            RepairStatus::Repaired
        };

        let remaining = detect_issues(&article, &self.requirements);
        if !remaining.is_empty() {
            return Err(EnrichError::RepairVerification {
                id: id.clone(),
                fields: remaining.into_iter().map(|issue| issue.field).collect(),
            });
        }

        let phase = record.phase;
        record.base_article = article;
        self.store.save_if_phase(&record, phase)?;
        report.repaired_fields.sort();
        tracing::info!(
            record_id = %id,
            make = %record.vehicle.make,
            model = %record.vehicle.model,
            year = record.vehicle.year,
            status = ?report.status,
            fields = %report.repaired_fields.join(","),
            "structural repair applied"
        );
        Ok(report)
    }

    fn requirement(&self, field: &str) -> Option<&ShapeRequirement> {
        self.requirements.iter().find(|req| req.field == field)
    }

    /// One model round: returns corrected values for every pending field.
    fn attempt(
        &self,
        record: &ContentRecord,
        article: &Map<String, Value>,
        pending: &[StructuralIssue],
        current: &Value,
        reference: &Value,
        ctx: &AttemptContext,
    ) -> EnrichResult<Vec<(String, Value)>> {
        let prompt = self.prompts.repair(record, pending, current, reference, ctx);
        let log = LmLogBuilder::new(record.id.clone(), LmInvocationKind::Repair, ctx.attempt)
            .with_prompt_preview(&prompt);
        let raw = match self.client.complete(&self.llm.request(prompt.clone())) {
            Ok(raw) => raw,
            Err(err) => {
                let err = EnrichError::from(err);
                self.log_attempt(&log.failed(err.to_string()), &prompt, None);
                return Err(err);
            }
        };

        let checked = ResponseExtractor::structural()
            .extract(&raw)
            .and_then(|extraction| {
                let fixes = corrected_fields(extraction.value, article, pending, &self.requirements)?;
                Ok((fixes, extraction.strategy))
            });
        match checked {
            Ok((fixes, strategy)) => {
                self.log_attempt(&log.accepted(strategy, Vec::new()), &prompt, Some(&raw));
                Ok(fixes)
            }
            Err(err) => {
                self.log_attempt(&log.rejected(err.to_string()), &prompt, Some(&raw));
                Err(err)
            }
        }
    }

    fn log_attempt(&self, entry: &LmLogEntry, prompt: &str, response: Option<&str>) {
        if let Some(journal) = &self.journal {
            journal.attempt(entry, prompt, response);
        }
    }

    /// Reference payload holding well-shaped values for the pending fields.
    fn reference_for(
        &self,
        record: &ContentRecord,
        pending: &[StructuralIssue],
        explicit: Option<&RecordId>,
    ) -> EnrichResult<Value> {
        if let Some(reference_id) = explicit {
            let reference = self.store.load(reference_id)?;
            if !self.is_good_reference(&reference, pending) {
                return Err(EnrichError::config(format!(
                    "reference record {reference_id} lacks well-shaped values for the fields under repair"
                )));
            }
            return Ok(field_subset(&reference.base_article, pending));
        }

        self.store
            .load_all()?
            .into_iter()
            .filter(|candidate| {
                candidate.id != record.id
                    && candidate.vehicle.category == record.vehicle.category
                    && candidate.phase == Phase::Completed
            })
            .find(|candidate| self.is_good_reference(candidate, pending))
            .map(|reference| {
                tracing::debug!(record_id = %record.id, reference = %reference.id, "repair reference");
                field_subset(&reference.base_article, pending)
            })
            .ok_or_else(|| EnrichError::NoReference(record.vehicle.category.to_string()))
    }

    fn is_good_reference(&self, candidate: &ContentRecord, pending: &[StructuralIssue]) -> bool {
        pending.iter().all(|issue| {
            match (
                self.requirement(&issue.field),
                candidate.base_article.get(&issue.field),
            ) {
                (Some(requirement), Some(value)) => requirement.check(value).is_none(),
                _ => false,
            }
        })
    }
}

/// Repair only touches content that finished both phases.
fn ensure_published(record: &ContentRecord) -> EnrichResult<()> {
    if record.phase == Phase::Completed {
        Ok(())
    } else {
        Err(EnrichError::IneligibleState {
            id: record.id.clone(),
            phase: record.phase,
        })
    }
}

fn field_subset(article: &Map<String, Value>, issues: &[StructuralIssue]) -> Value {
    let subset: Map<String, Value> = issues
        .iter()
        .filter_map(|issue| {
            article
                .get(&issue.field)
                .map(|value| (issue.field.clone(), value.clone()))
        })
        .collect();
    Value::Object(subset)
}

/// Pull each pending field out of the model's answer and check its shape.
fn corrected_fields(
    answer: Value,
    article: &Map<String, Value>,
    pending: &[StructuralIssue],
    requirements: &[ShapeRequirement],
) -> EnrichResult<Vec<(String, Value)>> {
    let Value::Object(mut answer) = answer else {
        return Err(EnrichError::parse("repair answer must be a JSON object"));
    };
    let mut fixes = Vec::new();
    let mut violations = Vec::new();
    for issue in pending {
        let Some(value) = answer.remove(&issue.field) else {
            violations.push(Violation::new(&issue.field, "missing from the answer"));
            continue;
        };
        let mut candidate = article.clone();
        candidate.insert(issue.field.clone(), value.clone());
        match detect_issues(&candidate, requirements)
            .into_iter()
            .find(|remaining| remaining.field == issue.field)
        {
            Some(remaining) => violations.push(Violation::new(&issue.field, remaining.to_string())),
            None if value.is_null() => {
                violations.push(Violation::new(&issue.field, "answered with null"));
            }
            None => fixes.push((issue.field.clone(), value)),
        }
    }
    if violations.is_empty() {
        Ok(fixes)
    } else {
        Err(EnrichError::ValidationFailure { violations })
    }
}
