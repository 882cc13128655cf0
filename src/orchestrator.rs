//! Phase state machine driving records through enrichment.
//!
//! `advance` claims the record, moves it to the phase's processing state,
//! runs the retry loop (prompt, LLM, extract, decode, validate) with the
//! deterministic fallback behind it, persists the payload, re-reads and
//! re-validates what landed in the store, then moves to the completed state.

mod contract;
mod locks;

pub use contract::{PhaseContract, PhaseRules};
pub use locks::{RecordGuard, RecordLocks};

use crate::config::EnrichConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::extract::ResponseExtractor;
use crate::fallback::FallbackSynthesizer;
use crate::history::HistoryEntry;
use crate::journal::Journal;
use crate::llm::{LlmClient, LlmSettings};
use crate::lm_log::{LmLogBuilder, LmLogEntry};
use crate::payload::{
    EditorialPayload, PayloadMeta, PayloadSource, PhaseOutput, TechnicalPayload,
};
use crate::prompt::PromptBuilder;
use crate::record::{ContentRecord, EnrichmentPhase, Phase, RecordId};
use crate::retry::{AttemptContext, Resolution, RetryPolicy, Sleeper, ThreadSleeper};
use crate::store::RecordStore;
use crate::util::now_epoch_ms;
use crate::validation::{EditorialRules, TechnicalRules};
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Result of one successful `advance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceOutcome {
    pub record_id: RecordId,
    pub phase: EnrichmentPhase,
    pub state: Phase,
    pub source: PayloadSource,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Phases finished by `run_to_completion`, and the error that stopped it.
#[derive(Debug)]
pub struct CompletionRun {
    pub outcomes: Vec<AdvanceOutcome>,
    pub error: Option<EnrichError>,
}

impl CompletionRun {
    pub fn into_result(self) -> EnrichResult<Vec<AdvanceOutcome>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.outcomes),
        }
    }
}

pub struct EnrichmentOrchestrator {
    store: Arc<dyn RecordStore>,
    client: Arc<dyn LlmClient>,
    sleeper: Arc<dyn Sleeper>,
    llm: LlmSettings,
    retry: RetryPolicy,
    prompts: PromptBuilder,
    rules: PhaseRules,
    fallback: FallbackSynthesizer,
    journal: Option<Journal>,
    locks: Arc<RecordLocks>,
}

impl EnrichmentOrchestrator {
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
            rules: PhaseRules {
                editorial: EditorialRules::new(config.editorial.clone()),
                technical: TechnicalRules::new(config.technical.clone()),
            },
            fallback: FallbackSynthesizer::new(
                config.editorial.clone(),
                config.technical.clone(),
            ),
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

    /// Share per-record locks with a repair service in the same process.
    pub fn with_locks(mut self, locks: Arc<RecordLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> Arc<RecordLocks> {
        Arc::clone(&self.locks)
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run the next enrichment phase of `id`.
    ///
    /// Fails with `IneligibleState` unless the record sits in
    /// `base-generated` or `editorial-completed`. Attempt-level failures
    /// never surface here; a returned error means the record was either
    /// untouched (eligibility, lock, store) or moved to `failed`.
    pub fn advance(&self, id: &RecordId) -> EnrichResult<AdvanceOutcome> {
        let _guard = self.locks.try_acquire(id)?;
        let mut record = self.store.load(id)?;
        let from = record.phase;
        let phase = from
            .next_enrichment()
            .ok_or_else(|| EnrichError::IneligibleState {
                id: id.clone(),
                phase: from,
            })?;
        if record.phase_outputs.has(phase) {
            return Err(EnrichError::PayloadExists {
                id: id.clone(),
                phase,
            });
        }

        record.phase = phase.processing_state();
        record.processing_started_at_ms = Some(now_epoch_ms());
        record.attempt_count = 0;
        record.last_error = None;
        self.store.save_if_phase(&record, from)?;
        self.log_transition(
            &record,
            HistoryEntry::transition(id, from, record.phase).with_phase(phase),
            "started",
        );

        match phase {
            EnrichmentPhase::Editorial => self.complete_phase::<EditorialPayload>(record),
            EnrichmentPhase::Technical => self.complete_phase::<TechnicalPayload>(record),
        }
    }

    /// Advance until the record is `completed`.
    ///
    /// Stops at the first error. A record that is already `completed`
    /// yields an empty list.
    pub fn advance_to_completion(&self, id: &RecordId) -> EnrichResult<Vec<AdvanceOutcome>> {
        self.run_to_completion(id).into_result()
    }

    /// Like `advance_to_completion`, but keeps the phases that finished
    /// before an error.
    pub fn run_to_completion(&self, id: &RecordId) -> CompletionRun {
        let mut outcomes = Vec::new();
        let error = loop {
            let record = match self.store.load(id) {
                Ok(record) => record,
                Err(err) => break Some(err),
            };
            if record.phase == Phase::Completed {
                break None;
            }
            if record.phase.next_enrichment().is_none() {
                break Some(EnrichError::IneligibleState {
                    id: id.clone(),
                    phase: record.phase,
                });
            }
            match self.advance(id) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => break Some(err),
            }
        };
        CompletionRun { outcomes, error }
    }

    /// Move a failed record back to the last state whose payload is
    /// persisted. `force` also releases records stranded in a processing
    /// state.
    pub fn reset_failed(&self, id: &RecordId, force: bool) -> EnrichResult<Phase> {
        let _guard = self.locks.try_acquire(id)?;
        let mut record = self.store.load(id)?;
        let from = record.phase;
        if from != Phase::Failed && !(force && from.is_processing()) {
            return Err(EnrichError::IneligibleState {
                id: id.clone(),
                phase: from,
            });
        }
        let to = record.resume_state();
        record.phase = to;
        record.attempt_count = 0;
        record.last_error = None;
        record.failed_at_ms = None;
        record.failed_phase = None;
        record.processing_started_at_ms = None;
        self.store.save_if_phase(&record, from)?;
        self.log_transition(&record, HistoryEntry::transition(id, from, to), "reset");
        Ok(to)
    }

    fn complete_phase<P: PhaseContract>(
        &self,
        working: ContentRecord,
    ) -> EnrichResult<AdvanceOutcome> {
        let processing = working.phase;
        let mut spent = 0u32;
        let output = match self.run_phase::<P>(&working, &mut spent) {
            Ok(output) => output,
            Err(err) => return Err(self.fail(working, P::PHASE, spent, err)),
        };
        let attempts = output.meta.attempts;
        let source = output.meta.source;
        let warnings = output.meta.warnings.clone();

        // Stage the payload while still processing, so a bad read-back can
        // fail the record without leaving a completed state behind.
        let mut staged = working.clone();
        staged.attempt_count = attempts;
        P::set_output(&mut staged.phase_outputs, output.clone());
        if let Err(err) = self.store.save_if_phase(&staged, processing) {
            return Err(self.fail(working, P::PHASE, attempts, err));
        }
        if let Err(err) = self.verify_persisted(&staged.id, &output) {
            return Err(self.fail(working, P::PHASE, attempts, err));
        }

        let mut completed = staged.clone();
        completed.phase = P::PHASE.completed_state();
        completed.processing_started_at_ms = None;
        if let Err(err) = self.store.save_if_phase(&completed, processing) {
            // The verified payload stays, so a reset resumes past this phase.
            return Err(self.fail(staged, P::PHASE, attempts, err));
        }
        self.log_transition(
            &completed,
            HistoryEntry::transition(&completed.id, processing, completed.phase)
                .with_phase(P::PHASE)
                .with_result(source, attempts),
            match source {
                PayloadSource::Llm => "llm",
                PayloadSource::Fallback => "fallback",
            },
        );

        Ok(AdvanceOutcome {
            record_id: completed.id,
            phase: P::PHASE,
            state: completed.phase,
            source,
            attempts,
            warnings,
        })
    }

    fn run_phase<P: PhaseContract>(
        &self,
        record: &ContentRecord,
        spent: &mut u32,
    ) -> EnrichResult<PhaseOutput<P>> {
        let extractor = ResponseExtractor::with_recovery(P::recovery());
        let resolved = self.retry.run_with_fallback(
            P::PHASE.as_str(),
            self.sleeper.as_ref(),
            |ctx| {
                *spent += 1;
                self.attempt::<P>(record, &extractor, ctx)
            },
            |_| {
                P::fallback(&self.fallback, &record.vehicle).map(|payload| (payload, Vec::new()))
            },
        )?;

        let attempts = resolved.attempts();
        let (source, accepted_on_attempt) = match resolved.resolution {
            Resolution::Attempt(n) => (PayloadSource::Llm, Some(n)),
            Resolution::Fallback => (PayloadSource::Fallback, None),
        };
        let (content, warnings) = resolved.value;
        Ok(PhaseOutput {
            meta: PayloadMeta {
                source,
                attempts,
                accepted_on_attempt,
                warnings,
                generated_at_ms: now_epoch_ms(),
            },
            content,
        })
    }

    fn attempt<P: PhaseContract>(
        &self,
        record: &ContentRecord,
        extractor: &ResponseExtractor,
        ctx: &AttemptContext,
    ) -> EnrichResult<(P, Vec<String>)> {
        let prompt = P::prompt(&self.prompts, record, ctx);
        let log = LmLogBuilder::new(record.id.clone(), P::PHASE.into(), ctx.attempt)
            .with_prompt_preview(&prompt);

        let started = Instant::now();
        let raw = match self.client.complete(&self.llm.request(prompt.clone())) {
            Ok(raw) => raw,
            Err(err) => {
                let err = EnrichError::from(err);
                self.log_attempt(&log.failed(err.to_string()), &prompt, None);
                return Err(err);
            }
        };
        tracing::info!(
            record_id = %record.id,
            phase = %P::PHASE,
            attempt = ctx.attempt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = raw.len(),
            "lm invoke complete"
        );

        let checked = extractor.extract(&raw).and_then(|extraction| {
            let payload = P::decode(extraction.value)?;
            let warnings = P::validate(&self.rules, &payload, ctx.attempt).into_result()?;
            Ok((payload, warnings, extraction.strategy))
        });
        match checked {
            Ok((payload, warnings, strategy)) => {
                self.log_attempt(&log.accepted(strategy, warnings.clone()), &prompt, Some(&raw));
                Ok((payload, warnings))
            }
            Err(err) => {
                self.log_attempt(&log.rejected(err.to_string()), &prompt, Some(&raw));
                Err(err)
            }
        }
    }

    /// Re-read the stored record and check the payload that actually landed.
    fn verify_persisted<P: PhaseContract>(
        &self,
        id: &RecordId,
        written: &PhaseOutput<P>,
    ) -> EnrichResult<()> {
        let stored = self.store.load(id)?;
        let output = P::output(&stored.phase_outputs)
            .ok_or_else(|| anyhow!("{} payload missing after write", P::PHASE))?;
        let persisted = serde_json::to_value(output).context("serialize stored payload")?;
        let expected = serde_json::to_value(written).context("serialize written payload")?;
        if persisted != expected {
            return Err(anyhow!("stored {} payload differs from the one written", P::PHASE).into());
        }
        let attempt = output.meta.accepted_on_attempt.unwrap_or(u32::MAX);
        P::validate(&self.rules, &output.content, attempt).into_result()?;
        Ok(())
    }

    /// Move `record` to `failed` and hand back the error that caused it.
    fn fail(
        &self,
        mut record: ContentRecord,
        phase: EnrichmentPhase,
        attempts: u32,
        err: EnrichError,
    ) -> EnrichError {
        let from = record.phase;
        let message = err.to_string();
        record.phase = Phase::Failed;
        record.attempt_count = attempts;
        record.last_error = Some(message.clone());
        record.failed_at_ms = Some(now_epoch_ms());
        record.failed_phase = Some(phase);
        record.processing_started_at_ms = None;
        if let Err(save_err) = self.store.save_if_phase(&record, from) {
            tracing::error!(
                record_id = %record.id,
                error = %save_err,
                "could not mark record failed"
            );
            return err;
        }
        self.log_transition(
            &record,
            HistoryEntry::transition(&record.id, from, Phase::Failed)
                .with_phase(phase)
                .with_error(message),
            "failed",
        );
        err
    }

    fn log_transition(&self, record: &ContentRecord, entry: HistoryEntry, outcome: &str) {
        let vehicle = &record.vehicle;
        tracing::info!(
            record_id = %record.id,
            make = %vehicle.make,
            model = %vehicle.model,
            year = vehicle.year,
            phase = entry.phase.map(|p| p.as_str()).unwrap_or("-"),
            from = %entry.from,
            to = %entry.to,
            outcome,
            "phase transition"
        );
        if let Some(journal) = &self.journal {
            journal.transition(&entry);
        }
    }

    fn log_attempt(&self, entry: &LmLogEntry, prompt: &str, response: Option<&str>) {
        if let Some(journal) = &self.journal {
            journal.attempt(entry, prompt, response);
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
