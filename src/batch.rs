//! Batch driver over eligible records.
//!
//! Workers pull record ids from a shared queue and pause between records to
//! stay under upstream rate limits. Per-record serialization is still the
//! orchestrator's job; the queue only guarantees one worker sees each id.

use crate::error::EnrichResult;
use crate::orchestrator::{AdvanceOutcome, CompletionRun, EnrichmentOrchestrator};
use crate::record::RecordId;
use crate::retry::Sleeper;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// The `batch` section of the workspace config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSettings {
    pub inter_record_delay_ms: u64,
    pub jobs: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            inter_record_delay_ms: 2000,
            jobs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub limit: Option<usize>,
    pub delay: Duration,
    pub jobs: usize,
    pub to_completion: bool,
}

impl BatchOptions {
    pub fn from_settings(settings: &BatchSettings) -> Self {
        Self {
            limit: None,
            delay: Duration::from_millis(settings.inter_record_delay_ms),
            jobs: settings.jobs.max(1),
            to_completion: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub record_id: RecordId,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<AdvanceOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    /// Phase completions that used the deterministic fallback.
    pub fn fallbacks(&self) -> usize {
        self.items
            .iter()
            .flat_map(|item| &item.outcomes)
            .filter(|outcome| outcome.source == crate::payload::PayloadSource::Fallback)
            .count()
    }
}

/// Ids whose current state can start a phase, sorted.
pub fn eligible_ids(store: &dyn RecordStore) -> EnrichResult<Vec<RecordId>> {
    Ok(store
        .load_all()?
        .into_iter()
        .filter(|record| record.phase.next_enrichment().is_some())
        .map(|record| record.id)
        .collect())
}

pub fn run_batch(
    orchestrator: &EnrichmentOrchestrator,
    sleeper: &dyn Sleeper,
    options: &BatchOptions,
) -> EnrichResult<BatchReport> {
    let mut ids = eligible_ids(orchestrator.store().as_ref())?;
    if let Some(limit) = options.limit {
        ids.truncate(limit);
    }
    let total = ids.len();
    let jobs = options.jobs.clamp(1, total.max(1));
    tracing::info!(records = total, jobs, "batch start");

    let queue = Mutex::new(ids.into_iter().collect::<VecDeque<_>>());
    let items = Mutex::new(Vec::with_capacity(total));

    std::thread::scope(|scope| {
        for worker in 0..jobs {
            let queue = &queue;
            let items = &items;
            scope.spawn(move || {
                let mut first = true;
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(id) = next else { break };
                    if !first && !options.delay.is_zero() {
                        sleeper.sleep(options.delay);
                    }
                    first = false;
                    let item = process(orchestrator, &id, options.to_completion);
                    if let Some(error) = &item.error {
                        tracing::warn!(worker, record_id = %id, error = %error, "batch record failed");
                    }
                    items
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(item);
                }
            });
        }
    });

    let mut items = items.into_inner().unwrap_or_else(PoisonError::into_inner);
    items.sort_by(|a, b| a.record_id.cmp(&b.record_id));
    let report = BatchReport { items };
    tracing::info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        fallbacks = report.fallbacks(),
        "batch complete"
    );
    Ok(report)
}

fn process(orchestrator: &EnrichmentOrchestrator, id: &RecordId, to_completion: bool) -> BatchItem {
    let run = if to_completion {
        orchestrator.run_to_completion(id)
    } else {
        match orchestrator.advance(id) {
            Ok(outcome) => CompletionRun {
                outcomes: vec![outcome],
                error: None,
            },
            Err(err) => CompletionRun {
                outcomes: Vec::new(),
                error: Some(err),
            },
        }
    };
    BatchItem {
        record_id: id.clone(),
        outcomes: run.outcomes,
        error: run.error.map(|err| err.to_string()),
    }
}
