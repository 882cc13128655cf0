//! Workspace status summary.

use crate::error::EnrichResult;
use crate::payload::PayloadSource;
use crate::record::{EnrichmentPhase, Phase, RecordId};
use crate::store::RecordStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseCount {
    pub phase: Phase,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub record_id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<EnrichmentPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_ms: Option<u64>,
}

/// A record left in a processing state, e.g. by a crashed worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingRecord {
    pub record_id: RecordId,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    /// Every phase in lifecycle order, zero counts included.
    pub phases: Vec<PhaseCount>,
    pub eligible: usize,
    pub fallback_payloads: usize,
    pub failed: Vec<FailedRecord>,
    pub processing: Vec<ProcessingRecord>,
}

pub fn build_status_summary(store: &dyn RecordStore) -> EnrichResult<StatusSummary> {
    let records = store.load_all()?;
    let phases = Phase::ALL
        .into_iter()
        .map(|phase| PhaseCount {
            phase,
            count: records.iter().filter(|r| r.phase == phase).count(),
        })
        .collect();
    let eligible = records
        .iter()
        .filter(|r| r.phase.next_enrichment().is_some())
        .count();
    let fallback_payloads = records
        .iter()
        .flat_map(|r| {
            [
                r.phase_outputs.editorial.as_ref().map(|o| o.meta.source),
                r.phase_outputs.technical.as_ref().map(|o| o.meta.source),
            ]
        })
        .filter(|source| *source == Some(PayloadSource::Fallback))
        .count();
    let failed = records
        .iter()
        .filter(|r| r.phase == Phase::Failed)
        .map(|r| FailedRecord {
            record_id: r.id.clone(),
            failed_phase: r.failed_phase,
            last_error: r.last_error.clone(),
            failed_at_ms: r.failed_at_ms,
        })
        .collect();
    let processing = records
        .iter()
        .filter(|r| r.phase.is_processing())
        .map(|r| ProcessingRecord {
            record_id: r.id.clone(),
            phase: r.phase,
            started_at_ms: r.processing_started_at_ms,
        })
        .collect();

    Ok(StatusSummary {
        total: records.len(),
        phases,
        eligible,
        fallback_payloads,
        failed,
        processing,
    })
}

pub fn print_status(workspace: &str, summary: &StatusSummary) {
    println!("workspace: {workspace}");
    println!("records: {}", summary.total);
    for entry in &summary.phases {
        println!("  {:<22} {}", entry.phase.as_str(), entry.count);
    }
    println!("fallback payloads: {}", summary.fallback_payloads);
    if !summary.failed.is_empty() {
        println!("failed:");
        for record in &summary.failed {
            let phase = record.failed_phase.map(|p| p.as_str()).unwrap_or("-");
            let error = record.last_error.as_deref().unwrap_or("(no error recorded)");
            println!("  - {} [{phase}]: {error}", record.record_id);
        }
    }
    if !summary.processing.is_empty() {
        println!("processing:");
        for record in &summary.processing {
            println!("  - {} ({})", record.record_id, record.phase);
        }
    }
    if summary.eligible > 0 {
        println!("next: aenrich batch --workspace {workspace}");
    } else if !summary.failed.is_empty() {
        println!("next: aenrich reset --workspace {workspace} --record <id>");
    }
}
