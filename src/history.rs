//! Phase-transition history.
//!
//! Append-only, so the path every record took stays auditable after the
//! record itself has moved on.

use crate::payload::PayloadSource;
use crate::record::{EnrichmentPhase, Phase, RecordId};
use crate::store::WorkspacePaths;
use crate::util::{append_jsonl, now_epoch_ms};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

pub const HISTORY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub ts: u64,
    pub record_id: RecordId,
    pub from: Phase,
    pub to: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<EnrichmentPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PayloadSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn transition(record_id: &RecordId, from: Phase, to: Phase) -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            record_id: record_id.clone(),
            from,
            to,
            phase: None,
            source: None,
            attempts: None,
            error: None,
        }
    }

    pub fn with_phase(mut self, phase: EnrichmentPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_result(mut self, source: PayloadSource, attempts: u32) -> Self {
        self.source = Some(source);
        self.attempts = Some(attempts);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub fn append_history(paths: &WorkspacePaths, entry: &HistoryEntry) -> Result<()> {
    append_jsonl(&paths.history_path(), entry).context("append history entry")
}

pub fn load_history(paths: &WorkspacePaths) -> Result<Vec<HistoryEntry>> {
    let path = paths.history_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse history line {}", idx + 1))
        })
        .collect()
}
