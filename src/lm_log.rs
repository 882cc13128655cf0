//! LM attempt logging.
//!
//! One entry per LLM attempt is appended to `logs/lm_log.jsonl`:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"record_id":"onix-2024","kind":"editorial","attempt":1,"duration_ms":4200,"outcome":"rejected",...}
//! ```
//!
//! In verbose mode the full prompt and raw response are also stored under
//! `logs/lm_log/<record>_<kind>_aNN_{prompt,response}.txt`.

use crate::extract::preview;
use crate::record::{EnrichmentPhase, RecordId};
use crate::store::WorkspacePaths;
use crate::util::{append_jsonl, now_epoch_ms};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::time::Instant;

pub const LM_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_CHARS: usize = 500;

/// What an LM call was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmInvocationKind {
    Editorial,
    Technical,
    Repair,
}

impl LmInvocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Editorial => "editorial",
            Self::Technical => "technical",
            Self::Repair => "repair",
        }
    }
}

impl From<EnrichmentPhase> for LmInvocationKind {
    fn from(phase: EnrichmentPhase) -> Self {
        match phase {
            EnrichmentPhase::Editorial => Self::Editorial,
            EnrichmentPhase::Technical => Self::Technical,
        }
    }
}

impl std::fmt::Display for LmInvocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOutcome {
    /// Parsed and validated.
    Accepted,
    /// The response could not be parsed or failed validation.
    Rejected,
    /// The call itself failed.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,
    /// Epoch milliseconds when the entry was finished.
    pub ts: u64,
    pub record_id: RecordId,
    pub kind: LmInvocationKind,
    /// 1-based.
    pub attempt: u32,
    pub duration_ms: u64,
    pub outcome: LmOutcome,
    /// Extraction strategy that produced the payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt_preview: Option<String>,
}

/// Times one attempt and produces its entry.
pub struct LmLogBuilder {
    start: Instant,
    record_id: RecordId,
    kind: LmInvocationKind,
    attempt: u32,
    prompt_preview: Option<String>,
}

impl LmLogBuilder {
    pub fn new(record_id: RecordId, kind: LmInvocationKind, attempt: u32) -> Self {
        Self {
            start: Instant::now(),
            record_id,
            kind,
            attempt,
            prompt_preview: None,
        }
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        self.prompt_preview = Some(preview(prompt, PROMPT_PREVIEW_CHARS));
        self
    }

    pub fn accepted(self, strategy: &str, warnings: Vec<String>) -> LmLogEntry {
        let mut entry = self.build(LmOutcome::Accepted, None);
        entry.strategy = Some(strategy.to_string());
        entry.warnings = warnings;
        entry
    }

    pub fn rejected(self, error: impl Into<String>) -> LmLogEntry {
        self.build(LmOutcome::Rejected, Some(error.into()))
    }

    pub fn failed(self, error: impl Into<String>) -> LmLogEntry {
        self.build(LmOutcome::Failed, Some(error.into()))
    }

    fn build(self, outcome: LmOutcome, error: Option<String>) -> LmLogEntry {
        LmLogEntry {
            schema_version: LM_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            record_id: self.record_id,
            kind: self.kind,
            attempt: self.attempt,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            strategy: None,
            warnings: Vec::new(),
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

pub fn append_lm_log(paths: &WorkspacePaths, entry: &LmLogEntry) -> Result<()> {
    append_jsonl(&paths.lm_log_path(), entry).context("append lm_log entry")
}

/// Store the full prompt and raw response of one attempt.
pub fn store_lm_content(
    paths: &WorkspacePaths,
    entry: &LmLogEntry,
    prompt: &str,
    response: &str,
) -> Result<()> {
    let log_dir = paths.lm_log_dir();
    fs::create_dir_all(&log_dir).context("create lm_log directory")?;

    let stem = format!("{}_{}_a{:02}", entry.record_id, entry.kind, entry.attempt);
    let prompt_path = log_dir.join(format!("{stem}_prompt.txt"));
    let response_path = log_dir.join(format!("{stem}_response.txt"));
    fs::write(&prompt_path, prompt)
        .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
    fs::write(&response_path, response)
        .with_context(|| format!("write response: {}", response_path.display()))?;
    Ok(())
}

/// Every entry in the log; corrupt lines are skipped with a warning.
pub fn load_lm_log(paths: &WorkspacePaths) -> Result<Vec<LmLogEntry>> {
    let log_path = paths.lm_log_path();
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let file =
        File::open(&log_path).with_context(|| format!("open lm_log: {}", log_path.display()))?;

    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of lm_log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LmLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt lm_log entry");
            }
        }
    }
    Ok(entries)
}
