//! Typed paths into a workspace layout.
//!
//! ```text
//! <root>/config.json
//! <root>/records/<id>.json
//! <root>/history.jsonl
//! <root>/logs/lm_log.jsonl
//! <root>/logs/lm_log/<id>_<kind>_aNN_{prompt,response}.txt
//! ```

use crate::record::RecordId;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    /// Callers must check the id with [`is_safe_record_id`] first.
    pub fn record_path(&self, id: &RecordId) -> PathBuf {
        self.records_dir().join(format!("{}.json", id.as_str()))
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn lm_log_path(&self) -> PathBuf {
        self.logs_dir().join("lm_log.jsonl")
    }

    /// Full prompt/response capture, written only in verbose mode.
    pub fn lm_log_dir(&self) -> PathBuf {
        self.logs_dir().join("lm_log")
    }
}

/// Ids become file names: no separators, no dot-only names.
pub fn is_safe_record_id(id: &RecordId) -> bool {
    let id = id.as_str();
    !id.is_empty()
        && !id.chars().all(|c| c == '.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
