//! Workspace-side effects of a run: the LM attempt log and transition
//! history. Write failures are reported but never fail the run.

use crate::history::{append_history, HistoryEntry};
use crate::lm_log::{append_lm_log, store_lm_content, LmLogEntry};
use crate::store::WorkspacePaths;

#[derive(Debug, Clone)]
pub struct Journal {
    paths: WorkspacePaths,
    verbose: bool,
}

impl Journal {
    /// `verbose` also stores full prompts and responses.
    pub fn new(paths: WorkspacePaths, verbose: bool) -> Self {
        Self { paths, verbose }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn attempt(&self, entry: &LmLogEntry, prompt: &str, response: Option<&str>) {
        if let Err(err) = append_lm_log(&self.paths, entry) {
            tracing::warn!(error = %format!("{err:#}"), "lm_log write failed");
        }
        if self.verbose {
            if let Err(err) = store_lm_content(&self.paths, entry, prompt, response.unwrap_or(""))
            {
                tracing::warn!(error = %format!("{err:#}"), "lm_log content write failed");
            }
        }
    }

    pub fn transition(&self, entry: &HistoryEntry) {
        if let Err(err) = append_history(&self.paths, entry) {
            tracing::warn!(error = %format!("{err:#}"), "history write failed");
        }
    }
}
