//! Per-record mutual exclusion within one process.

use crate::error::{EnrichError, EnrichResult};
use crate::record::RecordId;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct RecordLocks {
    busy: Mutex<HashSet<RecordId>>,
}

impl RecordLocks {
    /// Claim `id` without waiting; a held claim is `RecordBusy`.
    pub fn try_acquire(&self, id: &RecordId) -> EnrichResult<RecordGuard<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(id.clone()) {
            return Err(EnrichError::RecordBusy(id.clone()));
        }
        Ok(RecordGuard {
            locks: self,
            id: id.clone(),
        })
    }

    pub fn is_held(&self, id: &RecordId) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

/// Releases the claim on drop.
#[derive(Debug)]
pub struct RecordGuard<'a> {
    locks: &'a RecordLocks,
    id: RecordId,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.locks
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
