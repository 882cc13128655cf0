//! In-memory store for tests and embedding.

use super::RecordStore;
use crate::error::{EnrichError, EnrichResult};
use crate::record::{ContentRecord, Phase, RecordId};
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<RecordId, ContentRecord>>,
    writes: Mutex<u64>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ContentRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records();
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        store
    }

    /// Number of successful `insert`/`save_if_phase` calls.
    pub fn writes(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<RecordId, ContentRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_write(&self) {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, id: &RecordId) -> EnrichResult<ContentRecord> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| EnrichError::NotFound(id.clone()))
    }

    fn list_ids(&self) -> EnrichResult<Vec<RecordId>> {
        Ok(self.records().keys().cloned().collect())
    }

    fn insert(&self, record: &ContentRecord) -> EnrichResult<()> {
        let mut records = self.records();
        if records.contains_key(&record.id) {
            return Err(anyhow!("record {} already exists", record.id).into());
        }
        records.insert(record.id.clone(), record.clone());
        drop(records);
        self.count_write();
        Ok(())
    }

    fn save_if_phase(&self, record: &ContentRecord, expected: Phase) -> EnrichResult<()> {
        let mut records = self.records();
        let stored = records
            .get(&record.id)
            .ok_or_else(|| EnrichError::NotFound(record.id.clone()))?;
        if stored.phase != expected {
            return Err(EnrichError::ConcurrentModification {
                id: record.id.clone(),
                expected,
                found: stored.phase,
            });
        }
        records.insert(record.id.clone(), record.clone());
        drop(records);
        self.count_write();
        Ok(())
    }
}
