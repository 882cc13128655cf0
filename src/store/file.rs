//! One pretty-printed JSON file per record under `records/`.

use super::{is_safe_record_id, RecordStore, WorkspacePaths};
use crate::error::{EnrichError, EnrichResult};
use crate::record::{ContentRecord, Phase, RecordId};
use crate::util::{read_json, write_json_atomic};
use anyhow::{anyhow, Context};
use std::fs;
use std::sync::{Mutex, PoisonError};

/// File-backed store.
///
/// Compare-and-set is serialized by an in-process mutex; workers in other
/// processes are not coordinated.
#[derive(Debug)]
pub struct FileRecordStore {
    paths: WorkspacePaths,
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new(paths: WorkspacePaths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    fn checked_path(&self, id: &RecordId) -> EnrichResult<std::path::PathBuf> {
        if !is_safe_record_id(id) {
            return Err(anyhow!("invalid record id {:?}", id.as_str()).into());
        }
        Ok(self.paths.record_path(id))
    }
}

impl RecordStore for FileRecordStore {
    fn load(&self, id: &RecordId) -> EnrichResult<ContentRecord> {
        let path = self.checked_path(id)?;
        if !path.is_file() {
            return Err(EnrichError::NotFound(id.clone()));
        }
        let record: ContentRecord = read_json(&path)?;
        if &record.id != id {
            return Err(anyhow!(
                "{} holds record {:?}, expected {:?}",
                path.display(),
                record.id.as_str(),
                id.as_str()
            )
            .into());
        }
        Ok(record)
    }

    fn list_ids(&self) -> EnrichResult<Vec<RecordId>> {
        let dir = self.paths.records_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry.context("read records entry")?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(RecordId::new(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn insert(&self, record: &ContentRecord) -> EnrichResult<()> {
        let path = self.checked_path(&record.id)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if path.exists() {
            return Err(anyhow!("record {} already exists", record.id).into());
        }
        write_json_atomic(&path, record)?;
        Ok(())
    }

    fn save_if_phase(&self, record: &ContentRecord, expected: Phase) -> EnrichResult<()> {
        let path = self.checked_path(&record.id)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self.load(&record.id)?;
        if stored.phase != expected {
            return Err(EnrichError::ConcurrentModification {
                id: record.id.clone(),
                expected,
                found: stored.phase,
            });
        }
        write_json_atomic(&path, record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{VehicleCategory, VehicleIdentity};
    use serde_json::Map;

    fn record(id: &str) -> ContentRecord {
        ContentRecord::new(
            RecordId::new(id),
            VehicleIdentity {
                make: "Fiat".to_string(),
                model: "Strada".to_string(),
                year: 2024,
                category: VehicleCategory::Pickup,
            },
            Map::new(),
        )
    }

    #[test]
    fn insert_load_and_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(WorkspacePaths::new(dir.path().to_path_buf()));
        store.insert(&record("b")).unwrap();
        store.insert(&record("a")).unwrap();
        assert!(store.insert(&record("a")).is_err());
        assert_eq!(
            store.list_ids().unwrap(),
            vec![RecordId::new("a"), RecordId::new("b")]
        );
        assert_eq!(store.load(&RecordId::new("a")).unwrap(), record("a"));
        assert!(matches!(
            store.load(&RecordId::new("zzz")),
            Err(EnrichError::NotFound(_))
        ));
    }

    #[test]
    fn save_is_compare_and_set_on_phase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(WorkspacePaths::new(dir.path().to_path_buf()));
        let mut rec = record("strada");
        store.insert(&rec).unwrap();

        rec.phase = Phase::EditorialProcessing;
        store.save_if_phase(&rec, Phase::BaseGenerated).unwrap();

        let err = store.save_if_phase(&rec, Phase::BaseGenerated).unwrap_err();
        assert!(matches!(
            err,
            EnrichError::ConcurrentModification {
                found: Phase::EditorialProcessing,
                ..
            }
        ));
    }

    #[test]
    fn path_traversal_ids_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(WorkspacePaths::new(dir.path().to_path_buf()));
        assert!(matches!(
            store.load(&RecordId::new("../etc/passwd")),
            Err(EnrichError::Store(_))
        ));
    }
}
