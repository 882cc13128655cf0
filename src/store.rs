//! Persistence boundary for content records.
//!
//! The orchestrator reads then writes phase state, so every write is a
//! compare-and-set on `phase`: it only lands if the stored phase still
//! matches what the writer last saw.

mod file;
mod memory;
mod paths;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use paths::{is_safe_record_id, WorkspacePaths};

use crate::error::EnrichResult;
use crate::record::{ContentRecord, Phase, RecordId};

pub trait RecordStore: Send + Sync {
    fn load(&self, id: &RecordId) -> EnrichResult<ContentRecord>;

    /// Every stored id, sorted.
    fn list_ids(&self) -> EnrichResult<Vec<RecordId>>;

    /// Add a new record; fails if the id exists.
    fn insert(&self, record: &ContentRecord) -> EnrichResult<()>;

    /// Replace the record if its stored phase equals `expected`, otherwise
    /// fail with `ConcurrentModification`.
    fn save_if_phase(&self, record: &ContentRecord, expected: Phase) -> EnrichResult<()>;

    /// Every stored record, sorted by id.
    fn load_all(&self) -> EnrichResult<Vec<ContentRecord>> {
        self.list_ids()?.iter().map(|id| self.load(id)).collect()
    }
}
