use super::{Field, FieldValue, Query, RecordStore};
use crate::models::CaseRecord;
use anyhow::{anyhow, Result};
use std::sync::{Arc, RwLock};

/// In-memory table. Readers clone the current `Arc` snapshot and filter it
/// outside the lock; `replace_all` swaps the snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: RwLock<Arc<Vec<CaseRecord>>>,
}

impl MemoryStore {
    pub fn new(records: Vec<CaseRecord>) -> Self {
        Self { snapshot: RwLock::new(Arc::new(records)) }
    }

    fn snapshot(&self) -> Result<Arc<Vec<CaseRecord>>> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl RecordStore for MemoryStore {
    fn fetch(&self, query: &Query) -> Result<Vec<CaseRecord>> {
        let snapshot = self.snapshot()?;
        let mut out: Vec<CaseRecord> = snapshot.iter().filter(|r| query.matches(r)).cloned().collect();
        out.sort_by_key(|r| r.event_id);
        Ok(out)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.iter().filter(|r| query.matches(r)).count() as u64)
    }

    fn max_value(&self, field: Field) -> Result<Option<FieldValue>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.iter().filter_map(|r| field.value_of(r)).max())
    }

    fn replace_all(&self, records: &[CaseRecord]) -> Result<usize> {
        let fresh = Arc::new(records.to_vec());
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        *guard = fresh;
        Ok(records.len())
    }
}
