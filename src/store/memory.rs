//! In-memory snapshot store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{PopulationSnapshot, SnapshotStore, StoreError};

/// Snapshot store keeping encoded records in memory.
///
/// Clones share the same records, so a caller can keep a handle after
/// giving one to a population.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<u32, String>>>,
}

impl MemoryStore {
    fn records(&self) -> MutexGuard<'_, BTreeMap<u32, String>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store raw record text for `generation` without validation.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, generation: u32, text: impl Into<String>) {
        self.records().insert(generation, text.into());
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&mut self, snapshot: &PopulationSnapshot) -> Result<(), StoreError> {
        let json = snapshot.encode()?;
        self.records().insert(snapshot.generation, json);
        Ok(())
    }

    fn generations(&self) -> Result<Vec<u32>, StoreError> {
        Ok(self.records().keys().copied().collect())
    }

    fn load(&self, generation: u32) -> Result<PopulationSnapshot, StoreError> {
        let records = self.records();
        let text = records
            .get(&generation)
            .ok_or(StoreError::Missing(generation))?;
        PopulationSnapshot::decode(text)
    }
}
