use std::sync::{Mutex, MutexGuard};

use crate::storage::intermediate::IntermediateStorage;

/// Completed results of one worker, awaiting collection by the orchestrator.
#[derive(Default)]
pub struct ResultManager {
    storages: Mutex<Vec<IntermediateStorage>>,
}

impl ResultManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IntermediateStorage>> {
        self.storages.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, storage: IntermediateStorage) {
        self.lock().push(storage);
    }

    pub fn pop_largest(&self) -> Option<IntermediateStorage> {
        let mut storages = self.lock();
        let idx = storages
            .iter()
            .enumerate()
            .max_by_key(|(i, s)| (s.source_location_count(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)?;
        Some(storages.swap_remove(idx))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
