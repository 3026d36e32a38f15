//! Thread-safe pool of intermediate storages ordered by size.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use super::intermediate::IntermediateStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderError {
    NoStorageFound,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NoStorageFound => write!(f, "no storage found"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Storages are kept sorted by source location count, largest first.
/// Among storages of equal size the earliest inserted comes first.
#[derive(Default)]
pub struct StorageProvider {
    storages: Mutex<Vec<IntermediateStorage>>,
}

impl StorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IntermediateStorage>> {
        // A panic while holding the lock cannot leave the vector unsorted.
        self.storages.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, storage: IntermediateStorage) {
        let size = storage.source_location_count();
        let mut storages = self.lock();
        let at = storages.partition_point(|s| s.source_location_count() >= size);
        storages.insert(at, storage);
    }

    pub fn consume_largest(&self) -> Result<IntermediateStorage, ProviderError> {
        let mut storages = self.lock();
        if storages.is_empty() {
            return Err(ProviderError::NoStorageFound);
        }
        Ok(storages.remove(0))
    }

    pub fn consume_second_largest(&self) -> Result<IntermediateStorage, ProviderError> {
        let mut storages = self.lock();
        if storages.len() < 2 {
            return Err(ProviderError::NoStorageFound);
        }
        Ok(storages.remove(1))
    }

    /// Takes the two largest storages at once, or nothing.
    pub fn consume_two_largest(
        &self,
    ) -> Result<(IntermediateStorage, IntermediateStorage), ProviderError> {
        let mut storages = self.lock();
        if storages.len() < 2 {
            return Err(ProviderError::NoStorageFound);
        }
        let second = storages.remove(1);
        let first = storages.remove(0);
        Ok((first, second))
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot of the current sizes in provider order.
    pub fn sizes(&self) -> Vec<usize> {
        self.lock().iter().map(|s| s.source_location_count()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::intermediate::{LocationKind, NodeKind, Span, StorageFile};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn storage(label: &str, locations: usize) -> IntermediateStorage {
        let mut s = IntermediateStorage::new();
        let file = s.add_file(StorageFile {
            id: 0,
            path: PathBuf::from(format!("{label}.rs")),
            language: "rust".into(),
            modification_time: 0,
            content_hash: String::new(),
            indexed: true,
            complete: true,
        });
        let node = s.add_node(NodeKind::Function, label);
        for line in 0..locations {
            s.add_location(file, node, LocationKind::Reference, Span::point(line as u32 + 1, 1));
        }
        s
    }

    fn label(s: &IntermediateStorage) -> String {
        s.files()[0].path.to_string_lossy().trim_end_matches(".rs").to_string()
    }

    #[test]
    fn consumes_in_descending_size_order() {
        let provider = StorageProvider::new();
        provider.insert(storage("a", 5));
        provider.insert(storage("b", 9));
        provider.insert(storage("c", 2));

        let order: Vec<String> = (0..3)
            .map(|_| label(&provider.consume_largest().unwrap()))
            .collect();
        assert_eq!(order, ["b", "a", "c"]);
        assert_eq!(provider.consume_largest().unwrap_err(), ProviderError::NoStorageFound);
    }

    #[test]
    fn second_largest_requires_two_entries() {
        let provider = StorageProvider::new();
        assert_eq!(
            provider.consume_second_largest().unwrap_err(),
            ProviderError::NoStorageFound
        );
        provider.insert(storage("only", 3));
        assert!(provider.consume_second_largest().is_err());
        assert_eq!(provider.count(), 1);

        provider.insert(storage("big", 7));
        assert_eq!(label(&provider.consume_second_largest().unwrap()), "only");
        assert_eq!(label(&provider.consume_largest().unwrap()), "big");
    }

    #[test]
    fn equal_sizes_keep_insertion_order() {
        let provider = StorageProvider::new();
        provider.insert(storage("first", 4));
        provider.insert(storage("second", 4));
        let (a, b) = provider.consume_two_largest().unwrap();
        assert_eq!((label(&a), label(&b)), ("first".into(), "second".into()));
    }

    #[test]
    fn clear_empties_the_pool() {
        let provider = StorageProvider::new();
        provider.insert(storage("x", 1));
        provider.insert(storage("y", 1));
        provider.clear();
        assert!(provider.is_empty());
        assert_eq!(provider.count(), 0);
    }

    proptest! {
        #[test]
        fn sizes_stay_sorted_descending(sizes in proptest::collection::vec(0usize..20, 0..24)) {
            let provider = StorageProvider::new();
            for (i, size) in sizes.iter().enumerate() {
                provider.insert(storage(&format!("s{i}"), *size));
            }
            let snapshot = provider.sizes();
            prop_assert_eq!(snapshot.len(), sizes.len());
            prop_assert!(snapshot.windows(2).all(|w| w[0] >= w[1]));

            let mut expected = sizes.clone();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            let mut drained = Vec::new();
            while let Ok(s) = provider.consume_largest() {
                drained.push(s.source_location_count());
            }
            prop_assert_eq!(drained, expected);
        }
    }
}
