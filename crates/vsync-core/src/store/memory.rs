use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::change::{ChangeKind, ChangeRecord};
use crate::error::Result;
use crate::resource::{Handle, Resource};
use crate::{read, write};

use super::ResourceStore;

/// A process-local store keyed by handle
#[derive(Debug)]
pub struct MemoryStore<T> {
    entries: RwLock<BTreeMap<Handle, T>>,
    batches_applied: AtomicUsize,
}

impl<T: Resource> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            batches_applied: AtomicUsize::new(0),
        }
    }

    /// Seed the store with existing entities
    pub fn with_entries(entities: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        {
            let mut entries = write(&store.entries);
            for entity in entities {
                entries.insert(entity.handle(), entity);
            }
        }
        store
    }

    pub fn get(&self, handle: Handle) -> Option<T> {
        read(&self.entries).get(&handle).cloned()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        read(&self.entries).contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    pub fn handles(&self) -> Vec<Handle> {
        read(&self.entries).keys().copied().collect()
    }

    /// Number of `apply_batch` calls so far
    pub fn batches_applied(&self) -> usize {
        self.batches_applied.load(Ordering::SeqCst)
    }
}

impl<T: Resource> ResourceStore<T> for MemoryStore<T> {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<T>> {
        Ok(read(&self.entries).values().cloned().collect())
    }

    fn apply_batch(&self, batch: &[ChangeRecord<T>]) -> Result<()> {
        let mut entries = write(&self.entries);
        for record in batch {
            match record.kind() {
                ChangeKind::Set => {
                    entries.insert(record.handle(), record.payload().clone());
                }
                ChangeKind::Remove => {
                    entries.remove(&record.handle());
                }
            }
        }
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
