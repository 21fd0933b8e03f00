//! [`RecordingStore`]: an in-memory store that keeps a transcript.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use vsync_core::{ChangeKind, ChangeRecord, Error, Handle, Resource, ResourceStore, Result};

/// How a [`RecordingStore`] operation misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    /// Return `Error::Store` without touching state
    Error,
    /// Panic inside the operation
    Panic,
}

/// A store that applies batches like a real backend and also records them.
///
/// # Example
///
/// ```rust
/// use vsync_core::{ChangeRecord, ResourceStore, VirtualRegistryKey};
/// use vsync_test_utils::RecordingStore;
///
/// let store = RecordingStore::<VirtualRegistryKey>::new();
/// store.apply_batch(&[ChangeRecord::set(VirtualRegistryKey::new(1, "HKCU"))]).unwrap();
/// assert_eq!(store.batches().len(), 1);
/// ```
pub struct RecordingStore<T> {
    entries: Mutex<BTreeMap<Handle, T>>,
    batches: Mutex<Vec<Vec<ChangeRecord<T>>>>,
    failure: Mutex<FailureMode>,
    read_failure: Mutex<FailureMode>,
    apply_delay: Mutex<Duration>,
    initialized: AtomicUsize,
    attempts: AtomicUsize,
}

impl<T: Resource> Default for RecordingStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> RecordingStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            batches: Mutex::new(Vec::new()),
            failure: Mutex::new(FailureMode::None),
            read_failure: Mutex::new(FailureMode::None),
            apply_delay: Mutex::new(Duration::ZERO),
            initialized: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Start with `entities` already persisted.
    pub fn seeded(entities: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap()
            .extend(entities.into_iter().map(|e| (e.handle(), e)));
        store
    }

    /// How `apply_batch` misbehaves from now on
    pub fn set_failure(&self, mode: FailureMode) {
        *self.failure.lock().unwrap() = mode;
    }

    /// How `read_all` misbehaves from now on
    pub fn set_read_failure(&self, mode: FailureMode) {
        *self.read_failure.lock().unwrap() = mode;
    }

    /// Sleep this long inside every `apply_batch`, to widen race windows.
    pub fn set_apply_delay(&self, delay: Duration) {
        *self.apply_delay.lock().unwrap() = delay;
    }

    /// Successfully applied batches, in application order
    pub fn batches(&self) -> Vec<Vec<ChangeRecord<T>>> {
        self.batches.lock().unwrap().clone()
    }

    /// Every successfully applied record, flattened in application order
    pub fn records(&self) -> Vec<ChangeRecord<T>> {
        self.batches().into_iter().flatten().collect()
    }

    /// `apply_batch` calls, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn get(&self, handle: Handle) -> Option<T> {
        self.entries.lock().unwrap().get(&handle).cloned()
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.entries.lock().unwrap().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Resource> ResourceStore<T> for RecordingStore<T> {
    fn initialize(&self) -> Result<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<T>> {
        let failure = *self.read_failure.lock().unwrap();
        match failure {
            FailureMode::None => {}
            FailureMode::Error => return Err(Error::store("recording store told to fail reads")),
            FailureMode::Panic => panic!("recording store told to panic on read"),
        }
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }

    fn apply_batch(&self, batch: &[ChangeRecord<T>]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.apply_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let failure = *self.failure.lock().unwrap();
        match failure {
            FailureMode::None => {}
            FailureMode::Error => return Err(Error::store("recording store told to fail")),
            FailureMode::Panic => panic!("recording store told to panic"),
        }

        let mut entries = self.entries.lock().unwrap();
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
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}
