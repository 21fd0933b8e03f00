//! Observed collection: the live, externally owned view of virtualized state
//!
//! The guest-facing virtualization layer mutates an [`ObservedCollection`]
//! directly. Interested parties register a [`CollectionObserver`] and are
//! told about every insert, update and removal, synchronously and in
//! mutation order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::resource::{Handle, Resource};
use crate::{read, write};

/// Receives mutation notifications from an [`ObservedCollection`].
///
/// Callbacks run while the collection's write lock is held, so they must
/// not call back into the collection.
pub trait CollectionObserver<T>: Send + Sync {
    /// A new handle was inserted
    fn on_added(&self, entity: &T);
    /// An existing handle received a new value
    fn on_changed(&self, entity: &T);
    /// A handle was removed; `entity` is the value it held
    fn on_removed(&self, entity: &T);
}

type ObserverList<T> = RwLock<Vec<(u64, Arc<dyn CollectionObserver<T>>)>>;

struct Observers<T> {
    list: ObserverList<T>,
    next_id: AtomicU64,
}

impl<T> Observers<T> {
    fn snapshot(&self) -> Vec<Arc<dyn CollectionObserver<T>>> {
        read(&self.list).iter().map(|(_, o)| Arc::clone(o)).collect()
    }

    fn remove(&self, id: u64) -> bool {
        let mut list = write(&self.list);
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        list.len() != before
    }
}

/// Registration of an observer on a collection.
///
/// Holds no ownership of the collection. Dropping the subscription, or
/// calling [`Subscription::cancel`], detaches the observer.
#[must_use = "dropping a Subscription detaches the observer"]
pub struct Subscription<T> {
    observers: Weak<Observers<T>>,
    id: u64,
}

impl<T> Subscription<T> {
    /// Detach the observer now. Returns `false` if it was already detached
    /// or the collection is gone.
    pub fn cancel(mut self) -> bool {
        self.detach()
    }

    /// Whether the observer is still registered
    pub fn is_active(&self) -> bool {
        self.observers
            .upgrade()
            .is_some_and(|observers| read(&observers.list).iter().any(|(id, _)| *id == self.id))
    }

    fn detach(&mut self) -> bool {
        let observers = std::mem::take(&mut self.observers);
        observers
            .upgrade()
            .is_some_and(|observers| observers.remove(self.id))
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A keyed map of handle → resource that notifies observers on mutation
pub struct ObservedCollection<T> {
    entries: RwLock<BTreeMap<Handle, T>>,
    observers: Arc<Observers<T>>,
}

impl<T: Resource> Default for ObservedCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> ObservedCollection<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            observers: Arc::new(Observers {
                list: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register an observer for all future mutations.
    pub fn subscribe(&self, observer: Arc<dyn CollectionObserver<T>>) -> Subscription<T> {
        let id = self.observers.next_id.fetch_add(1, Ordering::Relaxed);
        write(&self.observers.list).push((id, observer));
        Subscription {
            observers: Arc::downgrade(&self.observers),
            id,
        }
    }

    /// Replace the contents with `entities` and register `observer`, as one
    /// step under the write lock.
    ///
    /// Existing observers are told about every removal and insertion; the
    /// new observer sees only mutations made after this call returns.
    pub fn replace_all_and_subscribe(
        &self,
        entities: impl IntoIterator<Item = T>,
        observer: Arc<dyn CollectionObserver<T>>,
    ) -> Subscription<T> {
        let mut entries = write(&self.entries);
        let existing = self.observers.snapshot();

        let previous = std::mem::take(&mut *entries);
        for entity in previous.values() {
            for o in &existing {
                o.on_removed(entity);
            }
        }
        for entity in entities {
            let replaced = entries.insert(entity.handle(), entity.clone());
            for o in &existing {
                if replaced.is_some() {
                    o.on_changed(&entity);
                } else {
                    o.on_added(&entity);
                }
            }
        }

        self.subscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        read(&self.observers.list).len()
    }

    /// Insert or replace the entity under its handle.
    ///
    /// Notifies *added* for a new handle and *changed* otherwise. Returns
    /// the previous value.
    pub fn insert(&self, entity: T) -> Option<T> {
        let mut entries = write(&self.entries);
        let previous = entries.insert(entity.handle(), entity.clone());
        for observer in self.observers.snapshot() {
            if previous.is_some() {
                observer.on_changed(&entity);
            } else {
                observer.on_added(&entity);
            }
        }
        previous
    }

    /// Remove the entity under `handle`, notifying *removed* if present.
    pub fn remove(&self, handle: Handle) -> Option<T> {
        let mut entries = write(&self.entries);
        let removed = entries.remove(&handle)?;
        for observer in self.observers.snapshot() {
            observer.on_removed(&removed);
        }
        Some(removed)
    }

    /// Remove every entry, notifying *removed* for each in handle order.
    pub fn clear(&self) {
        let mut entries = write(&self.entries);
        let drained = std::mem::take(&mut *entries);
        let observers = self.observers.snapshot();
        if observers.is_empty() {
            return;
        }
        for entity in drained.values() {
            for observer in &observers {
                observer.on_removed(entity);
            }
        }
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

    /// Clone every entity in handle order.
    pub fn snapshot(&self) -> Vec<T> {
        read(&self.entries).values().cloned().collect()
    }
}
