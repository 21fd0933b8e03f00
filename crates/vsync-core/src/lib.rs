//! Write-behind synchronization for virtualized application state
//!
//! This crate keeps the in-memory collections a virtualization engine hands
//! to a guest application durable, without making guest mutations wait on
//! storage:
//!
//! - **Observed collections**: keyed entity collections that notify
//!   subscribers of every insert, update and removal
//! - **Pending batch**: an append-only change log drained atomically by flush
//! - **Flush scheduler**: an optional background loop flushing on an interval
//! - **Exit flush**: pending changes reach the store before the process exits
//!
//! # Architecture
//!
//! ```text
//!   guest mutation
//!        |
//!   ObservedCollection --(BatchBridge)--> PendingBatch
//!                                              |
//!                     flush (manual | FlushScheduler | ShutdownSignal)
//!                                              |
//!                                        ResourceStore
//!                                       /             \
//!                                 FileStore        MemoryStore
//! ```
//!
//! `vsync-core` sits above `vsync-fs` (paths, locking, atomic writes) and
//! `vsync-meta` (configuration, virtualization rules).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vsync_core::{ObservedCollection, RegistrySyncBus, ShutdownSignal, VirtualRegistryKey};
//! use vsync_fs::NormalizedPath;
//! use vsync_meta::{ResourceKind, SyncConfig};
//!
//! fn example() -> vsync_core::Result<()> {
//!     let config = SyncConfig::load(&NormalizedPath::new("vsync.toml"))?;
//!     let signal = ShutdownSignal::new();
//!     let bus = RegistrySyncBus::connect(Arc::new(config), ResourceKind::Registry, &signal)?;
//!
//!     let keys = ObservedCollection::new();
//!     bus.bootstrap(&keys)?;
//!     keys.insert(VirtualRegistryKey::new(1, r"HKEY_CURRENT_USER\Software\Vendor"));
//!     bus.flush()?;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod bridge;
pub mod bus;
pub mod change;
pub mod collection;
pub mod error;
pub mod logging;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod shutdown;
pub mod store;

pub use batch::PendingBatch;
pub use bridge::BatchBridge;
pub use bus::{FlushReport, RegistrySyncBus, SyncBus, SyncStatus};
pub use change::{ChangeKind, ChangeRecord};
pub use collection::{CollectionObserver, ObservedCollection, Subscription};
pub use error::{Error, Result};
pub use registry::{RegistryValue, VirtualRegistryKey};
pub use resource::{Handle, Resource};
pub use scheduler::{DEFAULT_FLUSH_INTERVAL_MS, FlushScheduler, FlushTarget, SchedulerState};
pub use shutdown::{ShutdownSignal, ShutdownSubscription};
pub use store::{FileStore, MemoryStore, ResourceStore, STORE_FORMAT_VERSION, open_store};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panicking guest thread must not take the bus down with it: every guarded
// structure here stays consistent between statements, so poisoned locks are
// entered anyway.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
