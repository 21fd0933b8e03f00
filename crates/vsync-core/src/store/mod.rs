//! Persistent store collaborators
//!
//! The bus only needs three things from durable storage: a one-time
//! initialization, a bulk read for bootstrap and an ordered batch apply for
//! flush. Two backends ship with the crate:
//!
//! - [`FileStore`]: a versioned document on disk (JSON, TOML or YAML)
//! - [`MemoryStore`]: a process-local map, useful for tests and ephemeral guests

mod file;
mod memory;

pub use file::{FileStore, STORE_FORMAT_VERSION};
pub use memory::MemoryStore;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use vsync_fs::NormalizedPath;
use vsync_meta::{ConnectionDescriptor, ResourceKind};

use crate::change::ChangeRecord;
use crate::error::{Error, Result};
use crate::resource::Resource;

/// Durable storage for one kind of virtualized resource.
///
/// `apply_batch` must apply records in order (`Set` upserts, `Remove`
/// deletes, keyed by handle) and must leave the previous state intact if it
/// fails part way. Repeated `Set`/`Remove` of the same handle are idempotent.
pub trait ResourceStore<T: Resource>: Send + Sync {
    /// Prepare the store for use. Called once, at bus construction.
    fn initialize(&self) -> Result<()>;

    /// Every persisted entity, in no particular order
    fn read_all(&self) -> Result<Vec<T>>;

    /// Apply one flushed batch
    fn apply_batch(&self, batch: &[ChangeRecord<T>]) -> Result<()>;
}

/// Open the store a descriptor points at.
///
/// # Errors
///
/// `Error::Configuration` if the descriptor is unusable for `kind`.
pub fn open_store<T>(
    kind: ResourceKind,
    descriptor: &ConnectionDescriptor,
) -> Result<Arc<dyn ResourceStore<T>>>
where
    T: Resource + Serialize + DeserializeOwned,
{
    descriptor
        .validate(kind)
        .map_err(|e| Error::configuration(e.to_string()))?;

    let store: Arc<dyn ResourceStore<T>> = match descriptor {
        ConnectionDescriptor::File { path } => Arc::new(FileStore::new(NormalizedPath::new(path))),
        ConnectionDescriptor::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::debug!(%kind, ?descriptor, "Opened resource store");
    Ok(store)
}
