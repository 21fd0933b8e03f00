//! Document-backed persistent store
//!
//! The whole collection lives in one versioned JSON or YAML document. A batch apply takes
//! the exclusive sidecar lock, reads the current document, applies every
//! record in order and atomically replaces the file, so readers and other
//! processes never see a half-applied batch.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use vsync_fs::config::Format;
use vsync_fs::{ConfigStore, NormalizedPath, RobustnessConfig, io};

use crate::change::{ChangeKind, ChangeRecord};
use crate::error::{Error, Result};
use crate::resource::{Handle, Resource};

use super::ResourceStore;

/// Store document format version for forward compatibility
pub const STORE_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument<T> {
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime<Utc>>,
    #[serde(default = "Vec::new")]
    entries: Vec<T>,
}

impl<T> StoreDocument<T> {
    fn empty() -> Self {
        Self {
            version: STORE_FORMAT_VERSION.to_string(),
            updated: None,
            entries: Vec::new(),
        }
    }
}

/// A store persisted as a single JSON or YAML document
#[derive(Debug)]
pub struct FileStore<T> {
    path: NormalizedPath,
    documents: ConfigStore,
    _entity: PhantomData<fn() -> T>,
}

impl<T> FileStore<T>
where
    T: Resource + Serialize + DeserializeOwned,
{
    pub fn new(path: NormalizedPath) -> Self {
        Self::with_robustness(path, RobustnessConfig::default())
    }

    pub fn with_robustness(path: NormalizedPath, robustness: RobustnessConfig) -> Self {
        Self {
            path,
            documents: ConfigStore::with_robustness(robustness),
            _entity: PhantomData,
        }
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    fn load_document(&self) -> Result<StoreDocument<T>> {
        if !self.path.is_file() {
            return Ok(StoreDocument::empty());
        }
        let document: StoreDocument<T> = self
            .documents
            .load(&self.path)
            .map_err(|e| self.failure("read", e))?;

        if document.version != STORE_FORMAT_VERSION {
            return Err(Error::store(format!(
                "{} has unsupported store version {} (expected {})",
                self.path, document.version, STORE_FORMAT_VERSION
            )));
        }
        Ok(document)
    }

    fn failure(&self, action: &str, source: vsync_fs::Error) -> Error {
        Error::store(format!("failed to {} {}: {}", action, self.path, source))
    }
}

impl<T> ResourceStore<T> for FileStore<T>
where
    T: Resource + Serialize + DeserializeOwned,
{
    fn initialize(&self) -> Result<()> {
        let format = Format::detect(&self.path).map_err(|e| self.failure("open", e))?;
        if format == Format::Toml {
            // TOML integers are i64; handles and QWORD values span all of u64
            return Err(Error::store(format!(
                "{} cannot hold 64-bit unsigned values; use a .json or .yaml store",
                self.path
            )));
        }

        let lock = io::acquire_lock(&self.path, self.documents.robustness())
            .map_err(|e| self.failure("lock", e))?;
        if self.path.is_file() {
            // Fail fast on a corrupt or foreign document
            self.load_document()?;
            return Ok(());
        }

        let content = self
            .documents
            .render(&self.path, &StoreDocument::<T>::empty())
            .map_err(|e| self.failure("encode", e))?;
        io::write_locked(&lock, content.as_bytes(), self.documents.robustness())
            .map_err(|e| self.failure("create", e))?;
        tracing::debug!(path = %self.path, "Created empty resource store");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<T>> {
        Ok(self.load_document()?.entries)
    }

    fn apply_batch(&self, batch: &[ChangeRecord<T>]) -> Result<()> {
        let lock = io::acquire_lock(&self.path, self.documents.robustness())
            .map_err(|e| self.failure("lock", e))?;

        let document = self.load_document()?;
        let mut entries: BTreeMap<Handle, T> = document
            .entries
            .into_iter()
            .map(|entity| (entity.handle(), entity))
            .collect();

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

        let updated = StoreDocument {
            version: STORE_FORMAT_VERSION.to_string(),
            updated: Some(Utc::now()),
            entries: entries.into_values().collect(),
        };
        let content = self
            .documents
            .render(&self.path, &updated)
            .map_err(|e| self.failure("encode", e))?;
        io::write_locked(&lock, content.as_bytes(), self.documents.robustness())
            .map_err(|e| self.failure("write", e))?;

        tracing::trace!(path = %self.path, records = batch.len(), "Applied batch");
        Ok(())
    }
}
