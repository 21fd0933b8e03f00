//! File-backed configuration provider
//!
//! A `SyncConfig` document looks like:
//!
//! ```toml
//! [sync]
//! auto_flush = true
//! flush_interval_ms = 500
//!
//! [stores.registry]
//! backend = "file"
//! path = "data/registry.json"
//!
//! [rules.registry]
//! default_access = "transparent"
//!
//! [[rules.registry.rules]]
//! pattern = 'HKEY_CURRENT_USER\Software\Vendor'
//! access = "virtual"
//! ```
//!
//! Relative store paths resolve against the directory holding the document.

use serde::{Deserialize, Serialize};
use vsync_fs::{ConfigStore, NormalizedPath};

use crate::connection::{ConnectionDescriptor, ResourceKind};
use crate::rules::RuleSet;
use crate::Result;

/// The contract the synchronization bus consumes from configuration.
///
/// Implementations answer from their current state on every call; the bus
/// does not cache results.
pub trait ConfigurationProvider: Send + Sync {
    /// Rules governing virtualized filesystem paths
    fn file_system_rules(&self) -> RuleSet;

    /// Rules governing virtualized registry keys
    fn registry_rules(&self) -> RuleSet;

    /// Where the store for `kind` lives, if configured
    fn connection_descriptor(&self, kind: ResourceKind) -> Option<ConnectionDescriptor>;
}

/// Write-behind tuning applied to a bus at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub auto_flush: bool,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    1000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_flush: false,
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Store descriptors keyed by resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<ConnectionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<ConnectionDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSections {
    #[serde(default)]
    pub filesystem: RuleSet,
    #[serde(default)]
    pub registry: RuleSet,
}

/// Configuration document for a virtualized application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub stores: StoreSections,
    #[serde(default)]
    pub rules: RuleSections,
    /// Directory of the loaded document (not serialized)
    #[serde(skip)]
    base_dir: Option<NormalizedPath>,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration document; the format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a rule
    /// set contains unusable rules.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        tracing::debug!(%path, "Loading sync configuration");
        let mut config: Self = ConfigStore::new().load(path)?;
        config.rules.filesystem.validate()?;
        config.rules.registry.validate()?;
        config.base_dir = path.parent();
        Ok(config)
    }

    /// Save the configuration document atomically.
    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        ConfigStore::new().save(path, self)?;
        Ok(())
    }

    pub fn with_store(mut self, kind: ResourceKind, descriptor: ConnectionDescriptor) -> Self {
        match kind {
            ResourceKind::Registry => self.stores.registry = Some(descriptor),
            ResourceKind::FileSystem => self.stores.filesystem = Some(descriptor),
        }
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn with_file_system_rules(mut self, rules: RuleSet) -> Self {
        self.rules.filesystem = rules;
        self
    }

    pub fn with_registry_rules(mut self, rules: RuleSet) -> Self {
        self.rules.registry = rules;
        self
    }

    /// Override the directory relative store paths resolve against
    pub fn with_base_dir(mut self, base_dir: NormalizedPath) -> Self {
        self.base_dir = Some(base_dir);
        self
    }

    pub fn settings(&self) -> SyncSettings {
        self.sync
    }
}

impl ConfigurationProvider for SyncConfig {
    fn file_system_rules(&self) -> RuleSet {
        self.rules.filesystem.clone()
    }

    fn registry_rules(&self) -> RuleSet {
        self.rules.registry.clone()
    }

    fn connection_descriptor(&self, kind: ResourceKind) -> Option<ConnectionDescriptor> {
        let descriptor = match kind {
            ResourceKind::Registry => self.stores.registry.as_ref(),
            ResourceKind::FileSystem => self.stores.filesystem.as_ref(),
        }?;
        Some(descriptor.resolved(self.base_dir.as_ref()))
    }
}
