//! Virtual registry keys
//!
//! The resource the engine virtualizes today. A key is identified by the
//! handle the virtual registry hands to the guest; its path and values are
//! opaque to the bus and only travel to the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::{Handle, Resource};

/// Typed registry value data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryValue {
    /// `REG_NONE`
    None,
    /// `REG_SZ`
    String(String),
    /// `REG_EXPAND_SZ`, environment references left unexpanded
    ExpandString(String),
    /// `REG_MULTI_SZ`
    MultiString(Vec<String>),
    /// `REG_DWORD`
    #[serde(rename = "dword")]
    DWord(u32),
    /// `REG_QWORD`
    #[serde(rename = "qword")]
    QWord(u64),
    /// `REG_BINARY`
    Binary(Vec<u8>),
}

/// A key in the virtual registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualRegistryKey {
    pub handle: Handle,
    /// Full key path, e.g. `HKEY_CURRENT_USER\Software\Vendor\Product`
    pub path: String,
    /// Values keyed by lower-cased name; the empty name is the default value
    #[serde(default)]
    values: BTreeMap<String, RegistryValue>,
}

impl VirtualRegistryKey {
    pub fn new(handle: u64, path: impl Into<String>) -> Self {
        Self {
            handle: Handle::new(handle),
            path: path.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style value assignment
    pub fn with_value(mut self, name: &str, value: RegistryValue) -> Self {
        self.set_value(name, value);
        self
    }

    /// Set a value; names compare case-insensitively like the host registry.
    pub fn set_value(&mut self, name: &str, value: RegistryValue) -> Option<RegistryValue> {
        self.values.insert(name.to_lowercase(), value)
    }

    pub fn value(&self, name: &str) -> Option<&RegistryValue> {
        self.values.get(&name.to_lowercase())
    }

    pub fn remove_value(&mut self, name: &str) -> Option<RegistryValue> {
        self.values.remove(&name.to_lowercase())
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &RegistryValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

impl Resource for VirtualRegistryKey {
    fn handle(&self) -> Handle {
        self.handle
    }
}
