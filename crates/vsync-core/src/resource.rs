//! Resource identity

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable numeric identifier of a virtualized resource within its collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl Handle {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A virtualized resource the bus can persist.
///
/// The bus treats the value as opaque: only the handle is read, to key
/// store upserts and deletes.
pub trait Resource: Clone + Send + Sync + 'static {
    fn handle(&self) -> Handle;
}
