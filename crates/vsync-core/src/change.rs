//! Change records describing a single mutation

use std::fmt;

use crate::resource::{Handle, Resource};

/// The kind of mutation a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Upsert the payload under its handle
    Set,
    /// Delete whatever is stored under the payload's handle
    Remove,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One mutation of one resource.
///
/// Records are immutable and never merged: two changes to the same handle
/// stay two ordered records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord<T> {
    payload: T,
    kind: ChangeKind,
}

impl<T> ChangeRecord<T> {
    pub fn new(payload: T, kind: ChangeKind) -> Self {
        Self { payload, kind }
    }

    pub fn set(payload: T) -> Self {
        Self::new(payload, ChangeKind::Set)
    }

    pub fn remove(payload: T) -> Self {
        Self::new(payload, ChangeKind::Remove)
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Resource> ChangeRecord<T> {
    pub fn handle(&self) -> Handle {
        self.payload.handle()
    }
}
