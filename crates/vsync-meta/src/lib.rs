//! Configuration collaborators for the vsync synchronization bus
//!
//! This crate describes *what* is virtualized and *where* virtualized state
//! is persisted:
//!
//! - [`RuleSet`]: ordered filesystem or registry rules mapping guest paths to
//!   a [`VirtualizationType`]
//! - [`ConnectionDescriptor`]: how to reach the persistent store for a
//!   [`ResourceKind`]
//! - [`ConfigurationProvider`]: the narrow contract the bus consumes
//! - [`SyncConfig`]: a file-backed provider loaded through `vsync_fs::ConfigStore`

pub mod config;
pub mod connection;
pub mod error;
pub mod rules;

pub use config::{ConfigurationProvider, StoreSections, SyncConfig, SyncSettings};
pub use connection::{ConnectionDescriptor, ResourceKind};
pub use error::{Error, Result};
pub use rules::{Rule, RuleSet, VirtualizationType};
