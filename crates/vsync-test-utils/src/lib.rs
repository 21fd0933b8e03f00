//! Shared test utilities for the vsync workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`store`]: [`RecordingStore`], a store that remembers every batch and
//!   can be told to fail
//! - [`fixtures`]: registry key builders and [`TestWorkspace`], a temporary
//!   directory holding a configuration document and its stores

pub mod fixtures;
pub mod store;

pub use fixtures::{TestWorkspace, key, keys};
pub use store::{FailureMode, RecordingStore};
