//! Filesystem abstraction for vsync
//!
//! Provides normalized path handling, locked atomic I/O and format-agnostic
//! document loading for the persistent store and configuration layers.

pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::{FileLock, RobustnessConfig};
pub use path::NormalizedPath;
