//! Error types for vsync-meta

/// Result type for vsync-meta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vsync-meta operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rule could not be used as written
    #[error("Invalid rule '{pattern}': {reason}")]
    InvalidRule { pattern: String, reason: String },

    /// A store connection descriptor is unusable
    #[error("Invalid {kind} store descriptor: {reason}")]
    InvalidDescriptor { kind: String, reason: String },

    /// Filesystem error from vsync-fs
    #[error(transparent)]
    Fs(#[from] vsync_fs::Error),
}
