//! Error types for vsync-core

/// Result type for vsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable store connection; the bus cannot be constructed
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A caller-supplied argument was rejected; state is unchanged
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The persistent store failed to read or apply changes
    #[error("Store error: {message}")]
    Store { message: String },

    /// The bus is already bridged to a collection
    #[error("Bus is already bridged to a collection; bootstrap runs once per bus")]
    DoubleSubscription,

    /// The bus was disposed or the process is shutting down
    #[error("Bus has been disposed")]
    Disposed,

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from vsync-fs
    #[error(transparent)]
    Fs(#[from] vsync_fs::Error),

    /// Configuration error from vsync-meta
    #[error(transparent)]
    Meta(#[from] vsync_meta::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
