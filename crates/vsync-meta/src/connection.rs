//! Store connection descriptors

use std::fmt;

use serde::{Deserialize, Serialize};
use vsync_fs::NormalizedPath;

use crate::{Error, Result};

/// Kinds of virtualized resources that get their own store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Registry,
    FileSystem,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::FileSystem => write!(f, "file-system"),
        }
    }
}

/// How to reach a persistent store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum ConnectionDescriptor {
    /// A document on disk; the format follows the file extension
    File { path: String },
    /// A process-local store, lost on exit
    Memory,
}

impl ConnectionDescriptor {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File { path: path.into() }
    }

    /// Check that the descriptor can be opened for `kind`.
    pub fn validate(&self, kind: ResourceKind) -> Result<()> {
        match self {
            Self::File { path } if path.trim().is_empty() => Err(Error::InvalidDescriptor {
                kind: kind.to_string(),
                reason: "file backend requires a non-empty path".into(),
            }),
            Self::File { path } if NormalizedPath::new(path).extension().is_none() => {
                Err(Error::InvalidDescriptor {
                    kind: kind.to_string(),
                    reason: format!("cannot infer document format from '{}'", path),
                })
            }
            Self::File { path }
                if NormalizedPath::new(path)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("toml")) =>
            {
                Err(Error::InvalidDescriptor {
                    kind: kind.to_string(),
                    reason: format!(
                        "'{}': TOML cannot hold 64-bit unsigned values; use .json or .yaml",
                        path
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    /// Resolve a relative file path against `base`.
    pub fn resolved(&self, base: Option<&NormalizedPath>) -> Self {
        match (self, base) {
            (Self::File { path }, Some(base)) => Self::File {
                path: NormalizedPath::new(path)
                    .resolve_against(base)
                    .as_str()
                    .to_string(),
            },
            _ => self.clone(),
        }
    }
}
