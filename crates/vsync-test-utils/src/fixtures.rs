//! Registry key builders and [`TestWorkspace`].

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use vsync_core::{RegistryValue, VirtualRegistryKey};
use vsync_fs::NormalizedPath;

/// A key under `HKEY_CURRENT_USER\Software\Test` carrying one string value.
pub fn key(handle: u64) -> VirtualRegistryKey {
    VirtualRegistryKey::new(handle, format!(r"HKEY_CURRENT_USER\Software\Test\Key{}", handle))
        .with_value("Name", RegistryValue::String(format!("key-{}", handle)))
}

/// Keys for every handle in `handles`.
pub fn keys(handles: impl IntoIterator<Item = u64>) -> Vec<VirtualRegistryKey> {
    handles.into_iter().map(key).collect()
}

/// A temporary directory holding a configuration document.
///
/// # Example
///
/// ```rust,no_run
/// use vsync_test_utils::TestWorkspace;
///
/// let workspace = TestWorkspace::new();
/// let config = workspace.write_config_with_file_store("registry.json", false, 1000);
/// assert!(config.is_file());
/// ```
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `relative` resolved under the workspace root
    pub fn path(&self, relative: &str) -> NormalizedPath {
        NormalizedPath::new(self.root().join(relative))
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> NormalizedPath {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        NormalizedPath::new(path)
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).unwrap()
    }

    /// Write `vsync.toml` pointing the registry store at `store` (relative to
    /// the workspace) and return the document's path.
    pub fn write_config_with_file_store(
        &self,
        store: &str,
        auto_flush: bool,
        flush_interval_ms: u64,
    ) -> NormalizedPath {
        self.write(
            "vsync.toml",
            &format!(
                r#"[sync]
auto_flush = {auto_flush}
flush_interval_ms = {flush_interval_ms}

[stores.registry]
backend = "file"
path = "{store}"

[rules.registry]
default_access = "transparent"

[[rules.registry.rules]]
pattern = 'HKEY_CURRENT_USER\Software\Test'
access = "virtual"
"#
            ),
        )
    }
}
