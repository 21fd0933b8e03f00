//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::time::Duration;

use backoff::ExponentialBackoff;
use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Tuning knobs for locked writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// How long to keep retrying a contended lock before giving up
    pub lock_timeout: Duration,
    /// Whether to fsync the temp file before renaming it into place
    pub enable_fsync: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            enable_fsync: true,
        }
    }
}

/// An exclusive advisory lock on `<target>.lock`.
///
/// The lock lives on a sidecar file so the target itself can be replaced by
/// rename while the lock is held. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    target: NormalizedPath,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(target = %self.target, error = %e, "Failed to release lock");
        }
    }
}

/// Acquire the exclusive lock guarding `path`.
///
/// Contended locks are retried with exponential backoff until
/// `config.lock_timeout` elapses.
pub fn acquire_lock(path: &NormalizedPath, config: RobustnessConfig) -> Result<FileLock> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }

    let lock_path = path.with_suffix(".lock").to_native();
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::io(&lock_path, e))?;

    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(250),
        max_elapsed_time: Some(config.lock_timeout),
        ..ExponentialBackoff::default()
    };

    backoff::retry(policy, || {
        file.try_lock_exclusive().map_err(backoff::Error::transient)
    })
    .map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    Ok(FileLock {
        file,
        target: path.clone(),
    })
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers never observe a partial file.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let lock = acquire_lock(path, config)?;
    write_locked(&lock, content, config)
}

/// Replace the lock's target file while the caller already holds the lock.
pub fn write_locked(lock: &FileLock, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let native_path = lock.target.to_native();

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_name = format!(
        ".{}.{}.tmp",
        lock.target.file_name().unwrap_or("vsync"),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;

    if config.enable_fsync {
        temp_file
            .sync_all()
            .map_err(|e| Error::io(&temp_path, e))?;
    }
    drop(temp_file);

    if let Err(e) = fs::rename(&temp_path, &native_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&native_path, e));
    }

    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}
