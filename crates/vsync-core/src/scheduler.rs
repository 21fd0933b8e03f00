//! Flush scheduler
//!
//! A background loop that flushes periodically while auto-flush is enabled.
//!
//! ```text
//!   Stopped --set_auto_flush(true)--> Running --auto-flush observed off--> Stopped
//! ```
//!
//! One mutex guards the flag, the interval and the state transition, so
//! enabling twice never starts a second loop. The loop holds that lock while
//! it checks the flag and flushes, and releases it only while sleeping. The
//! sleep is a condvar wait, woken early by `shutdown()` or by disabling.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::lock;

/// Default pause between scheduled flushes
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// Whether a flush loop is currently alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Something the scheduler can flush.
pub trait FlushTarget: Send + Sync + 'static {
    /// Persist whatever is pending. Errors are reported and the loop carries on.
    fn flush_pending(&self) -> Result<()>;
}

#[derive(Debug)]
struct SchedulerConfig {
    auto_flush: bool,
    interval_ms: u64,
    state: SchedulerState,
    shutdown: bool,
    worker: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared {
    config: Mutex<SchedulerConfig>,
    wake: Condvar,
}

/// Owns the auto-flush configuration and at most one flush loop
#[derive(Debug)]
pub struct FlushScheduler {
    shared: Arc<Shared>,
}

impl Default for FlushScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                config: Mutex::new(SchedulerConfig {
                    auto_flush: false,
                    interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
                    state: SchedulerState::Stopped,
                    shutdown: false,
                    worker: None,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    pub fn auto_flush(&self) -> bool {
        lock(&self.shared.config).auto_flush
    }

    /// Enable or disable periodic flushing of `target`.
    ///
    /// Enabling while a loop is running only sets the flag. Disabling is
    /// cooperative: the loop notices at its next check and stops.
    ///
    /// # Errors
    ///
    /// `Error::Disposed` when enabling after [`FlushScheduler::shutdown`];
    /// `Error::Io` if the worker thread cannot be spawned, in which case
    /// auto-flush stays disabled.
    pub fn set_auto_flush(&self, enabled: bool, target: Arc<dyn FlushTarget>) -> Result<()> {
        let mut config = lock(&self.shared.config);

        if !enabled {
            config.auto_flush = false;
            self.shared.wake.notify_all();
            return Ok(());
        }

        if config.shutdown {
            return Err(Error::Disposed);
        }

        config.auto_flush = true;
        if config.state == SchedulerState::Running {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("vsync-flush".into())
            .spawn(move || run_loop(shared, target));

        match spawned {
            Ok(worker) => {
                config.state = SchedulerState::Running;
                config.worker = Some(worker);
                tracing::debug!(interval_ms = config.interval_ms, "Flush scheduler started");
                Ok(())
            }
            Err(e) => {
                config.auto_flush = false;
                Err(Error::Io(e))
            }
        }
    }

    pub fn flush_interval_ms(&self) -> u64 {
        lock(&self.shared.config).interval_ms
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms())
    }

    /// Set the pause between flushes, effective from the loop's next sleep.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for a negative interval; the current value is kept.
    pub fn set_flush_interval(&self, millis: i64) -> Result<()> {
        let millis = u64::try_from(millis).map_err(|_| {
            Error::invalid_argument(format!(
                "flush interval must be non-negative, got {}ms",
                millis
            ))
        })?;
        lock(&self.shared.config).interval_ms = millis;
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.shared.config).state
    }

    /// Stop the loop for good and wait for it to exit.
    ///
    /// A flush already in progress completes first. Idempotent.
    pub fn shutdown(&self) {
        let worker = {
            let mut config = lock(&self.shared.config);
            config.shutdown = true;
            self.shared.wake.notify_all();
            config.worker.take()
        };

        // A handler running on the worker itself must not join it
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::warn!("Flush scheduler thread panicked during shutdown");
            }
        }
    }
}

fn run_loop(shared: Arc<Shared>, target: Arc<dyn FlushTarget>) {
    let mut config = lock(&shared.config);

    loop {
        if !config.auto_flush || config.shutdown {
            break;
        }

        flush_guarded(target.as_ref());

        // The flag may have been read before a long flush began
        if !config.auto_flush || config.shutdown {
            break;
        }

        let interval = Duration::from_millis(config.interval_ms);
        let (guard, _) = shared
            .wake
            .wait_timeout_while(config, interval, |c| c.auto_flush && !c.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        config = guard;
    }

    config.state = SchedulerState::Stopped;
    tracing::debug!("Flush scheduler stopped");
}

/// Run one flush; neither an error nor a panic may end the loop.
fn flush_guarded(target: &dyn FlushTarget) {
    match panic::catch_unwind(AssertUnwindSafe(|| target.flush_pending())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Scheduled flush failed; retrying next cycle");
        }
        Err(_) => {
            tracing::error!("Scheduled flush panicked; retrying next cycle");
        }
    }
}
