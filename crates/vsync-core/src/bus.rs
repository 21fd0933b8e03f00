//! Synchronization bus
//!
//! The bus keeps a live [`ObservedCollection`] durable without making guest
//! mutations wait on storage:
//!
//! 1. [`SyncBus::connect`] opens the store named by configuration.
//! 2. [`SyncBus::bootstrap`] loads the persisted state into the collection,
//!    then bridges the collection's notifications into the pending batch.
//! 3. [`SyncBus::flush`] (manual, scheduled, or on process exit) drains the
//!    batch and applies it to the store.
//!
//! Only the scheduler's sleep ever suspends; every other entry point runs
//! synchronously on the caller's thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use vsync_meta::{ConfigurationProvider, ResourceKind, RuleSet, SyncSettings};

use crate::batch::PendingBatch;
use crate::bridge::BatchBridge;
use crate::change::{ChangeKind, ChangeRecord};
use crate::collection::{ObservedCollection, Subscription};
use crate::error::{Error, Result};
use crate::lock;
use crate::registry::VirtualRegistryKey;
use crate::resource::Resource;
use crate::scheduler::{FlushScheduler, FlushTarget, SchedulerState};
use crate::shutdown::{ShutdownSignal, ShutdownSubscription};
use crate::store::{self, ResourceStore};

/// A bus persisting virtual registry keys
pub type RegistrySyncBus = SyncBus<VirtualRegistryKey>;

/// What one flush handed to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sets: usize,
    pub removes: usize,
}

impl FlushReport {
    fn of<T>(batch: &[ChangeRecord<T>]) -> Self {
        batch.iter().fold(Self::default(), |mut report, record| {
            match record.kind() {
                ChangeKind::Set => report.sets += 1,
                ChangeKind::Remove => report.removes += 1,
            }
            report
        })
    }

    pub fn total(&self) -> usize {
        self.sets + self.removes
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Point-in-time view of a bus, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Change records waiting for the next flush
    pub pending: usize,
    pub auto_flush: bool,
    pub flush_interval_ms: u64,
    pub scheduler: SchedulerState,
    pub bridged: bool,
    pub disposed: bool,
    /// Flushes that reached the store successfully (empty flushes excluded)
    pub flushes: u64,
    /// Flushes whose batch was lost to a store failure
    pub failed_flushes: u64,
    pub records_persisted: u64,
    pub last_error: Option<String>,
    pub last_flush: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct FlushStats {
    flushes: u64,
    failed_flushes: u64,
    records_persisted: u64,
    last_error: Option<String>,
    last_flush: Option<DateTime<Utc>>,
}

enum BridgeState<T> {
    Unbridged,
    Bridged(Subscription<T>),
    Detached,
}

struct BusInner<T: Resource> {
    store: Arc<dyn ResourceStore<T>>,
    provider: Arc<dyn ConfigurationProvider>,
    batch: Arc<PendingBatch<T>>,
    scheduler: FlushScheduler,
    /// Serializes flushes so batches reach the store in drain order
    flush_lock: Mutex<()>,
    stats: Mutex<FlushStats>,
    bridge: Mutex<BridgeState<T>>,
    disposed: AtomicBool,
}

impl<T: Resource> BusInner<T> {
    fn flush(&self) -> Result<FlushReport> {
        let _serial = lock(&self.flush_lock);

        let batch = self.batch.drain();
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }
        let report = FlushReport::of(&batch);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.store.apply_batch(&batch)))
            .unwrap_or_else(|_| Err(Error::store("store panicked while applying batch")));

        let mut stats = lock(&self.stats);
        match outcome {
            Ok(()) => {
                stats.flushes += 1;
                stats.records_persisted += report.total() as u64;
                stats.last_flush = Some(Utc::now());
                tracing::debug!(sets = report.sets, removes = report.removes, "Flushed batch");
                Ok(report)
            }
            Err(e) => {
                stats.failed_flushes += 1;
                stats.last_error = Some(e.to_string());
                tracing::warn!(dropped = batch.len(), error = %e, "Flush failed; batch dropped");
                Err(e)
            }
        }
    }

    fn detach_bridge(&self) {
        let previous = std::mem::replace(&mut *lock(&self.bridge), BridgeState::Detached);
        if let BridgeState::Bridged(subscription) = previous {
            subscription.cancel();
        }
    }

    fn on_exit(&self) {
        let flush_on_exit = self.scheduler.auto_flush();

        // Stop accepting changes first so the final flush sees the last one
        self.batch.close();
        self.detach_bridge();

        if flush_on_exit {
            match self.flush() {
                Ok(report) => {
                    tracing::info!(records = report.total(), "Flushed pending changes on exit");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Final flush on exit failed");
                }
            }
        }
        self.scheduler.shutdown();
    }
}

impl<T: Resource> FlushTarget for BusInner<T> {
    fn flush_pending(&self) -> Result<()> {
        self.flush().map(|_| ())
    }
}

/// Write-behind synchronization bus for one resource collection
pub struct SyncBus<T: Resource> {
    inner: Arc<BusInner<T>>,
    exit_subscription: Mutex<Option<ShutdownSubscription>>,
}

impl<T> SyncBus<T>
where
    T: Resource + Serialize + DeserializeOwned,
{
    /// Open the store configured for `kind` and build a bus around it.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if the provider has no usable descriptor for
    /// `kind`; store errors from initialization are propagated.
    pub fn connect(
        provider: Arc<dyn ConfigurationProvider>,
        kind: ResourceKind,
        signal: &ShutdownSignal,
    ) -> Result<Self> {
        let descriptor = provider.connection_descriptor(kind).ok_or_else(|| {
            Error::configuration(format!("no {} store connection configured", kind))
        })?;
        let store = store::open_store(kind, &descriptor)?;
        Self::with_store(store, provider, signal)
    }
}

impl<T: Resource> SyncBus<T> {
    /// Build a bus around an already opened store.
    ///
    /// Initializes the store and subscribes to `signal` so pending changes
    /// are flushed before the process exits.
    pub fn with_store(
        store: Arc<dyn ResourceStore<T>>,
        provider: Arc<dyn ConfigurationProvider>,
        signal: &ShutdownSignal,
    ) -> Result<Self> {
        if signal.is_fired() {
            return Err(Error::Disposed);
        }
        store.initialize()?;

        let inner = Arc::new(BusInner {
            store,
            provider,
            batch: Arc::new(PendingBatch::new()),
            scheduler: FlushScheduler::new(),
            flush_lock: Mutex::new(()),
            stats: Mutex::new(FlushStats::default()),
            bridge: Mutex::new(BridgeState::Unbridged),
            disposed: AtomicBool::new(false),
        });

        let weak: Weak<BusInner<T>> = Arc::downgrade(&inner);
        let subscription = signal.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_exit();
            }
        });

        tracing::debug!("Synchronization bus constructed");
        Ok(Self {
            inner,
            exit_subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Load persisted state into `collection` and start observing it.
    ///
    /// The collection ends up holding exactly the stored entities; from then
    /// on every insert, update and removal becomes a pending change record.
    /// Runs once per bus. Returns the number of entities loaded.
    ///
    /// # Errors
    ///
    /// - `Error::DoubleSubscription` if the bus is already bridged
    /// - `Error::Disposed` after [`SyncBus::dispose`] or process exit
    /// - store errors from the bulk read; the collection is left untouched
    pub fn bootstrap(&self, collection: &ObservedCollection<T>) -> Result<usize> {
        let mut bridge = lock(&self.inner.bridge);
        match *bridge {
            BridgeState::Unbridged => {}
            BridgeState::Bridged(_) => return Err(Error::DoubleSubscription),
            BridgeState::Detached => return Err(Error::Disposed),
        }

        let entities = self.inner.store.read_all()?;
        let count = entities.len();

        let observer = Arc::new(BatchBridge::new(Arc::clone(&self.inner.batch)));
        *bridge = BridgeState::Bridged(collection.replace_all_and_subscribe(entities, observer));

        tracing::info!(entities = count, "Bootstrapped collection from store");
        Ok(count)
    }

    pub fn is_bridged(&self) -> bool {
        matches!(*lock(&self.inner.bridge), BridgeState::Bridged(_))
    }

    pub fn auto_flush(&self) -> bool {
        self.inner.scheduler.auto_flush()
    }

    /// Start or stop periodic flushing. Enabling twice keeps one loop.
    pub fn set_auto_flush(&self, enabled: bool) -> Result<()> {
        let target: Arc<dyn FlushTarget> = self.inner.clone();
        self.inner.scheduler.set_auto_flush(enabled, target)
    }

    pub fn flush_interval_ms(&self) -> u64 {
        self.inner.scheduler.flush_interval_ms()
    }

    pub fn flush_interval(&self) -> Duration {
        self.inner.scheduler.flush_interval()
    }

    /// Set the pause between scheduled flushes.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for a negative value; the interval is unchanged.
    pub fn set_flush_interval(&self, millis: i64) -> Result<()> {
        self.inner.scheduler.set_flush_interval(millis)
    }

    /// Apply startup settings: interval first, then auto-flush.
    pub fn apply_settings(&self, settings: &SyncSettings) -> Result<()> {
        let millis = i64::try_from(settings.flush_interval_ms).map_err(|_| {
            Error::invalid_argument(format!(
                "flush interval {}ms is out of range",
                settings.flush_interval_ms
            ))
        })?;
        self.set_flush_interval(millis)?;
        self.set_auto_flush(settings.auto_flush)
    }

    /// Drain the pending batch and apply it to the store.
    ///
    /// An empty batch is a no-op that never touches the store. Records of a
    /// batch the store rejects are not re-queued.
    pub fn flush(&self) -> Result<FlushReport> {
        self.inner.flush()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.batch.len()
    }

    pub fn file_system_rules(&self) -> RuleSet {
        self.inner.provider.file_system_rules()
    }

    pub fn registry_rules(&self) -> RuleSet {
        self.inner.provider.registry_rules()
    }

    pub fn status(&self) -> SyncStatus {
        // The scheduler lock is held across scheduled flushes, which take the
        // stats lock; read it first so the two are never nested this way round.
        let auto_flush = self.inner.scheduler.auto_flush();
        let flush_interval_ms = self.inner.scheduler.flush_interval_ms();
        let scheduler = self.inner.scheduler.state();
        let bridged = self.is_bridged();

        let stats = lock(&self.inner.stats);
        SyncStatus {
            pending: self.inner.batch.len(),
            auto_flush,
            flush_interval_ms,
            scheduler,
            bridged,
            disposed: self.is_disposed(),
            flushes: stats.flushes,
            failed_flushes: stats.failed_flushes,
            records_persisted: stats.records_persisted,
            last_error: stats.last_error.clone(),
            last_flush: stats.last_flush,
        }
    }

    /// Release the bus: unsubscribe from the exit signal, stop observing the
    /// collection, refuse further changes and stop the scheduler.
    ///
    /// Does not flush. Callers that need pending changes persisted must
    /// flush first or rely on the exit signal. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscription) = lock(&self.exit_subscription).take() {
            subscription.cancel();
        }
        self.inner.detach_bridge();
        self.inner.batch.close();
        self.inner.scheduler.shutdown();

        let pending = self.inner.batch.len();
        if pending > 0 {
            tracing::warn!(pending, "Bus disposed with unflushed changes");
        } else {
            tracing::debug!("Bus disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl<T: Resource> Drop for SyncBus<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Resource> std::fmt::Debug for SyncBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBus")
            .field("pending", &self.pending_len())
            .field("auto_flush", &self.auto_flush())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
