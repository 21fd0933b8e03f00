//! Pending batch: the write-behind staging area
//!
//! Appends and drains share one short critical section. `drain` swaps the
//! whole sequence for an empty one and returns the detached records, so the
//! caller persists them without holding the lock: a record appended while a
//! flush is writing lands in the fresh sequence and is picked up by the next
//! flush, never lost and never counted twice.

use std::mem;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::change::ChangeRecord;
use crate::lock;

/// Thread-safe, append-only, insertion-ordered sequence of change records
#[derive(Debug)]
pub struct PendingBatch<T> {
    records: Mutex<Vec<ChangeRecord<T>>>,
    closed: AtomicBool,
}

impl<T> Default for PendingBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingBatch<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a record.
    ///
    /// Returns `false` if the batch has been closed, in which case the record
    /// is discarded.
    pub fn append(&self, record: ChangeRecord<T>) -> bool {
        let mut records = lock(&self.records);
        // Checked under the lock so close() followed by drain() sees every
        // record accepted before it.
        if self.closed.load(Ordering::Acquire) {
            tracing::trace!(kind = %record.kind(), "Dropping change appended after close");
            return false;
        }
        records.push(record);
        true
    }

    /// Detach and return every record appended so far.
    pub fn drain(&self) -> Vec<ChangeRecord<T>> {
        mem::take(&mut *lock(&self.records))
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    /// Stop accepting appends. Records already queued stay drainable.
    pub fn close(&self) {
        let _records = lock(&self.records);
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
