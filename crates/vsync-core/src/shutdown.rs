//! Process-exit notification
//!
//! The host owns one [`ShutdownSignal`] per process and fires it once on the
//! way out. Components subscribe at construction and unsubscribe when
//! disposed. Handlers run synchronously on the firing thread, so by the time
//! `fire()` returns every handler has finished.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::lock;

type Handler = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
    fired: AtomicBool,
}

/// Cloneable handle to a process-wide exit notification source
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("fired", &self.is_fired())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                fired: AtomicBool::new(false),
            }),
        }
    }

    /// Register a handler to run when the signal fires.
    ///
    /// Subscribing after the signal fired registers nothing; the returned
    /// subscription is inert.
    pub fn subscribe<F>(&self, handler: F) -> ShutdownSubscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut handlers = lock(&self.inner.handlers);
            if !self.is_fired() {
                handlers.push((id, Arc::new(handler)));
            }
        }
        ShutdownSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Fire the signal, running every handler before returning.
    ///
    /// Only the first call runs handlers; later calls return `false`.
    pub fn fire(&self) -> bool {
        let handlers = {
            let mut handlers = lock(&self.inner.handlers);
            if self.inner.fired.swap(true, Ordering::SeqCst) {
                return false;
            }
            std::mem::take(&mut *handlers)
        };

        tracing::debug!(handlers = handlers.len(), "Shutdown signal fired");
        for (_, handler) in handlers {
            handler();
        }
        true
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.inner.handlers).len()
    }
}

/// Registration of a shutdown handler; dropping it unsubscribes
#[must_use = "dropping a ShutdownSubscription unsubscribes the handler"]
#[derive(Debug)]
pub struct ShutdownSubscription {
    inner: Weak<Inner>,
    id: u64,
}

impl ShutdownSubscription {
    /// Unsubscribe now. Returns `false` if the handler was not registered
    /// (already removed, or the signal already fired).
    pub fn cancel(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        let inner = std::mem::take(&mut self.inner);
        let Some(inner) = inner.upgrade() else {
            return false;
        };
        let mut handlers = lock(&inner.handlers);
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        handlers.len() != before
    }
}

impl Drop for ShutdownSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
