//! Deferred report queue.
//!
//! An unbounded FIFO of single-use "emit" closures. Producers (application
//! code, sub-device callbacks, the BLE stack's event task) push without ever
//! blocking; the dispatcher is the only blocking consumer.
//!
//! ```text
//! ┌──────────────┐  push   ┌──────────────────┐  pop_blocking  ┌────────────┐
//! │ producers    │───────▶│ DeferredReport    │──────────────▶│ Dispatcher │
//! │ (any thread) │        │ Queue (FIFO)      │  try_pop       └────────────┘
//! └──────────────┘        │ + closed flag     │──────────────▶ flush()
//!                         └──────────────────┘
//! ```
//!
//! Closing the queue discards whatever is still queued and wakes the
//! consumer, which then observes the end signal.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log::debug;

/// One packaged send operation.
pub type DeferredReport = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    items: VecDeque<DeferredReport>,
    closed: bool,
}

pub struct DeferredReportQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl DeferredReportQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // Closures never run under the lock, so a poisoned mutex still guards
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append to the tail. Dropped if the queue is closed.
    pub fn push(&self, report: DeferredReport) {
        let mut state = self.lock();
        if state.closed {
            debug!("Deferred report dropped, queue closed");
            return;
        }
        state.items.push_back(report);
        drop(state);
        self.available.notify_one();
    }

    /// Remove the head, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop_blocking(&self) -> Option<DeferredReport> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(report) = state.items.pop_front() {
                return Some(report);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Remove the head if present; `None` when empty or closed.
    pub fn try_pop(&self) -> Option<DeferredReport> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.items.pop_front()
    }

    /// Mark closed, discard pending items and wake any waiting consumer.
    /// Idempotent.
    pub fn close(&self) {
        let discarded = {
            let mut state = self.lock();
            state.closed = true;
            core::mem::take(&mut state.items)
        };
        self.available.notify_all();
        if !discarded.is_empty() {
            debug!("Deferred queue closed, {} report(s) discarded", discarded.len());
        }
    }

    /// Accept items again after a `close()`.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl Default for DeferredReportQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable producer handle onto a [`DeferredReportQueue`].
#[derive(Clone)]
pub struct DeferredReports {
    queue: Arc<DeferredReportQueue>,
}

impl DeferredReports {
    pub(crate) fn new(queue: Arc<DeferredReportQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue `report` for deferred delivery. Never blocks.
    pub fn queue(&self, report: impl FnOnce() + Send + 'static) {
        self.queue.push(Box::new(report));
    }

    /// Reports waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
