//! Thread-safe bounded FIFO queue with acknowledgment-based statistics.
//!
//! `insert` blocks producers at capacity (backpressure against an
//! unthrottled database iterator); `get` blocks consumers when empty. Items
//! are delivered at most once. Counters are atomic and never reset: callers
//! compute deltas by snapshotting [`WorkQueue::stats`] at two points in
//! time. The mutex protects only the deque; it is never held across the
//! worker's external action.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{trace, warn};

/// Errors returned by queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been shut down; no further inserts are accepted.
    #[error("queue is shut down")]
    Closed,
    /// Non-blocking insert found the queue at capacity.
    #[error("queue is full ({capacity} items)")]
    Full {
        /// The configured capacity.
        capacity: usize,
    },
}

/// Non-destructive snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items currently waiting in the queue.
    pub queued: u64,
    /// Items claimed by a worker but not yet acknowledged.
    pub in_flight: u64,
    /// Total items ever inserted.
    pub submitted: u64,
    /// Per-outcome-code acknowledgment counters.
    pub outcomes: Vec<u64>,
    /// Free-form feedback accumulators (caller-defined meaning).
    pub feedback: Vec<u64>,
}

impl QueueStats {
    /// Sum of all outcome counters, i.e. total acknowledged items.
    pub fn total_acked(&self) -> u64 {
        self.outcomes.iter().sum()
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-producer/multi-consumer work queue.
///
/// `nb_outcomes` and `nb_feedback` fix the width of the acknowledgment
/// counter arrays at creation; outcome codes index into the first array.
pub struct WorkQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    in_flight: AtomicU64,
    submitted: AtomicU64,
    outcomes: Vec<AtomicU64>,
    feedback: Vec<AtomicU64>,
}

impl<T> WorkQueue<T> {
    /// Creates a queue with the given capacity and counter widths.
    ///
    /// Counters start at zero and are never reset for the lifetime of the
    /// queue.
    pub fn new(capacity: usize, nb_outcomes: usize, nb_feedback: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            in_flight: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            outcomes: (0..nb_outcomes).map(|_| AtomicU64::new(0)).collect(),
            feedback: (0..nb_feedback).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Inserts an item, blocking while the queue is at capacity.
    ///
    /// FIFO order is preserved across a single queue instance. Fails with
    /// [`QueueError::Closed`] if the queue was shut down before a slot
    /// opened; the caller keeps ownership of nothing — the item is returned
    /// to the heap when dropped with the error.
    pub fn insert(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        while inner.items.len() >= self.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.items.push_back(item);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        trace!(queued = inner.items.len(), "item inserted");
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Inserts without blocking; fails with [`QueueError::Full`] at
    /// capacity. Queue state is unchanged on failure.
    pub fn try_insert(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.items.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        inner.items.push_back(item);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is shut down and drained. Ownership of
    /// the item transfers to the caller; the item counts as in-flight until
    /// the caller acknowledges it.
    pub fn get(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                drop(inner);
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Records the outcome of a completed item.
    ///
    /// `outcome_code` indexes the outcome counter array; `feedback` is added
    /// element-wise to the accumulators (excess elements are ignored). Call
    /// exactly once per item returned by [`WorkQueue::get`].
    pub fn acknowledge(&self, outcome_code: usize, feedback: &[u64]) {
        debug_assert!(
            outcome_code < self.outcomes.len(),
            "outcome code {outcome_code} out of range"
        );
        match self.outcomes.get(outcome_code) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                warn!(outcome_code, "acknowledge with out-of-range outcome code");
            }
        }
        for (slot, value) in self.feedback.iter().zip(feedback) {
            slot.fetch_add(*value, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Snapshot of current counters. Never mutates or resets anything.
    pub fn stats(&self) -> QueueStats {
        let queued = self.inner.lock().items.len() as u64;
        QueueStats {
            queued,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            outcomes: self
                .outcomes
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            feedback: self
                .feedback
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }

    /// Shuts the queue down: blocked producers fail with `Closed`, and
    /// consumers drain remaining items before `get` returns `None`.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
