//! Queue statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters, updated without taking the queue lock.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
    discarded: AtomicU64,
    started: AtomicU64,
    wait_micros: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self, waited: Duration) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.wait_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queued: usize, capacity: usize) -> QueueStats {
        let started = self.started.load(Ordering::Relaxed);
        let average_wait_ms = if started == 0 {
            0.0
        } else {
            self.wait_micros.load(Ordering::Relaxed) as f64 / started as f64 / 1000.0
        };

        QueueStats {
            queued,
            capacity,
            enqueued_total: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            average_wait_ms,
        }
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    /// Tasks currently waiting.
    pub queued: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Tasks accepted since creation.
    pub enqueued_total: u64,
    /// Tasks whose handler returned a value.
    pub completed: u64,
    /// Tasks whose handler returned an error or panicked.
    pub failed: u64,
    /// Enqueues refused because the queue was full or closed.
    pub rejected: u64,
    /// Tasks that finished after their caller stopped waiting.
    pub abandoned: u64,
    /// Tasks dropped at shutdown without running.
    pub discarded: u64,
    /// Mean time from enqueue to start of execution, in milliseconds.
    pub average_wait_ms: f64,
}

impl QueueStats {
    /// Mean time from enqueue to start of execution.
    pub fn average_wait(&self) -> Duration {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let micros = (self.average_wait_ms * 1000.0).round() as u64;
        Duration::from_micros(micros)
    }
}
