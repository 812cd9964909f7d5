#![forbid(unsafe_code)]

// Fleet metrics: lock-free AtomicU64 counters shared by every session task.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

/// Fleet-wide counters. Cheap to clone; every clone points at the same atomics.
#[derive(Clone, Default)]
pub struct FleetMetrics {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    // Monotonic counters
    established: AtomicU64,
    failed: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,

    // Gauge
    active: AtomicU64,
}

/// Point-in-time copy of all five counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub established: u64,
    pub failed: u64,
    pub active: u64,
    pub messages_received: u64,
    pub errors: u64,
}

impl FleetMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Counter increments ---

    pub fn record_established(&self) {
        self.inner.established.fetch_add(1, Relaxed);
    }

    /// A session that never reached Active. Counts as both a failure and an error.
    pub fn record_failure(&self) {
        self.inner.failed.fetch_add(1, Relaxed);
        self.inner.errors.fetch_add(1, Relaxed);
    }

    /// A session the coordinator had to abort after the shutdown grace period.
    pub fn record_abandoned(&self) {
        self.inner.failed.fetch_add(1, Relaxed);
    }

    pub fn record_message(&self) {
        self.inner.messages_received.fetch_add(1, Relaxed);
    }

    pub fn record_error(&self) {
        self.inner.errors.fetch_add(1, Relaxed);
    }

    // --- Gauge ---

    /// Increments `active` and returns an RAII guard that decrements on drop.
    /// The slot is released exactly once whether the session closes, fails,
    /// panics or is aborted.
    pub fn active_guard(&self) -> ActiveGuard {
        self.inner.active.fetch_add(1, Relaxed);
        ActiveGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn active(&self) -> u64 {
        self.inner.active.load(Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let i = &self.inner;
        MetricsSnapshot {
            established: i.established.load(Relaxed),
            failed: i.failed.load(Relaxed),
            active: i.active.load(Relaxed),
            messages_received: i.messages_received.load(Relaxed),
            errors: i.errors.load(Relaxed),
        }
    }
}

/// RAII guard that decrements `active` on drop.
pub struct ActiveGuard {
    inner: Arc<Inner>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Relaxed);
    }
}
