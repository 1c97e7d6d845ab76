//! Observability (metrics, tracing)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_created: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    chunks_succeeded: AtomicU64,
    chunks_failed: AtomicU64,
    chunk_retries: AtomicU64,
    credits_reserved: AtomicU64,
    credits_returned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self, reserved: i64) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
        self.credits_reserved
            .fetch_add(reserved.max(0) as u64, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_created", reserved, "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_cancelled", "Metric incremented");
    }

    pub fn chunk_succeeded(&self) {
        self.chunks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_failed(&self) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "chunks_failed", "Metric incremented");
    }

    pub fn chunk_retry(&self) {
        self.chunk_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Credits handed back through ADJUST or REFUND entries
    pub fn credits_returned(&self, amount: i64) {
        self.credits_returned
            .fetch_add(amount.max(0) as u64, Ordering::Relaxed);
        tracing::debug!(counter = "credits_returned", amount, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            chunks_succeeded: self.chunks_succeeded.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            chunk_retries: self.chunk_retries.load(Ordering::Relaxed),
            credits_reserved: self.credits_reserved.load(Ordering::Relaxed),
            credits_returned: self.credits_returned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub chunks_succeeded: u64,
    pub chunks_failed: u64,
    pub chunk_retries: u64,
    pub credits_reserved: u64,
    pub credits_returned: u64,
}
