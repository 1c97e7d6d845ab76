//! Chunk translation workers
//!
//! [`WorkerPool`] executes chunks against a [`ChunkProcessor`] with a global
//! concurrency limit, a per-job limit held in [`JobDispatch`], bounded retry
//! with exponential backoff and a deadline on every provider call.

pub mod pool;
pub mod processor;

pub use pool::{JobDispatch, WorkerPool};
pub use processor::{ChunkProcessor, ChunkRequest, ChunkTranslation, ProviderError, StubProcessor};

use crate::config::PipelineConfig;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_concurrency: usize,
    pub per_job_concurrency: usize,
    /// Total attempts per chunk, first try included
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub chunk_deadline_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
            per_job_concurrency: 4,
            max_attempts: 3,
            base_backoff_ms: 500,
            chunk_deadline_ms: 60_000,
        }
    }
}

impl From<&PipelineConfig> for WorkerSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            worker_concurrency: config.worker_concurrency,
            per_job_concurrency: config.per_job_concurrency,
            max_attempts: config.max_attempts,
            base_backoff_ms: config.base_backoff_ms,
            chunk_deadline_ms: config.chunk_deadline_ms,
        }
    }
}
