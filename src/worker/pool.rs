//! Bounded chunk execution with retry, deadline and cancellation

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::WorkerSettings;
use super::processor::{ChunkProcessor, ChunkRequest, ProviderError};
use crate::jobs::models::ChunkOutcome;
use crate::observability::Metrics;

/// Per-job dispatch state: concurrency cap, halt signal and in-flight tasks
pub struct JobDispatch {
    limiter: Arc<Semaphore>,
    halted: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JobDispatch {
    pub fn new(per_job_concurrency: usize) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(per_job_concurrency.max(1))),
            halted: watch::Sender::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Stop scheduling attempts. Queued chunks are dropped; running
    /// attempts finish but are not retried.
    pub fn halt(&self) {
        self.halted.send_replace(true);
        self.limiter.close();
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.borrow()
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Await every tracked task, including ones tracked while draining
    pub async fn drain(&self) {
        loop {
            let handles =
                std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Chunk task ended abnormally");
                }
            }
        }
    }

    /// Sleep for `duration` unless halted first
    async fn pause(&self, duration: Duration) {
        let mut halted = self.halted.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = halted.wait_for(|h| *h) => {}
        }
    }
}

/// Runs chunk translations under a global concurrency limit
#[derive(Clone)]
pub struct WorkerPool {
    processor: Arc<dyn ChunkProcessor>,
    permits: Arc<Semaphore>,
    settings: WorkerSettings,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    pub fn new(
        processor: Arc<dyn ChunkProcessor>,
        settings: WorkerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            processor,
            permits: Arc::new(Semaphore::new(settings.worker_concurrency.max(1))),
            settings,
            metrics,
        }
    }

    /// Translate one chunk to a terminal outcome.
    ///
    /// Returns `None` when the job was halted before an outcome was reached;
    /// nothing must be recorded for the chunk in that case.
    pub async fn run(&self, dispatch: &JobDispatch, request: ChunkRequest) -> Option<ChunkOutcome> {
        let _job_permit = dispatch.limiter.clone().acquire_owned().await.ok()?;
        let _permit = self.permits.clone().acquire_owned().await.ok()?;
        self.execute(dispatch, &request).await
    }

    async fn execute(&self, dispatch: &JobDispatch, request: &ChunkRequest) -> Option<ChunkOutcome> {
        let max_attempts = self.settings.max_attempts.max(1);
        let deadline = Duration::from_millis(self.settings.chunk_deadline_ms);
        let mut attempts = 0;

        loop {
            if dispatch.is_halted() {
                debug!(
                    job_id = %request.job_id,
                    chunk_index = request.chunk_index,
                    attempts,
                    "Chunk abandoned"
                );
                return None;
            }
            attempts += 1;

            let result = match tokio::time::timeout(deadline, self.processor.process(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transient(format!(
                    "deadline of {}ms exceeded",
                    self.settings.chunk_deadline_ms
                ))),
            };

            match result {
                Ok(translation) => {
                    if attempts > 1 {
                        debug!(
                            job_id = %request.job_id,
                            chunk_index = request.chunk_index,
                            attempts,
                            "Chunk succeeded after retry"
                        );
                    }
                    return Some(ChunkOutcome::Succeeded {
                        translated_text: translation.translated_text,
                        tokens_in: translation.tokens_in,
                        tokens_out: translation.tokens_out,
                    });
                }
                Err(error @ ProviderError::Permanent(_)) => {
                    warn!(
                        job_id = %request.job_id,
                        chunk_index = request.chunk_index,
                        error = %error,
                        "Chunk rejected by provider"
                    );
                    return Some(ChunkOutcome::Failed { error });
                }
                Err(ProviderError::Transient(reason)) => {
                    if attempts >= max_attempts {
                        warn!(
                            job_id = %request.job_id,
                            chunk_index = request.chunk_index,
                            attempts,
                            error = %reason,
                            "Chunk failed after retries"
                        );
                        return Some(ChunkOutcome::Failed {
                            error: ProviderError::Transient(format!(
                                "failed after {attempts} attempts: {reason}"
                            )),
                        });
                    }

                    self.metrics.chunk_retry();
                    let backoff = self.backoff(attempts);
                    warn!(
                        job_id = %request.job_id,
                        chunk_index = request.chunk_index,
                        attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %reason,
                        "Chunk failed, retrying"
                    );
                    dispatch.pause(backoff).await;
                }
            }
        }
    }

    /// `base * 2^(attempt - 1)`
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.settings.base_backoff_ms.saturating_mul(factor))
    }
}
