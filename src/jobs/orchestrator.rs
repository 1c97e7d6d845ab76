//! Job lifecycle: reservation, dispatch, progress aggregation and settlement

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::chunking::split_document;
use super::estimate::{capped_cost, cost_for_tokens, estimate_tokens};
use super::models::{
    ChunkOutcome, ChunkRecord, CreateJobRequest, JobStatus, Language, OutputFormat,
    TranslationJob,
};
use super::refund::{RefundEngine, RefundReason};
use super::store::JobStore;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::ledger::{LedgerStore, UserId};
use crate::observability::Metrics;
use crate::storage::StorageClient;
use crate::sync::KeyedLocks;
use crate::worker::{ChunkProcessor, ChunkRequest, JobDispatch, WorkerPool, WorkerSettings};

/// Separator placed between translated chunks in the assembled output
const CHUNK_SEPARATOR: &str = "\n\n";

const CANCELLED_BY_USER: &str = "cancelled by user";

/// Limits and pricing applied by the orchestrator
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub rate_per_thousand: u64,
    pub max_tokens_per_job: u64,
    pub max_chunks_per_job: u32,
    pub max_document_bytes: usize,
    pub max_chunk_chars: usize,
    pub failure_threshold_percent: u32,
    pub worker: WorkerSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            rate_per_thousand: config.billing.rate_per_thousand,
            max_tokens_per_job: config.billing.max_tokens_per_job,
            max_chunks_per_job: config.billing.max_chunks_per_job,
            max_document_bytes: config.server.max_document_bytes,
            max_chunk_chars: config.pipeline.max_chunk_chars,
            failure_threshold_percent: config.pipeline.failure_threshold_percent,
            worker: WorkerSettings::from(&config.pipeline),
        }
    }
}

/// Everything the orchestrator depends on, passed in at construction
#[derive(Clone)]
pub struct EngineContext {
    pub ledger: Arc<dyn LedgerStore>,
    pub jobs: Arc<dyn JobStore>,
    pub processor: Arc<dyn ChunkProcessor>,
    pub storage: Arc<StorageClient>,
    pub metrics: Arc<Metrics>,
    pub settings: EngineSettings,
}

/// Drives jobs from reservation to settlement
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Arc<dyn LedgerStore>,
    jobs: Arc<dyn JobStore>,
    storage: Arc<StorageClient>,
    metrics: Arc<Metrics>,
    settings: EngineSettings,
    refunds: RefundEngine,
    pool: WorkerPool,
    user_locks: KeyedLocks<UserId>,
    job_locks: KeyedLocks<Uuid>,
    dispatches: Mutex<HashMap<Uuid, Arc<JobDispatch>>>,
}

/// Validated job parameters
struct JobPlan {
    source_lang: Language,
    target_lang: Language,
    output_format: OutputFormat,
    token_est_in: u64,
    token_est_out: u64,
    cost: i64,
    chunks: Vec<String>,
}

fn source_key(job_id: &Uuid) -> String {
    format!("jobs/{}/source.txt", job_id)
}

fn chunk_key(job_id: &Uuid, index: u32) -> String {
    format!("jobs/{}/chunks/{:05}.txt", job_id, index)
}

fn output_key(job_id: &Uuid) -> String {
    format!("jobs/{}/output.txt", job_id)
}

impl JobOrchestrator {
    pub fn new(ctx: EngineContext) -> Self {
        let pool = WorkerPool::new(
            ctx.processor.clone(),
            ctx.settings.worker.clone(),
            ctx.metrics.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                refunds: RefundEngine::new(ctx.ledger.clone()),
                ledger: ctx.ledger,
                jobs: ctx.jobs,
                storage: ctx.storage,
                metrics: ctx.metrics,
                settings: ctx.settings,
                pool,
                user_locks: KeyedLocks::new(),
                job_locks: KeyedLocks::new(),
                dispatches: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn refunds(&self) -> &RefundEngine {
        &self.inner.refunds
    }

    /// Validate, price, reserve and start a job.
    ///
    /// Nothing is persisted when validation or the reservation fails. A
    /// repeated idempotency key returns the job created by the first call.
    pub async fn create_job(
        &self,
        user: &UserId,
        request: CreateJobRequest,
    ) -> Result<TranslationJob> {
        let plan = self.plan(&request)?;

        let _guard = self.inner.user_locks.lock(user).await;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(job_id) = self.inner.jobs.get_idempotent(user, key).await? {
                if let Some(job) = self.inner.jobs.get(job_id).await? {
                    info!(user = %user, %job_id, idempotency_key = key, "Create replayed");
                    return Ok(job);
                }
            }
        }

        let job_id = Uuid::now_v7();
        let reservation = self
            .inner
            .ledger
            .reserve(
                user,
                plan.cost,
                &job_id.to_string(),
                &format!("reserve:{}", job_id),
            )
            .await?;

        let now = chrono::Utc::now();
        let job = TranslationJob {
            id: job_id,
            user: user.clone(),
            source_lang: plan.source_lang,
            target_lang: plan.target_lang,
            output_format: plan.output_format,
            status: JobStatus::Pending,
            total_chunks: plan.chunks.len() as u32,
            processed_chunks: 0,
            failed_chunks: 0,
            token_est_in: plan.token_est_in,
            token_est_out: plan.token_est_out,
            token_act_in: None,
            token_act_out: None,
            reserved_amount: plan.cost,
            reservation_entry_id: Some(reservation),
            input_uri: self.inner.storage.uri_for(&source_key(&job_id)),
            output_uri: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        };

        let dispatch = Arc::new(JobDispatch::new(
            self.inner.settings.worker.per_job_concurrency,
        ));
        let running = match self
            .start(&job, &request, dispatch.clone())
            .await
        {
            Ok(running) => running,
            Err(e) => {
                self.abort_create(&job, &e).await;
                return Err(e);
            }
        };

        self.inner.metrics.job_created(plan.cost);
        info!(
            %job_id,
            user = %user,
            reserved = plan.cost,
            chunks = running.total_chunks,
            "Job created"
        );

        let chunks = plan
            .chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| (index as u32, text))
            .collect();
        self.dispatch_chunks(&running, chunks, &dispatch);
        Ok(running)
    }

    fn plan(&self, request: &CreateJobRequest) -> Result<JobPlan> {
        let settings = &self.inner.settings;

        let source_lang: Language = request
            .source_lang
            .parse()
            .map_err(EngineError::Validation)?;
        let target_lang: Language = request
            .target_lang
            .parse()
            .map_err(EngineError::Validation)?;
        if source_lang == target_lang {
            return Err(EngineError::Validation(format!(
                "source and target language are both '{source_lang}'"
            )));
        }
        let output_format: OutputFormat = request
            .output_format
            .parse()
            .map_err(EngineError::Validation)?;

        if request.document.trim().is_empty() {
            return Err(EngineError::Validation("document is empty".to_string()));
        }
        if request.document.len() > settings.max_document_bytes {
            return Err(EngineError::Validation(format!(
                "document is {} bytes, limit is {}",
                request.document.len(),
                settings.max_document_bytes
            )));
        }

        let estimate = estimate_tokens(&request.document);
        if estimate.total() > settings.max_tokens_per_job {
            return Err(EngineError::Validation(format!(
                "estimated {} tokens, limit is {}",
                estimate.total(),
                settings.max_tokens_per_job
            )));
        }

        let chunks = split_document(&request.document, settings.max_chunk_chars);
        if chunks.len() > settings.max_chunks_per_job as usize {
            return Err(EngineError::Validation(format!(
                "document splits into {} chunks, limit is {}",
                chunks.len(),
                settings.max_chunks_per_job
            )));
        }

        Ok(JobPlan {
            source_lang,
            target_lang,
            output_format,
            token_est_in: estimate.tokens_in,
            token_est_out: estimate.tokens_out,
            cost: cost_for_tokens(estimate.total(), settings.rate_per_thousand),
            chunks,
        })
    }

    /// Persist the source and the job row, then move it to RUNNING
    async fn start(
        &self,
        job: &TranslationJob,
        request: &CreateJobRequest,
        dispatch: Arc<JobDispatch>,
    ) -> Result<TranslationJob> {
        self.inner
            .storage
            .put(&source_key(&job.id), request.document.clone().into_bytes())
            .await?;
        self.inner.jobs.insert(job).await?;
        if let Some(key) = request.idempotency_key.as_deref() {
            self.inner
                .jobs
                .remember_idempotency(&job.user, key, job.id)
                .await?;
        }

        self.register(job.id, dispatch);
        let mut running = job.clone();
        running.status = JobStatus::Running;
        Ok(self.inner.jobs.update(&running).await?)
    }

    /// Undo a create that failed after its reservation
    async fn abort_create(&self, job: &TranslationJob, cause: impl fmt::Display) {
        error!(job_id = %job.id, user = %job.user, error = %cause, "Job creation aborted");

        if let Some(dispatch) = self.unregister(&job.id) {
            dispatch.halt();
        }
        if let Err(e) = self
            .inner
            .refunds
            .issue(job, job.reserved_amount, RefundReason::CreateAborted)
            .await
        {
            error!(job_id = %job.id, error = %e, "Failed to refund aborted job");
        }

        // Leave no PENDING row behind
        if let Ok(Some(stored)) = self.inner.jobs.get(job.id).await {
            if stored.status == JobStatus::Pending {
                let mut failed = stored;
                failed.status = JobStatus::Failed;
                failed.error_message = Some(format!("creation aborted: {cause}"));
                failed.completed_at = Some(chrono::Utc::now());
                if let Err(e) = self.inner.jobs.update(&failed).await {
                    error!(job_id = %job.id, error = %e, "Failed to mark aborted job");
                }
            }
        }
    }

    fn dispatch_chunks(
        &self,
        job: &TranslationJob,
        chunks: Vec<(u32, String)>,
        dispatch: &Arc<JobDispatch>,
    ) {
        for (index, text) in chunks {
            let request = ChunkRequest {
                job_id: job.id,
                chunk_index: index,
                text,
                source_lang: job.source_lang,
                target_lang: job.target_lang,
            };
            let this = self.clone();
            let task_dispatch = dispatch.clone();

            let handle = tokio::spawn(async move {
                let job_id = request.job_id;
                let chunk_index = request.chunk_index;
                let Some(outcome) = this.inner.pool.run(&task_dispatch, request).await else {
                    return;
                };

                if let Err(e) = this.process_chunk(job_id, chunk_index, outcome).await {
                    error!(%job_id, chunk_index, error = %e, "Failed to record chunk outcome");
                    let message = format!("chunk {chunk_index} could not be recorded: {e}");
                    if let Err(e) = this.fail_job(job_id, message).await {
                        error!(%job_id, error = %e, "Failed to fail job");
                    }
                }
            });
            dispatch.track(handle);
        }
    }

    /// Record the terminal outcome of one chunk.
    ///
    /// Idempotent per `(job_id, chunk_index)`: a repeated report changes
    /// nothing. Reports for jobs already in a terminal state are ignored and
    /// the current snapshot is returned.
    pub async fn process_chunk(
        &self,
        job_id: Uuid,
        chunk_index: u32,
        outcome: ChunkOutcome,
    ) -> Result<TranslationJob> {
        let _guard = self.inner.job_locks.lock(&job_id).await;
        let job = self.load(job_id).await?;

        if chunk_index >= job.total_chunks {
            return Err(EngineError::Validation(format!(
                "chunk {chunk_index} out of range for job with {} chunks",
                job.total_chunks
            )));
        }
        if job.status.is_terminal() {
            debug!(%job_id, chunk_index, status = %job.status, "Late chunk report ignored");
            return Ok(job);
        }
        if job.status != JobStatus::Running {
            return Err(EngineError::InvalidTransition {
                from: job.status,
                to: JobStatus::Running,
            });
        }
        if self
            .inner
            .jobs
            .chunk_record(job_id, chunk_index)
            .await?
            .is_some()
        {
            debug!(%job_id, chunk_index, "Duplicate chunk report");
            return self.settle_if_ready(job).await;
        }

        let mut next = job.clone();
        let record = match outcome {
            ChunkOutcome::Succeeded {
                translated_text,
                tokens_in,
                tokens_out,
            } => {
                let uri = self
                    .inner
                    .storage
                    .put(&chunk_key(&job_id, chunk_index), translated_text.into_bytes())
                    .await?;
                next.processed_chunks += 1;
                ChunkRecord {
                    job_id,
                    index: chunk_index,
                    succeeded: true,
                    tokens_in,
                    tokens_out,
                    output_uri: Some(uri),
                    error: None,
                    recorded_at: chrono::Utc::now(),
                }
            }
            ChunkOutcome::Failed { error } => {
                let error = EngineError::from(error);
                warn!(%job_id, chunk_index, error = %error, "Chunk failed");
                next.failed_chunks += 1;
                ChunkRecord {
                    job_id,
                    index: chunk_index,
                    succeeded: false,
                    tokens_in: 0,
                    tokens_out: 0,
                    output_uri: None,
                    error: Some(error.to_string()),
                    recorded_at: chrono::Utc::now(),
                }
            }
        };

        let Some(stored) = self.inner.jobs.record_chunk(&next, &record).await? else {
            return self.settle_if_ready(job).await;
        };
        if record.succeeded {
            self.inner.metrics.chunk_succeeded();
        } else {
            self.inner.metrics.chunk_failed();
        }
        debug!(
            %job_id,
            chunk_index,
            processed = stored.processed_chunks,
            failed = stored.failed_chunks,
            total = stored.total_chunks,
            "Chunk recorded"
        );

        self.settle_if_ready(stored).await
    }

    /// Finish a RUNNING job whose outcome is decided. Caller holds the job lock.
    async fn settle_if_ready(&self, job: TranslationJob) -> Result<TranslationJob> {
        if job.status != JobStatus::Running {
            return Ok(job);
        }

        let threshold = self.inner.settings.failure_threshold_percent as u64;
        if job.failed_chunks as u64 * 100 > job.total_chunks as u64 * threshold {
            let message = format!(
                "{} of {} chunks failed",
                job.failed_chunks, job.total_chunks
            );
            return self.finish(job, JobStatus::Failed, Some(message)).await;
        }
        if job.unreported_chunks() > 0 {
            return Ok(job);
        }
        if job.failed_chunks > 0 {
            let message = format!(
                "{} of {} chunks failed",
                job.failed_chunks, job.total_chunks
            );
            return self.finish(job, JobStatus::Failed, Some(message)).await;
        }
        self.finish(job, JobStatus::Completed, None).await
    }

    /// Move a job to a terminal state and return its unconsumed credit.
    ///
    /// The credit is returned before the status write; both steps are safe
    /// to repeat if the status write fails. A job whose cancel refund is
    /// already in the ledger always settles as CANCELLED.
    async fn finish(
        &self,
        job: TranslationJob,
        status: JobStatus,
        message: Option<String>,
    ) -> Result<TranslationJob> {
        let (status, message) = if status != JobStatus::Cancelled
            && self.cancel_interrupted(&job).await?
        {
            warn!(job_id = %job.id, requested = %status, "Finishing an interrupted cancel");
            (JobStatus::Cancelled, Some(CANCELLED_BY_USER.to_string()))
        } else {
            (status, message)
        };
        if !job.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: job.status,
                to: status,
            });
        }

        let records = self.inner.jobs.chunk_records(job.id).await?;
        let (tokens_in, tokens_out) = records
            .iter()
            .filter(|r| r.succeeded)
            .fold((0u64, 0u64), |(i, o), r| {
                (i.saturating_add(r.tokens_in), o.saturating_add(r.tokens_out))
            });
        let actual_cost = capped_cost(
            tokens_in.saturating_add(tokens_out),
            self.inner.settings.rate_per_thousand,
            job.reserved_amount,
        );

        let mut next = job.clone();
        let (amount, reason) = match status {
            JobStatus::Completed => {
                next.output_uri = Some(self.assemble_output(&job, &records).await?);
                (
                    job.reserved_amount - actual_cost,
                    RefundReason::CompletionAdjustment,
                )
            }
            JobStatus::Cancelled => {
                let unprocessed = job.unprocessed_chunks() as i64;
                let total = (job.total_chunks as i64).max(1);
                (
                    job.reserved_amount * unprocessed / total,
                    RefundReason::Cancelled,
                )
            }
            _ => (job.reserved_amount - actual_cost, RefundReason::JobFailed),
        };

        self.inner.refunds.issue(&job, amount, reason).await?;

        if let Some(dispatch) = self.unregister(&job.id) {
            dispatch.halt();
        }

        next.status = status;
        next.token_act_in = Some(tokens_in);
        next.token_act_out = Some(tokens_out);
        next.error_message = message;
        next.completed_at = Some(chrono::Utc::now());
        let stored = self.inner.jobs.update(&next).await?;

        self.inner.metrics.credits_returned(amount);
        match status {
            JobStatus::Completed => self.inner.metrics.job_completed(),
            JobStatus::Cancelled => self.inner.metrics.job_cancelled(),
            _ => self.inner.metrics.job_failed(),
        }
        info!(
            job_id = %job.id,
            user = %job.user,
            status = %status,
            reserved = job.reserved_amount,
            returned = amount.max(0),
            tokens_in,
            tokens_out,
            "Job settled"
        );
        Ok(stored)
    }

    /// Whether a cancel returned credit but never wrote its status
    async fn cancel_interrupted(&self, job: &TranslationJob) -> Result<bool> {
        let key = RefundEngine::idempotency_key(&job.id, RefundReason::Cancelled);
        Ok(self.inner.ledger.find_by_idempotency_key(&key).await?.is_some())
    }

    async fn assemble_output(&self, job: &TranslationJob, records: &[ChunkRecord]) -> Result<String> {
        let mut parts = Vec::with_capacity(records.len());
        for record in records {
            let uri = record.output_uri.as_deref().ok_or_else(|| {
                EngineError::Storage(format!("chunk {} has no stored output", record.index))
            })?;
            let bytes = self.inner.storage.get(uri).await?;
            parts.push(String::from_utf8_lossy(&bytes).into_owned());
        }

        let output = parts.join(CHUNK_SEPARATOR);
        Ok(self
            .inner
            .storage
            .put(&output_key(&job.id), output.into_bytes())
            .await?)
    }

    /// Fail a job after a non-provider error, refunding unconsumed credit
    pub async fn fail_job(&self, job_id: Uuid, message: String) -> Result<TranslationJob> {
        let _guard = self.inner.job_locks.lock(&job_id).await;
        let job = self.load(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        self.finish(job, JobStatus::Failed, Some(message)).await
    }

    /// Cancel a RUNNING job.
    ///
    /// Stops further dispatch, waits for in-flight chunks to be recorded, then
    /// refunds `floor(reserved * unprocessed / total)`. Fails with
    /// `InvalidTransition` if the job is not RUNNING, including when it
    /// reached a terminal state while draining.
    pub async fn cancel(&self, job_id: Uuid) -> Result<TranslationJob> {
        let dispatch = {
            let _guard = self.inner.job_locks.lock(&job_id).await;
            let job = self.load(job_id).await?;
            if !job.status.can_transition_to(JobStatus::Cancelled) {
                return Err(EngineError::InvalidTransition {
                    from: job.status,
                    to: JobStatus::Cancelled,
                });
            }
            let dispatch = self.dispatch_for(&job_id);
            if let Some(dispatch) = &dispatch {
                dispatch.halt();
            }
            dispatch
        };

        info!(%job_id, "Cancelling job");
        if let Some(dispatch) = dispatch {
            dispatch.drain().await;
        }

        let _guard = self.inner.job_locks.lock(&job_id).await;
        let job = self.load(job_id).await?;
        if !job.status.can_transition_to(JobStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                from: job.status,
                to: JobStatus::Cancelled,
            });
        }
        self.finish(job, JobStatus::Cancelled, Some(CANCELLED_BY_USER.to_string()))
            .await
    }

    /// Pick up jobs a previous process left unfinished.
    ///
    /// PENDING jobs never started and are aborted with a full refund.
    /// RUNNING jobs get their unreported chunks dispatched again from the
    /// stored source; a job that cannot be resumed is failed and refunded.
    /// Returns the number of jobs handled.
    pub async fn recover(&self) -> Result<usize> {
        let mut handled = 0;
        for job in self.inner.jobs.unfinished().await? {
            match job.status {
                JobStatus::Pending => {
                    self.abort_create(&job, "interrupted before start").await;
                }
                JobStatus::Running if self.dispatch_for(&job.id).is_none() => {
                    if let Err(e) = self.resume(job.id).await {
                        warn!(job_id = %job.id, error = %e, "Could not resume job");
                        let message = format!("could not resume after restart: {e}");
                        if let Err(e) = self.fail_job(job.id, message).await {
                            error!(job_id = %job.id, error = %e, "Failed to fail job");
                            continue;
                        }
                    }
                }
                _ => continue,
            }
            handled += 1;
        }

        if handled > 0 {
            info!(jobs = handled, "Recovered unfinished jobs");
        }
        Ok(handled)
    }

    /// Re-dispatch the chunks of a RUNNING job that have no marker yet
    async fn resume(&self, job_id: Uuid) -> Result<TranslationJob> {
        let _guard = self.inner.job_locks.lock(&job_id).await;
        let job = self.load(job_id).await?;
        if job.status != JobStatus::Running {
            return Ok(job);
        }
        if self.cancel_interrupted(&job).await? {
            return self
                .finish(job, JobStatus::Cancelled, Some(CANCELLED_BY_USER.to_string()))
                .await;
        }
        let job = self.settle_if_ready(job).await?;
        if job.status != JobStatus::Running {
            return Ok(job);
        }

        let bytes = self.inner.storage.get(&job.input_uri).await?;
        let source = String::from_utf8(bytes)
            .map_err(|e| EngineError::Storage(format!("source of job {job_id}: {e}")))?;
        let chunks = split_document(&source, self.inner.settings.max_chunk_chars);
        if chunks.len() != job.total_chunks as usize {
            return Err(EngineError::Validation(format!(
                "source splits into {} chunks, job has {}",
                chunks.len(),
                job.total_chunks
            )));
        }

        let reported: HashSet<u32> = self
            .inner
            .jobs
            .chunk_records(job_id)
            .await?
            .iter()
            .map(|record| record.index)
            .collect();
        let remaining: Vec<(u32, String)> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| (index as u32, text))
            .filter(|(index, _)| !reported.contains(index))
            .collect();

        let dispatch = Arc::new(JobDispatch::new(
            self.inner.settings.worker.per_job_concurrency,
        ));
        self.register(job_id, dispatch.clone());
        info!(%job_id, remaining = remaining.len(), "Resuming job");
        self.dispatch_chunks(&job, remaining, &dispatch);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<TranslationJob> {
        self.load(job_id).await
    }

    /// Like [`get_job`](Self::get_job) but hides other users' jobs
    pub async fn get_job_for_user(&self, user: &UserId, job_id: Uuid) -> Result<TranslationJob> {
        let job = self.load(job_id).await?;
        if &job.user != user {
            return Err(EngineError::NotFound(format!("job {job_id}")));
        }
        Ok(job)
    }

    /// Assembled translation of a COMPLETED job
    pub async fn download_output(
        &self,
        user: &UserId,
        job_id: Uuid,
    ) -> Result<(TranslationJob, Vec<u8>)> {
        let job = self.get_job_for_user(user, job_id).await?;
        let uri = match (job.status, job.output_uri.as_deref()) {
            (JobStatus::Completed, Some(uri)) => uri.to_string(),
            _ => return Err(EngineError::NotFound(format!("output of job {job_id}"))),
        };
        let bytes = self.inner.storage.get(&uri).await?;
        Ok((job, bytes))
    }

    async fn load(&self, job_id: Uuid) -> Result<TranslationJob> {
        self.inner
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))
    }

    fn register(&self, job_id: Uuid, dispatch: Arc<JobDispatch>) {
        self.inner
            .dispatches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, dispatch);
    }

    fn unregister(&self, job_id: &Uuid) -> Option<Arc<JobDispatch>> {
        self.inner
            .dispatches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id)
    }

    fn dispatch_for(&self, job_id: &Uuid) -> Option<Arc<JobDispatch>> {
        self.inner
            .dispatches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
    }

    /// Jobs with chunk tasks still registered
    pub fn active_jobs(&self) -> usize {
        self.inner
            .dispatches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Current balance of `user`
    pub async fn balance(&self, user: &UserId) -> Result<i64> {
        Ok(self.inner.ledger.balance(user).await?)
    }
}
