use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{ChunkRecord, TranslationJob};
use crate::ledger::UserId;

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("version conflict on job {job_id}: expected {expected}, found {found}")]
    VersionConflict {
        job_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, JobStoreError>;

/// Repository for job rows, chunk markers and create-idempotency keys
///
/// Reads return owned snapshots; nothing is loaded lazily.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new row; fails if the id is taken
    async fn insert(&self, job: &TranslationJob) -> Result<()>;

    async fn get(&self, job_id: Uuid) -> Result<Option<TranslationJob>>;

    /// Jobs not yet in a terminal state, oldest first
    async fn unfinished(&self) -> Result<Vec<TranslationJob>>;

    /// Compare-and-swap write. Succeeds only if the stored row is still at
    /// `job.version`; the returned row carries the bumped version.
    async fn update(&self, job: &TranslationJob) -> Result<TranslationJob>;

    /// Write a chunk marker together with the job row (compare-and-swap, as
    /// in [`update`](Self::update)) in one atomic batch. Returns `None`
    /// without writing anything if the chunk already has a marker.
    async fn record_chunk(
        &self,
        job: &TranslationJob,
        record: &ChunkRecord,
    ) -> Result<Option<TranslationJob>>;

    async fn chunk_record(&self, job_id: Uuid, index: u32) -> Result<Option<ChunkRecord>>;

    /// All markers of a job in chunk order
    async fn chunk_records(&self, job_id: Uuid) -> Result<Vec<ChunkRecord>>;

    async fn remember_idempotency(&self, user: &UserId, key: &str, job_id: Uuid) -> Result<()>;

    async fn get_idempotent(&self, user: &UserId, key: &str) -> Result<Option<Uuid>>;
}

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &Uuid) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Encode a chunk marker key: chunk:{job_id}:{index:08}
pub fn encode_chunk_key(job_id: &Uuid, index: u32) -> Vec<u8> {
    format!("chunk:{}:{:08}", job_id, index).into_bytes()
}

/// Encode a job's chunk prefix: chunk:{job_id}:
pub fn encode_chunk_prefix(job_id: &Uuid) -> Vec<u8> {
    format!("chunk:{}:", job_id).into_bytes()
}

/// Encode a create-idempotency key: idem:{user}:{key}
///
/// The user id is length-prefixed so distinct (user, key) pairs never collide.
pub fn encode_job_idem_key(user: &UserId, key: &str) -> Vec<u8> {
    format!("idem:{}:{}:{}", user.as_str().len(), user.as_str(), key).into_bytes()
}

/// Fjall-backed job repository
#[derive(Clone)]
pub struct FjallJobStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    chunks: PartitionHandle,
    idempotency: PartitionHandle,
    // Serializes read-check-write sequences (CAS, marker insert)
    write_lock: Arc<Mutex<()>>,
}

impl FjallJobStore {
    /// Open the job partitions inside an existing keyspace
    pub fn with_keyspace(keyspace: &Keyspace) -> Result<Self> {
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let chunks = keyspace.open_partition("chunks", PartitionCreateOptions::default())?;
        let idempotency = keyspace.open_partition("job_idem", PartitionCreateOptions::default())?;

        info!("Job store opened");
        Ok(Self {
            keyspace: keyspace.clone(),
            jobs,
            chunks,
            idempotency,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn read_job(&self, job_id: &Uuid) -> Result<Option<TranslationJob>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Check the stored version and build the next row. Caller holds `write_lock`.
    fn next_version(&self, job: &TranslationJob) -> Result<TranslationJob> {
        let stored = self
            .read_job(&job.id)?
            .ok_or(JobStoreError::JobNotFound(job.id))?;

        if stored.version != job.version {
            return Err(JobStoreError::VersionConflict {
                job_id: job.id,
                expected: job.version,
                found: stored.version,
            });
        }

        let mut next = job.clone();
        next.version += 1;
        next.updated_at = chrono::Utc::now();
        Ok(next)
    }
}

#[async_trait]
impl JobStore for FjallJobStore {
    async fn insert(&self, job: &TranslationJob) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.read_job(&job.id)?.is_some() {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        self.jobs
            .insert(encode_job_key(&job.id), serde_json::to_vec(job)?)?;
        debug!(job_id = %job.id, status = %job.status, "Inserted job");
        Ok(())
    }

    async fn unfinished(&self) -> Result<Vec<TranslationJob>> {
        let mut out = Vec::new();
        for item in self.jobs.prefix("job:") {
            let (_, value) = item?;
            let job: TranslationJob = serde_json::from_slice(&value)?;
            if !job.status.is_terminal() {
                out.push(job);
            }
        }
        // v7 ids sort by creation time
        out.sort_by_key(|job| job.id);
        Ok(out)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<TranslationJob>> {
        self.read_job(&job_id)
    }

    async fn update(&self, job: &TranslationJob) -> Result<TranslationJob> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let next = self.next_version(job)?;
        self.jobs
            .insert(encode_job_key(&next.id), serde_json::to_vec(&next)?)?;
        debug!(job_id = %next.id, status = %next.status, version = next.version, "Updated job");
        Ok(next)
    }

    async fn record_chunk(
        &self,
        job: &TranslationJob,
        record: &ChunkRecord,
    ) -> Result<Option<TranslationJob>> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let chunk_key = encode_chunk_key(&record.job_id, record.index);
        if self.chunks.get(&chunk_key)?.is_some() {
            return Ok(None);
        }

        let next = self.next_version(job)?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.chunks, chunk_key, serde_json::to_vec(record)?);
        batch.insert(&self.jobs, encode_job_key(&next.id), serde_json::to_vec(&next)?);
        batch.commit()?;

        debug!(
            job_id = %next.id,
            chunk_index = record.index,
            succeeded = record.succeeded,
            version = next.version,
            "Recorded chunk"
        );
        Ok(Some(next))
    }

    async fn chunk_record(&self, job_id: Uuid, index: u32) -> Result<Option<ChunkRecord>> {
        match self.chunks.get(encode_chunk_key(&job_id, index))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn chunk_records(&self, job_id: Uuid) -> Result<Vec<ChunkRecord>> {
        let mut records = Vec::new();
        for item in self.chunks.prefix(encode_chunk_prefix(&job_id)) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    async fn remember_idempotency(&self, user: &UserId, key: &str, job_id: Uuid) -> Result<()> {
        self.idempotency
            .insert(encode_job_idem_key(user, key), job_id.to_string().into_bytes())?;
        debug!(user = %user, key, %job_id, "Remembered idempotency");
        Ok(())
    }

    async fn get_idempotent(&self, user: &UserId, key: &str) -> Result<Option<Uuid>> {
        match self.idempotency.get(encode_job_idem_key(user, key))? {
            Some(value) => {
                let raw = String::from_utf8_lossy(&value).to_string();
                let job_id = Uuid::parse_str(&raw)
                    .map_err(|_| JobStoreError::InvalidValue(raw.clone()))?;
                Ok(Some(job_id))
            }
            None => Ok(None),
        }
    }
}
