use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error(
        "per_job_concurrency ({per_job}) exceeds worker_concurrency ({global})"
    )]
    PerJobConcurrencyExceedsGlobal { per_job: usize, global: usize },

    #[error("failure_threshold_percent must be within 0..=100, got {0}")]
    InvalidFailureThreshold(u32),

    #[error("Storage provider is local but no root directory is configured")]
    MissingStorageRoot,

    #[error("Storage bucket name is empty")]
    EmptyBucket,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_billing(config)?;
    validate_pipeline(config)?;
    validate_storage(config)?;
    Ok(())
}

fn positive(value: u64, field: &'static str) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    positive(config.server.max_document_bytes as u64, "max_document_bytes")
}

fn validate_billing(config: &Config) -> Result<(), ValidationError> {
    let billing = &config.billing;
    positive(billing.rate_per_thousand, "rate_per_thousand")?;
    positive(billing.max_tokens_per_job, "max_tokens_per_job")?;
    positive(billing.max_chunks_per_job as u64, "max_chunks_per_job")?;
    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    let pipeline = &config.pipeline;
    positive(pipeline.max_chunk_chars as u64, "max_chunk_chars")?;
    positive(pipeline.worker_concurrency as u64, "worker_concurrency")?;
    positive(pipeline.per_job_concurrency as u64, "per_job_concurrency")?;
    positive(pipeline.max_attempts as u64, "max_attempts")?;
    positive(pipeline.chunk_deadline_ms, "chunk_deadline_ms")?;

    if pipeline.per_job_concurrency > pipeline.worker_concurrency {
        return Err(ValidationError::PerJobConcurrencyExceedsGlobal {
            per_job: pipeline.per_job_concurrency,
            global: pipeline.worker_concurrency,
        });
    }

    if pipeline.failure_threshold_percent > 100 {
        return Err(ValidationError::InvalidFailureThreshold(
            pipeline.failure_threshold_percent,
        ));
    }

    Ok(())
}

/// Local storage needs a root directory
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.bucket.trim().is_empty() {
        return Err(ValidationError::EmptyBucket);
    }
    if config.storage.provider == StorageProvider::Local && config.storage.root.is_none() {
        return Err(ValidationError::MissingStorageRoot);
    }
    Ok(())
}
