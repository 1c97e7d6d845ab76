//! Engine-wide error taxonomy

use thiserror::Error;
use uuid::Uuid;

use crate::jobs::models::JobStatus;
use crate::jobs::store::JobStoreError;
use crate::ledger::LedgerError;
use crate::storage::StorageError;
use crate::worker::ProviderError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    /// Retries exhausted inside the worker pool
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    #[error("permanent provider error: {0}")]
    PermanentProvider(String),

    #[error("concurrent modification of job {0}")]
    ConcurrencyConflict(Uuid),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<LedgerError> for EngineError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientCredits {
                required,
                available,
            } => EngineError::InsufficientCredits {
                required,
                available,
            },
            LedgerError::InvalidAmount(amount) => {
                EngineError::Validation(format!("amount must be positive, got {amount}"))
            }
            LedgerError::EntryNotFound(id) => EngineError::NotFound(format!("ledger entry {id}")),
            LedgerError::BalanceOverflow { user } => {
                EngineError::Validation(format!("balance of {user} would overflow"))
            }
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<JobStoreError> for EngineError {
    fn from(value: JobStoreError) -> Self {
        match value {
            JobStoreError::VersionConflict { job_id, .. } => {
                EngineError::ConcurrencyConflict(job_id)
            }
            JobStoreError::JobNotFound(job_id) => EngineError::NotFound(format!("job {job_id}")),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<ProviderError> for EngineError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Transient(reason) => EngineError::TransientProvider(reason),
            ProviderError::Permanent(reason) => EngineError::PermanentProvider(reason),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(uri) => EngineError::NotFound(uri),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_maps_to_concurrency_conflict() {
        let job_id = Uuid::now_v7();
        let err: EngineError = JobStoreError::VersionConflict {
            job_id,
            expected: 1,
            found: 2,
        }
        .into();
        assert!(matches!(err, EngineError::ConcurrencyConflict(id) if id == job_id));
    }

    #[test]
    fn test_insufficient_credits_keeps_amounts() {
        let err: EngineError = LedgerError::InsufficientCredits {
            required: 30,
            available: 5,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::InsufficientCredits {
                required: 30,
                available: 5
            }
        ));
    }

    #[test]
    fn test_provider_error_keeps_its_kind() {
        let err: EngineError = ProviderError::Permanent("unsupported language".into()).into();
        assert_eq!(
            err.to_string(),
            "permanent provider error: unsupported language"
        );

        let err: EngineError = ProviderError::Transient("rate limited".into()).into();
        assert!(matches!(err, EngineError::TransientProvider(ref r) if r == "rate limited"));
    }

    #[test]
    fn test_balance_overflow_is_a_validation_error() {
        let err: EngineError = LedgerError::BalanceOverflow {
            user: "alice".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = EngineError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "invalid transition from COMPLETED to CANCELLED");
    }
}
