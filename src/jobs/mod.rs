//! Translation jobs
//!
//! A job moves `PENDING -> RUNNING -> {COMPLETED, FAILED, CANCELLED}`.
//! [`JobOrchestrator`] reserves the estimated cost before a job exists,
//! fans chunks out to the worker pool, records each chunk outcome exactly
//! once and settles the reservation when the job ends:
//!
//! - completed: `reserved - actual` comes back as an ADJUST entry
//! - failed: `reserved - actual so far` comes back as a REFUND entry
//! - cancelled: `floor(reserved * unprocessed / total)` comes back as a REFUND
//!
//! Actual cost is capped at the reservation.

pub mod chunking;
pub mod estimate;
pub mod models;
pub mod orchestrator;
pub mod refund;
pub mod store;

pub use models::{
    ChunkOutcome, ChunkRecord, CreateJobRequest, JobStatus, JobView, Language, OutputFormat,
    TranslationJob,
};
pub use orchestrator::{EngineContext, EngineSettings, JobOrchestrator};
pub use refund::{JobAccount, RefundEngine, RefundReason};
pub use store::{FjallJobStore, JobStore, JobStoreError};
