//! Translation job models
//!
//! - [`TranslationJob`] is the persisted job row; every read hands out an
//!   owned snapshot and every write goes through a version check.
//! - [`JobStatus`] is a closed state machine; [`JobStatus::can_transition_to`]
//!   is the single transition table consulted before any status change.
//! - [`ChunkRecord`] marks a chunk's terminal outcome; its presence is what
//!   makes chunk reports idempotent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::UserId;
use crate::worker::ProviderError;

/// Supported document languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Id,
    De,
    Fr,
    Es,
    Zh,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::En,
        Language::Id,
        Language::De,
        Language::Fr,
        Language::Es,
        Language::Zh,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Id => "id",
            Language::De => "de",
            Language::Fr => "fr",
            Language::Es => "es",
            Language::Zh => "zh",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported language code '{s}'"))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Requested output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Docx,
    Pdf,
    Both,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(OutputFormat::Docx),
            "pdf" => Ok(OutputFormat::Pdf),
            "both" => Ok(OutputFormat::Both),
            other => Err(format!("invalid output_format '{other}'")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Both => "both",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Transition table. Terminal states have no outgoing edges.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Persisted job row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub id: Uuid,
    pub user: UserId,
    pub source_lang: Language,
    pub target_lang: Language,
    pub output_format: OutputFormat,
    pub status: JobStatus,
    pub total_chunks: u32,
    pub processed_chunks: u32,
    pub failed_chunks: u32,
    pub token_est_in: u64,
    pub token_est_out: u64,
    /// Set only when the job reaches a terminal state
    pub token_act_in: Option<u64>,
    pub token_act_out: Option<u64>,
    pub reserved_amount: i64,
    pub reservation_entry_id: Option<Uuid>,
    pub input_uri: String,
    pub output_uri: Option<String>,
    pub error_message: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Row version for compare-and-swap writes
    pub version: u64,
}

impl TranslationJob {
    /// Chunks with no terminal outcome yet
    pub fn unreported_chunks(&self) -> u32 {
        self.total_chunks
            .saturating_sub(self.processed_chunks + self.failed_chunks)
    }

    /// Chunks not successfully translated
    pub fn unprocessed_chunks(&self) -> u32 {
        self.total_chunks.saturating_sub(self.processed_chunks)
    }
}

/// Terminal outcome of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Succeeded {
        translated_text: String,
        tokens_in: u64,
        tokens_out: u64,
    },
    Failed {
        error: ProviderError,
    },
}

/// Marker written once per chunk when its outcome is recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub job_id: Uuid,
    pub index: u32,
    pub succeeded: bool,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub output_uri: Option<String>,
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Job creation input
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub source_lang: String,
    pub target_lang: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    pub document: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn default_output_format() -> String {
    "docx".to_string()
}

/// Client-facing job snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub processed_chunks: u32,
    pub failed_chunks: u32,
    pub total_chunks: u32,
    pub error_message: Option<String>,
    pub source_lang: Language,
    pub target_lang: Language,
    pub output_format: OutputFormat,
    pub reserved_amount: i64,
    pub token_est_in: u64,
    pub token_est_out: u64,
    pub token_act_in: Option<u64>,
    pub token_act_out: Option<u64>,
    pub output_uri: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&TranslationJob> for JobView {
    fn from(job: &TranslationJob) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status,
            processed_chunks: job.processed_chunks,
            failed_chunks: job.failed_chunks,
            total_chunks: job.total_chunks,
            error_message: job.error_message.clone(),
            source_lang: job.source_lang,
            target_lang: job.target_lang,
            output_format: job.output_format,
            reserved_amount: job.reserved_amount,
            token_est_in: job.token_est_in,
            token_est_out: job.token_est_out,
            token_act_in: job.token_act_in,
            token_act_out: job.token_act_out,
            output_uri: job.output_uri.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}
