//! API models for LinguaBox job and credit endpoints.
//!
//! - `POST /jobs` accepts a [`CreateJobRequest`](crate::jobs::CreateJobRequest)
//!   and answers with [`JobAcceptedResponse`]
//! - Job endpoints return [`JobView`](crate::jobs::JobView) snapshots
//! - Credit endpoints return [`BalanceResponse`], [`LedgerPageResponse`] and
//!   [`TopupResponse`]
//!
//! # Job submission
//!
//! ```json
//! {
//!   "source_lang": "en",
//!   "target_lang": "id",
//!   "output_format": "docx",
//!   "document": "First paragraph.\n\nSecond paragraph."
//! }
//! ```
//!
//! The calling user is taken from the `X-Lingua-User` header; an optional
//! `X-Lingua-Idempotency-Key` header makes retries safe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::jobs::JobStatus;
use crate::ledger::{EntryKind, LedgerEntry, UserId};
use crate::observability::MetricsSnapshot;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BalanceResponse {
    pub user: UserId,
    pub plan: String,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerItem {
    pub id: String,
    pub kind: EntryKind,
    pub amount: i64,
    pub reference: Option<String>,
    pub note: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<LedgerEntry> for LedgerItem {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            kind: entry.kind,
            amount: entry.amount,
            reference: entry.reference,
            note: entry.note,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerPageResponse {
    pub items: Vec<LedgerItem>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopupRequest {
    pub amount: i64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopupResponse {
    pub entry_id: String,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub active_jobs: usize,
    pub metrics: MetricsSnapshot,
}
