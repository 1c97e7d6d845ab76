//! Returning reserved credit to users
//!
//! Every return is keyed `refund:{job_id}:{reason}`, so a job gets at most
//! one return per reason no matter how often finalization is retried.

use std::fmt;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::models::TranslationJob;
use crate::ledger::{EntryKind, LedgerEntry, LedgerStore, Result};

/// Why credit goes back to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    /// Reserved minus actual cost on success
    CompletionAdjustment,
    JobFailed,
    Cancelled,
    /// The reservation succeeded but the job could not be set up
    CreateAborted,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::CompletionAdjustment => "completion_adjustment",
            RefundReason::JobFailed => "job_failed",
            RefundReason::Cancelled => "cancelled",
            RefundReason::CreateAborted => "create_aborted",
        }
    }

    /// Completion reconciles through ADJUST; everything else is a REFUND
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            RefundReason::CompletionAdjustment => EntryKind::Adjust,
            _ => EntryKind::Refund,
        }
    }
}

impl fmt::Display for RefundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger totals for one job, derived from entries referencing it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobAccount {
    pub reserved: i64,
    pub adjusted: i64,
    pub refunded: i64,
}

impl JobAccount {
    /// Credit kept by the platform
    pub fn consumed(&self) -> i64 {
        self.reserved - self.adjusted - self.refunded
    }
}

#[derive(Clone)]
pub struct RefundEngine {
    ledger: Arc<dyn LedgerStore>,
}

impl RefundEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub fn idempotency_key(job_id: &Uuid, reason: RefundReason) -> String {
        format!("refund:{}:{}", job_id, reason)
    }

    /// Return `amount` credits for `job`.
    ///
    /// Non-positive amounts write nothing and yield `None`. Repeating a call
    /// for the same job and reason yields the original entry id.
    pub async fn issue(
        &self,
        job: &TranslationJob,
        amount: i64,
        reason: RefundReason,
    ) -> Result<Option<Uuid>> {
        if amount <= 0 {
            return Ok(None);
        }

        let entry = LedgerEntry::new(
            job.user.clone(),
            reason.entry_kind(),
            amount,
            Some(job.id.to_string()),
            Self::idempotency_key(&job.id, reason),
        )
        .with_note(Some(reason.to_string()));

        let id = self.ledger.append(entry).await?;
        info!(
            job_id = %job.id,
            user = %job.user,
            amount,
            reason = %reason,
            entry_id = %id,
            "Credits returned"
        );
        Ok(Some(id))
    }

    pub async fn account(&self, job: &TranslationJob) -> Result<JobAccount> {
        let entries = self
            .ledger
            .entries_for_reference(&job.user, &job.id.to_string())
            .await?;

        let mut account = JobAccount::default();
        for entry in entries {
            match entry.kind {
                EntryKind::Reserve => account.reserved -= entry.amount,
                EntryKind::Adjust => account.adjusted += entry.amount,
                EntryKind::Refund => account.refunded += entry.amount,
                EntryKind::Topup => {}
            }
        }
        Ok(account)
    }
}
