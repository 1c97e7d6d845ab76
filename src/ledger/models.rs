//! Credit ledger value types

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque user identity issued by the auth layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A user as seen by billing. Balance is never stored, only derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default = "default_plan")]
    pub plan: String,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            plan: default_plan(),
        }
    }
}

fn default_plan() -> String {
    "free".to_string()
}

/// Kind of credit movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Debit taken when a job starts; caps what the job may consume
    Reserve,
    /// Positive reconciliation of actual usage against a reservation
    Adjust,
    /// Return of unconsumed credit after failure or cancellation
    Refund,
    /// Credit grant from the payment side
    Topup,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Reserve => "RESERVE",
            EntryKind::Adjust => "ADJUST",
            EntryKind::Refund => "REFUND",
            EntryKind::Topup => "TOPUP",
        };
        f.write_str(s)
    }
}

/// Immutable ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user: UserId,
    pub kind: EntryKind,
    /// Signed amount: negative for reservations, positive otherwise
    pub amount: i64,
    pub reference: Option<String>,
    pub idempotency_key: String,
    pub note: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl LedgerEntry {
    /// Build a new entry with a fresh UUIDv7 and the current time
    pub fn new(
        user: UserId,
        kind: EntryKind,
        amount: i64,
        reference: Option<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user,
            kind,
            amount,
            reference,
            idempotency_key: idempotency_key.into(),
            note: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// Offset/limit window over a user's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
}

pub const MAX_PAGE_LIMIT: usize = 200;

fn default_page_limit() -> usize {
    50
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_page_limit(),
        }
    }
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Limit clamped to `1..=MAX_PAGE_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}
