use async_trait::async_trait;
use uuid::Uuid;

use super::error::{LedgerError, Result};
use super::models::{EntryKind, LedgerEntry, Page, UserId};

/// Append-only credit ledger
///
/// Balances are derived by summing a user's entries; implementations must
/// never update or delete an entry once written.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Debit `amount` credits if the user can afford it.
    ///
    /// The balance check and the append happen in one per-user exclusive
    /// section. A repeated `idempotency_key` returns the original entry id
    /// without debiting again.
    async fn reserve(
        &self,
        user: &UserId,
        amount: i64,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<Uuid>;

    /// Current balance (sum of all entries)
    async fn balance(&self, user: &UserId) -> Result<i64>;

    /// Append an entry without a balance check. Idempotent on the entry's key.
    async fn append(&self, entry: LedgerEntry) -> Result<Uuid>;

    /// Entries newest-first
    async fn history(&self, user: &UserId, page: Page) -> Result<Vec<LedgerEntry>>;

    async fn entry(&self, id: Uuid) -> Result<Option<LedgerEntry>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<LedgerEntry>>;

    /// All of a user's entries carrying `reference`, oldest first
    async fn entries_for_reference(
        &self,
        user: &UserId,
        reference: &str,
    ) -> Result<Vec<LedgerEntry>>;

    /// Grant credits to a user
    async fn topup(
        &self,
        user: &UserId,
        amount: i64,
        note: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Uuid> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let key = idempotency_key.unwrap_or_else(|| format!("topup:{}", Uuid::new_v4()));
        let entry = LedgerEntry::new(user.clone(), EntryKind::Topup, amount, None, key)
            .with_note(note);
        self.append(entry).await
    }
}
