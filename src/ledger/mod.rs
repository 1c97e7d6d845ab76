/// Append-only credit ledger
///
/// Every credit movement is an immutable [`LedgerEntry`]; a user's balance is
/// the sum of their entries and is never stored. The fjall-backed
/// [`FjallLedger`] persists:
///
/// - Ledger entries keyed per user in insertion order
/// - Idempotency keys (deduplication of reservations, refunds, top-ups)
/// - An id index for entry lookups
/// - The entry sequence counter
///
/// ## Usage
///
/// ```rust,ignore
/// use linguabox::ledger::{FjallLedger, LedgerStore, UserId};
///
/// let ledger = FjallLedger::open("data/ledger")?;
/// let user = UserId::new("alice");
/// ledger.topup(&user, 100, None, None).await?;
/// let entry_id = ledger.reserve(&user, 30, "job_1", "reserve:job_1").await?;
/// assert_eq!(ledger.balance(&user).await?, 70);
/// ```

pub mod error;
pub mod models;
pub mod partitions;
pub mod store;
pub mod traits;

pub use error::{LedgerError, Result};
pub use models::{EntryKind, LedgerEntry, MAX_PAGE_LIMIT, Page, User, UserId};
pub use store::{FjallLedger, open_keyspace};
pub use traits::LedgerStore;
