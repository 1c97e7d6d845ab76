use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{LedgerError, Result};
use super::models::{EntryKind, LedgerEntry, Page, UserId};
use super::partitions::{
    encode_entry_key, encode_entry_prefix, encode_id_key, encode_idem_key, encode_meta_key,
};
use super::traits::LedgerStore;
use crate::sync::KeyedLocks;

const META_NEXT_ENTRY_SEQ: &str = "next_entry_seq";

/// Open (or create) a fjall keyspace, creating parent directories first
pub fn open_keyspace<P: AsRef<Path>>(path: P) -> Result<Keyspace> {
    let path = path.as_ref();
    info!("Opening Fjall keyspace at: {}", path.display());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(Config::new(path).open()?)
}

/// Fjall-backed credit ledger
#[derive(Clone)]
pub struct FjallLedger {
    keyspace: Keyspace,
    entries: PartitionHandle,
    idempotency: PartitionHandle,
    ids: PartitionHandle,
    metadata: PartitionHandle,
    next_seq: Arc<AtomicU64>,
    user_locks: Arc<KeyedLocks<UserId>>,
}

impl FjallLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let keyspace = open_keyspace(path)?;
        Self::with_keyspace(keyspace)
    }

    /// Open the ledger partitions inside an existing keyspace
    pub fn with_keyspace(keyspace: Keyspace) -> Result<Self> {
        let entries = keyspace.open_partition("entries", PartitionCreateOptions::default())?;
        let idempotency =
            keyspace.open_partition("entry_idem", PartitionCreateOptions::default())?;
        let ids = keyspace.open_partition("entry_ids", PartitionCreateOptions::default())?;
        let metadata =
            keyspace.open_partition("ledger_metadata", PartitionCreateOptions::default())?;

        let next_seq = metadata
            .get(encode_meta_key(META_NEXT_ENTRY_SEQ))?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        info!(next_seq, "Credit ledger opened");
        Ok(Self {
            keyspace,
            entries,
            idempotency,
            ids,
            metadata,
            next_seq: Arc::new(AtomicU64::new(next_seq)),
            user_locks: Arc::new(KeyedLocks::new()),
        })
    }

    fn load_by_entry_key(&self, entry_key: &[u8]) -> Result<LedgerEntry> {
        let value = self.entries.get(entry_key)?.ok_or_else(|| {
            LedgerError::EntryNotFound(String::from_utf8_lossy(entry_key).into_owned())
        })?;
        Ok(serde_json::from_slice(&value)?)
    }

    fn lookup_idempotent(&self, key: &str) -> Result<Option<LedgerEntry>> {
        match self.idempotency.get(encode_idem_key(key))? {
            Some(entry_key) => Ok(Some(self.load_by_entry_key(&entry_key)?)),
            None => Ok(None),
        }
    }

    /// Scan a user's entries, oldest first
    fn scan_user(&self, user: &UserId) -> Result<Vec<LedgerEntry>> {
        let mut out = Vec::new();
        for item in self.entries.prefix(encode_entry_prefix(user.as_str())) {
            let (_, value) = item?;
            let entry: LedgerEntry = serde_json::from_slice(&value)?;
            // Prefix also matches users whose id extends this one past a ':'
            if entry.user == *user {
                out.push(entry);
            }
        }
        Ok(out)
    }

    fn sum_user(&self, user: &UserId) -> Result<i64> {
        self.scan_user(user)?
            .iter()
            .try_fold(0i64, |acc, e| acc.checked_add(e.amount))
            .ok_or_else(|| LedgerError::BalanceOverflow {
                user: user.to_string(),
            })
    }

    /// Write entry, idempotency key, id index and sequence in one batch.
    /// Caller must hold the user's lock.
    fn write_entry(&self, entry: &LedgerEntry) -> Result<Uuid> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry_key = encode_entry_key(entry.user.as_str(), seq);
        let value = serde_json::to_vec(entry)?;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.entries, entry_key.clone(), value);
        batch.insert(
            &self.idempotency,
            encode_idem_key(&entry.idempotency_key),
            entry_key.clone(),
        );
        batch.insert(&self.ids, encode_id_key(&entry.id), entry_key);
        batch.insert(
            &self.metadata,
            encode_meta_key(META_NEXT_ENTRY_SEQ),
            (seq + 1).to_be_bytes().to_vec(),
        );
        batch.commit()?;

        debug!(
            entry_id = %entry.id,
            user = %entry.user,
            kind = %entry.kind,
            amount = entry.amount,
            seq,
            "Ledger entry appended"
        );
        Ok(entry.id)
    }
}

#[async_trait]
impl LedgerStore for FjallLedger {
    async fn reserve(
        &self,
        user: &UserId,
        amount: i64,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<Uuid> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let _guard = self.user_locks.lock(user).await;

        if let Some(existing) = self.lookup_idempotent(idempotency_key)? {
            debug!(user = %user, idempotency_key, entry_id = %existing.id, "Reservation replayed");
            return Ok(existing.id);
        }

        let available = self.sum_user(user)?;
        if available.checked_sub(amount).is_none_or(|left| left < 0) {
            warn!(user = %user, required = amount, available, "Reservation refused");
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available,
            });
        }

        let entry = LedgerEntry::new(
            user.clone(),
            EntryKind::Reserve,
            -amount,
            Some(reference.to_string()),
            idempotency_key,
        );
        let id = self.write_entry(&entry)?;
        info!(user = %user, amount, reference, entry_id = %id, "Credits reserved");
        Ok(id)
    }

    async fn balance(&self, user: &UserId) -> Result<i64> {
        let _guard = self.user_locks.lock(user).await;
        self.sum_user(user)
    }

    async fn append(&self, entry: LedgerEntry) -> Result<Uuid> {
        let _guard = self.user_locks.lock(&entry.user).await;

        if let Some(existing) = self.lookup_idempotent(&entry.idempotency_key)? {
            debug!(
                idempotency_key = %entry.idempotency_key,
                entry_id = %existing.id,
                "Append replayed"
            );
            return Ok(existing.id);
        }

        let balance = self.sum_user(&entry.user)?;
        if balance.checked_add(entry.amount).is_none() {
            warn!(user = %entry.user, amount = entry.amount, balance, "Append would overflow balance");
            return Err(LedgerError::BalanceOverflow {
                user: entry.user.to_string(),
            });
        }

        self.write_entry(&entry)
    }

    async fn history(&self, user: &UserId, page: Page) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.scan_user(user)?;
        entries.reverse();
        Ok(entries
            .into_iter()
            .skip(page.offset)
            .take(page.effective_limit())
            .collect())
    }

    async fn entry(&self, id: Uuid) -> Result<Option<LedgerEntry>> {
        match self.ids.get(encode_id_key(&id))? {
            Some(entry_key) => Ok(Some(self.load_by_entry_key(&entry_key)?)),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        self.lookup_idempotent(key)
    }

    async fn entries_for_reference(
        &self,
        user: &UserId,
        reference: &str,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .scan_user(user)?
            .into_iter()
            .filter(|e| e.reference.as_deref() == Some(reference))
            .collect())
    }
}
