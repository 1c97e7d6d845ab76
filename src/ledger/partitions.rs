/// Key layout for the credit ledger partitions
///
/// Partition structure:
/// - `entries`: entry:{user}:{seq:020} -> LedgerEntry (JSON)
/// - `entry_idem`: idem:{key} -> entry key
/// - `entry_ids`: id:{uuid} -> entry key
/// - `metadata`: meta:{key} -> value
///
/// Sequence numbers are zero-padded so lexicographic order is insertion
/// order, and a reverse prefix scan is newest-first.

/// Encode an entry key: entry:{user}:{seq:020}
pub fn encode_entry_key(user: &str, seq: u64) -> Vec<u8> {
    format!("entry:{}:{:020}", user, seq).into_bytes()
}

/// Encode a user's entry prefix for range scans: entry:{user}:
pub fn encode_entry_prefix(user: &str) -> Vec<u8> {
    format!("entry:{}:", user).into_bytes()
}

/// Encode an idempotency key: idem:{key}
pub fn encode_idem_key(key: &str) -> Vec<u8> {
    format!("idem:{}", key).into_bytes()
}

/// Encode an entry id lookup key: id:{uuid}
pub fn encode_id_key(id: &uuid::Uuid) -> Vec<u8> {
    format!("id:{}", id).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
