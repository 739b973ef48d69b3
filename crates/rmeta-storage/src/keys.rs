use rmeta_types::LogIndex;

/// `meta` keyspace label for the index of the last purged log entry.
pub const LAST_PURGED: &[u8] = b"last_purged";

/// `meta` keyspace label for the most recent state-machine snapshot.
pub const SNAPSHOT: &[u8] = b"snapshot";

/// `raft_log` keyspace: `index(8)`, big-endian so lexicographic order is
/// numeric order.
pub fn raft_log_key(index: LogIndex) -> [u8; 8] {
    index.to_be_bytes()
}

/// Inverse of [`raft_log_key`].
pub fn index_from_key(key: &[u8]) -> Option<LogIndex> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(LogIndex::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raft_log_keys_sort_by_index() {
        let a = raft_log_key(1);
        let b = raft_log_key(2);
        let c = raft_log_key(1000);
        let d = raft_log_key(u64::MAX);
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn key_decodes_back_to_index() {
        assert_eq!(index_from_key(&raft_log_key(42)), Some(42));
        assert_eq!(index_from_key(b"short"), None);
    }
}
