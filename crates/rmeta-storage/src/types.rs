use rmeta_types::{LogIndex, Proposal};

/// A single entry in the metadata log.
///
/// `appended_at_ns` is stamped once, when the entry is appended. It is the
/// only clock the state machine reads, so every replica that applies the same
/// entries computes the same lease expiries and deletion times.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub index: LogIndex,
    pub appended_at_ns: i64,
    pub proposal: Proposal,
}

/// Summary of the current log extent.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogState {
    /// Smallest index currently in the log (`None` if log is empty).
    pub first_index: Option<LogIndex>,
    /// Largest index currently in the log (`None` if log is empty).
    pub last_index: Option<LogIndex>,
    /// Largest index that has been purged (compacted into a snapshot).
    pub last_purged_index: Option<LogIndex>,
}

impl LogState {
    /// Highest index ever assigned, counting purged entries.
    pub fn high_water(&self) -> LogIndex {
        self.last_index
            .unwrap_or(0)
            .max(self.last_purged_index.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotMeta {
    pub last_log_index: LogIndex,
    /// UUID v4 string identifying this snapshot.
    pub snapshot_id: String,
}

/// A full state-machine snapshot.
///
/// `data` is a `bincode`-serialized [`crate::MetaData`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}
