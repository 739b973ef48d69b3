use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use rmeta_types::{LogIndex, MetaError};

use crate::traits::LogStorage;
use crate::types::{LogEntry, LogState, Snapshot};

#[derive(Default)]
struct MemLogInner {
    entries: BTreeMap<LogIndex, LogEntry>,
    last_purged: Option<LogIndex>,
    snapshot: Option<Snapshot>,
}

/// In-memory `LogStorage` backed by a `BTreeMap`.
///
/// Used by tests and by `storage.backend = "memory"`; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemLogStorage {
    inner: Arc<RwLock<MemLogInner>>,
}

impl MemLogStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStorage for MemLogStorage {
    async fn log_state(&self) -> Result<LogState, MetaError> {
        let g = self.inner.read().await;
        Ok(LogState {
            first_index: g.entries.keys().next().copied(),
            last_index: g.entries.keys().next_back().copied(),
            last_purged_index: g.last_purged,
        })
    }

    async fn get_entries(
        &self,
        from: LogIndex,
        to_inclusive: LogIndex,
    ) -> Result<Vec<LogEntry>, MetaError> {
        if from > to_inclusive {
            return Ok(Vec::new());
        }
        let g = self.inner.read().await;
        Ok(g.entries
            .range(from..=to_inclusive)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), MetaError> {
        let mut g = self.inner.write().await;
        for entry in entries {
            g.entries.insert(entry.index, entry);
        }
        Ok(())
    }

    async fn purge(&self, up_to_index: LogIndex) -> Result<(), MetaError> {
        let mut g = self.inner.write().await;
        g.entries.retain(|&idx, _| idx > up_to_index);
        g.last_purged = Some(up_to_index);
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), MetaError> {
        self.inner.write().await.snapshot = Some(snapshot);
        Ok(())
    }

    async fn read_snapshot(&self) -> Result<Option<Snapshot>, MetaError> {
        Ok(self.inner.read().await.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use rmeta_types::command::PruneShardGroups;
    use rmeta_types::{Command, Proposal};

    use super::*;
    use crate::types::SnapshotMeta;

    fn make_entry(index: LogIndex) -> LogEntry {
        LogEntry {
            index,
            appended_at_ns: index as i64,
            proposal: Proposal::encode(&Command::PruneShardGroups(PruneShardGroups {})).unwrap(),
        }
    }

    #[tokio::test]
    async fn log_storage_basic() {
        let store = MemLogStorage::new();

        // Empty state
        let state = store.log_state().await.unwrap();
        assert!(state.first_index.is_none());
        assert!(state.last_index.is_none());
        assert!(state.last_purged_index.is_none());
        assert_eq!(state.high_water(), 0);

        store
            .append(vec![make_entry(1), make_entry(2), make_entry(3)])
            .await
            .unwrap();

        let state = store.log_state().await.unwrap();
        assert_eq!(state.first_index, Some(1));
        assert_eq!(state.last_index, Some(3));

        let entries = store.get_entries(2, 3).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.index).collect::<Vec<_>>(), vec![2, 3]);
        assert!(store.get_entries(3, 2).await.unwrap().is_empty());

        store.purge(3).await.unwrap();
        let state = store.log_state().await.unwrap();
        assert!(state.last_index.is_none());
        assert_eq!(state.last_purged_index, Some(3));
        // Index assignment continues past purged entries.
        assert_eq!(state.high_water(), 3);
    }

    #[tokio::test]
    async fn snapshot_is_replaced() {
        let store = MemLogStorage::new();
        assert!(store.read_snapshot().await.unwrap().is_none());

        for i in 1..=2 {
            store
                .save_snapshot(Snapshot {
                    meta: SnapshotMeta { last_log_index: i, snapshot_id: format!("s{i}") },
                    data: vec![i as u8],
                })
                .await
                .unwrap();
        }
        let snap = store.read_snapshot().await.unwrap().unwrap();
        assert_eq!(snap.meta.last_log_index, 2);
        assert_eq!(snap.data, vec![2]);
    }
}
