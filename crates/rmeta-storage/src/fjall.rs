use std::path::Path;
use std::sync::Arc;

use rmeta_types::{LogIndex, MetaError};

use crate::codec::{decode, encode};
use crate::keys::{index_from_key, raft_log_key, LAST_PURGED, SNAPSHOT};
use crate::traits::LogStorage;
use crate::types::{LogEntry, LogState, Snapshot};

fn fjall_err(e: fjall::Error) -> MetaError {
    MetaError::Storage(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> MetaError {
    MetaError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// FjallStore: shared handle wrapping both keyspaces
// ---------------------------------------------------------------------------

/// Shared storage handle.
///
/// Both keyspaces live in a single fjall `Database` so that purging the log
/// and recording the purge point commit in one batch.
pub struct FjallStore {
    pub db: fjall::Database,
    /// Log entries: `index(8)` → bincode(LogEntry)
    pub raft_log: fjall::Keyspace,
    /// Bookkeeping: label → bincode(value)
    pub meta: fjall::Keyspace,
}

impl FjallStore {
    /// Open (or create) a `FjallStore` at `path`.
    pub fn open(path: &Path) -> Result<Arc<Self>, MetaError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let raft_log =
            db.keyspace("raft_log", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        let meta =
            db.keyspace("meta", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        Ok(Arc::new(FjallStore { db, raft_log, meta }))
    }
}

// ---------------------------------------------------------------------------
// FjallLogStorage
// ---------------------------------------------------------------------------

/// `LogStorage` backed by fjall.
///
/// All blocking I/O is wrapped in `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct FjallLogStorage(pub Arc<FjallStore>);

impl FjallLogStorage {
    pub fn open(path: &Path) -> Result<Self, MetaError> {
        Ok(FjallLogStorage(FjallStore::open(path)?))
    }
}

impl LogStorage for FjallLogStorage {
    async fn log_state(&self) -> Result<LogState, MetaError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<LogState, MetaError> {
            let mut first_index: Option<LogIndex> = None;
            let mut last_index: Option<LogIndex> = None;

            // Purges keep the log short, so a full key scan is cheap.
            for guard in store.raft_log.range(raft_log_key(0).to_vec()..=raft_log_key(u64::MAX).to_vec()) {
                let (k, _) = guard.into_inner().map_err(fjall_err)?;
                let idx = index_from_key(&k)
                    .ok_or_else(|| MetaError::Storage("malformed raft_log key".into()))?;
                if first_index.is_none() {
                    first_index = Some(idx);
                }
                last_index = Some(idx);
            }

            let last_purged_index = match store.meta.get(LAST_PURGED).map_err(fjall_err)? {
                Some(b) => Some(decode::<LogIndex>(&b)?),
                None => None,
            };

            Ok(LogState { first_index, last_index, last_purged_index })
        })
        .await
        .map_err(join_err)?
    }

    async fn get_entries(
        &self,
        from: LogIndex,
        to_inclusive: LogIndex,
    ) -> Result<Vec<LogEntry>, MetaError> {
        if from > to_inclusive {
            return Ok(Vec::new());
        }
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<LogEntry>, MetaError> {
            let start = raft_log_key(from).to_vec();
            let end = raft_log_key(to_inclusive).to_vec();
            store
                .raft_log
                .range(start..=end)
                .map(|g| g.into_inner().map_err(fjall_err).and_then(|(_, v)| decode::<LogEntry>(&v)))
                .collect()
        })
        .await
        .map_err(join_err)?
    }

    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), MetaError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), MetaError> {
            let mut batch = store.db.batch();
            for entry in &entries {
                batch.insert(&store.raft_log, raft_log_key(entry.index).to_vec(), encode(entry)?);
            }
            batch.commit().map_err(fjall_err)
        })
        .await
        .map_err(join_err)?
    }

    async fn purge(&self, up_to_index: LogIndex) -> Result<(), MetaError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), MetaError> {
            let start = raft_log_key(0).to_vec();
            let end = raft_log_key(up_to_index).to_vec();

            let keys: Vec<Vec<u8>> = store
                .raft_log
                .range(start..=end)
                .map(|g| g.into_inner().map(|(k, _)| k.to_vec()).map_err(fjall_err))
                .collect::<Result<_, _>>()?;

            let mut batch = store.db.batch();
            for k in keys {
                batch.remove(&store.raft_log, k);
            }
            batch.insert(&store.meta, LAST_PURGED, encode(&up_to_index)?);
            batch.commit().map_err(fjall_err)
        })
        .await
        .map_err(join_err)?
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), MetaError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), MetaError> {
            store.meta.insert(SNAPSHOT, encode(&snapshot)?).map_err(fjall_err)
        })
        .await
        .map_err(join_err)?
    }

    async fn read_snapshot(&self) -> Result<Option<Snapshot>, MetaError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Snapshot>, MetaError> {
            match store.meta.get(SNAPSHOT).map_err(fjall_err)? {
                Some(b) => Ok(Some(decode::<Snapshot>(&b)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(join_err)?
    }
}
