use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use rmeta_types::{LogIndex, MetaError, MetaResponse};

use crate::data::MetaData;
use crate::traits::StateMachineStore;
use crate::types::{LogEntry, Snapshot, SnapshotMeta};

/// Parameters every replica must agree on; changing them between replicas
/// breaks determinism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachineConfig {
    /// Policy created alongside every new database, if any.
    pub default_retention_policy: Option<String>,
    pub lease_duration: Duration,
    /// bcrypt work factor for stored password hashes.
    pub password_hash_cost: u32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        StateMachineConfig {
            default_retention_policy: Some("autogen".to_string()),
            lease_duration: Duration::from_secs(60),
            password_hash_cost: 10,
        }
    }
}

/// In-memory `StateMachineStore` over [`MetaData`].
///
/// Durability comes from the log and its snapshots; on restart the state is
/// rebuilt by installing the last snapshot and replaying the log tail.
#[derive(Clone)]
pub struct MemStateMachine {
    inner: Arc<RwLock<MetaData>>,
    config: Arc<StateMachineConfig>,
}

impl MemStateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        MemStateMachine {
            inner: Arc::new(RwLock::new(MetaData::default())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.config
    }
}

impl Default for MemStateMachine {
    fn default() -> Self {
        Self::new(StateMachineConfig::default())
    }
}

impl StateMachineStore for MemStateMachine {
    async fn last_applied(&self) -> Result<LogIndex, MetaError> {
        Ok(self.inner.read().await.index)
    }

    /// The command runs on the blocking pool against a copy of the state,
    /// since password hashing is CPU-bound. Readers see the previous state
    /// until the copy is swapped in.
    async fn apply(&self, entry: &LogEntry) -> Result<MetaResponse, MetaError> {
        let base = {
            let g = self.inner.read().await;
            if entry.index <= g.index {
                return Err(MetaError::Internal(format!(
                    "entry {} already applied (last applied {})",
                    entry.index, g.index
                )));
            }
            g.clone()
        };

        let owned = entry.clone();
        let config = self.config.clone();
        let (next, result) = tokio::task::spawn_blocking(move || {
            let mut next = base;
            let result = next.apply(&owned, &config);
            (next, result)
        })
        .await
        .map_err(|e| MetaError::Internal(format!("apply of entry {} failed: {e}", entry.index)))?;

        let mut g = self.inner.write().await;
        if g.index >= entry.index {
            return Err(MetaError::Internal(format!(
                "entry {} raced a concurrent apply (last applied {})",
                entry.index, g.index
            )));
        }
        *g = next;
        drop(g);

        if let Err(e) = &result {
            tracing::debug!(index = entry.index, kind = %entry.proposal.kind(), error = %e, "command rejected by state machine");
        }
        result
    }

    async fn data(&self) -> Result<MetaData, MetaError> {
        Ok(self.inner.read().await.clone())
    }

    async fn build_snapshot(&self) -> Result<Snapshot, MetaError> {
        let g = self.inner.read().await;
        Ok(Snapshot {
            meta: SnapshotMeta {
                last_log_index: g.index,
                snapshot_id: uuid::Uuid::new_v4().to_string(),
            },
            data: g.to_bytes()?,
        })
    }

    async fn install_snapshot(&self, snapshot: Snapshot) -> Result<(), MetaError> {
        let mut data = MetaData::from_bytes(&snapshot.data)?;
        data.index = snapshot.meta.last_log_index;
        *self.inner.write().await = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rmeta_types::command::{AcquireLease, CreateDatabase, CreateUser};
    use rmeta_types::{ApplyError, Command, Proposal};

    use super::*;

    fn entry(index: LogIndex, cmd: Command) -> LogEntry {
        LogEntry { index, appended_at_ns: 1_000 * index as i64, proposal: Proposal::encode(&cmd).unwrap() }
    }

    fn create_db(name: &str) -> Command {
        Command::CreateDatabase(CreateDatabase { name: name.into() })
    }

    #[tokio::test]
    async fn apply_tracks_last_applied() {
        let sm = MemStateMachine::default();
        assert_eq!(sm.last_applied().await.unwrap(), 0);

        sm.apply(&entry(1, create_db("db1"))).await.unwrap();
        let err = sm.apply(&entry(2, create_db("db1"))).await.unwrap_err();
        assert!(matches!(err, MetaError::Apply(ApplyError::DatabaseExists(_))));
        assert_eq!(sm.last_applied().await.unwrap(), 2);
        assert_eq!(sm.data().await.unwrap().databases.len(), 1);
    }

    #[tokio::test]
    async fn replayed_index_is_refused() {
        let sm = MemStateMachine::default();
        sm.apply(&entry(1, create_db("db1"))).await.unwrap();
        let err = sm.apply(&entry(1, create_db("db2"))).await.unwrap_err();
        assert!(matches!(err, MetaError::Internal(_)));
        assert!(sm.data().await.unwrap().database("db2").is_none());
    }

    #[tokio::test]
    async fn lease_contention_between_nodes() {
        let config = StateMachineConfig { lease_duration: Duration::from_secs(30), ..Default::default() };
        let sm = MemStateMachine::new(config);
        let acquire = |node_id| Command::AcquireLease(AcquireLease { name: "cq-runner".into(), node_id });

        sm.apply(&entry(1, acquire(1))).await.unwrap();
        let err = sm.apply(&entry(2, acquire(2))).await.unwrap_err();
        assert!(matches!(err, MetaError::Apply(ApplyError::LeaseHeld { owner: 1, .. })));
    }

    #[tokio::test]
    async fn readers_are_not_blocked_by_password_hashing() {
        // Single-threaded runtime: hashing on it would finish before the read.
        let sm = MemStateMachine::new(StateMachineConfig { password_hash_cost: 10, ..Default::default() });
        let create = Command::CreateUser(CreateUser {
            name: "carol".into(),
            password: "hunter2".into(),
            admin: false,
        });
        let apply = tokio::spawn({
            let sm = sm.clone();
            async move { sm.apply(&entry(1, create)).await }
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        let during = sm.data().await.unwrap();
        assert!(during.user("carol").is_none());

        apply.await.unwrap().unwrap();
        let after = sm.data().await.unwrap();
        assert!(after.user("carol").unwrap().hash.starts_with("$2b$10$"));
        assert_eq!(after.index, 1);
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let sm = MemStateMachine::default();
        sm.apply(&entry(1, create_db("db1"))).await.unwrap();
        sm.apply(&entry(2, create_db("db2"))).await.unwrap();
        let snap = sm.build_snapshot().await.unwrap();
        assert_eq!(snap.meta.last_log_index, 2);
        assert!(!snap.meta.snapshot_id.is_empty());

        let restored = MemStateMachine::default();
        restored.install_snapshot(snap).await.unwrap();
        assert_eq!(restored.last_applied().await.unwrap(), 2);
        assert_eq!(restored.data().await.unwrap(), sm.data().await.unwrap());

        // Replay continues after the snapshot.
        restored.apply(&entry(3, create_db("db3"))).await.unwrap();
        assert!(restored.data().await.unwrap().database("db3").is_some());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_rejected() {
        let sm = MemStateMachine::default();
        let snap = Snapshot {
            meta: SnapshotMeta { last_log_index: 5, snapshot_id: "x".into() },
            data: vec![0xff; 3],
        };
        assert!(matches!(sm.install_snapshot(snap).await, Err(MetaError::Storage(_))));
        assert_eq!(sm.last_applied().await.unwrap(), 0);
    }
}
