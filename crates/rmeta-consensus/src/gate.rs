use std::sync::Arc;
use std::time::Duration;

use rmeta_types::{LogIndex, MetaError};

use crate::ReplicatedLog;

/// Linearizable read barrier.
///
/// Passing the gate guarantees the local state reflects every write
/// committed before the call began.
pub struct ReadGate<L> {
    log: Arc<L>,
    default_deadline: Duration,
}

impl<L: ReplicatedLog> ReadGate<L> {
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

    pub fn new(log: Arc<L>) -> Self {
        ReadGate { log, default_deadline: Self::DEFAULT_DEADLINE }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Obtain a read index and wait until it has been applied locally.
    /// Returns the read index.
    pub async fn read_notify(&self, deadline: Option<Duration>) -> Result<LogIndex, MetaError> {
        let deadline = deadline.unwrap_or(self.default_deadline);
        let barrier = async {
            let index = self.log.read_index().await?;
            self.log.wait_applied(index).await?;
            Ok::<_, MetaError>(index)
        };
        match tokio::time::timeout(deadline, barrier).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    ?deadline,
                    applied = self.log.applied_index(),
                    "read index wait timed out"
                );
                Err(MetaError::TimedOut(deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rmeta_storage::mem::MemLogStorage;
    use rmeta_storage::{MemStateMachine, StateMachineStore};
    use rmeta_types::command::CreateDatabase;
    use rmeta_types::{Command, MetaResponse, NodeId, Proposal};

    use super::*;
    use crate::{ApplyWaiter, LocalLog, LocalLogConfig};

    /// Log that has committed `read_index` but never applies it.
    struct LaggingLog {
        read_index: LogIndex,
    }

    impl ReplicatedLog for LaggingLog {
        fn node_id(&self) -> NodeId {
            2
        }

        async fn propose(&self, _proposal: Proposal) -> Result<MetaResponse, MetaError> {
            Err(MetaError::NotLeader { leader: Some(1) })
        }

        async fn read_index(&self) -> Result<LogIndex, MetaError> {
            Ok(self.read_index)
        }

        async fn wait_applied(&self, _index: LogIndex) -> Result<(), MetaError> {
            std::future::pending().await
        }

        fn applied_index(&self) -> LogIndex {
            0
        }
    }

    async fn local_log() -> Arc<LocalLog<MemLogStorage, MemStateMachine>> {
        let config = LocalLogConfig { node_id: 1, snapshot_threshold: 0 };
        Arc::new(LocalLog::start(config, MemLogStorage::new(), MemStateMachine::default()).await.unwrap())
    }

    #[tokio::test]
    async fn read_after_write_observes_the_write() {
        let log = local_log().await;
        let waiter = ApplyWaiter::new(log.clone());
        let gate = ReadGate::new(log.clone());

        let cmd = Command::CreateDatabase(CreateDatabase { name: "db1".into() });
        waiter.submit_and_wait(Proposal::encode(&cmd).unwrap(), None).await.unwrap();

        let index = gate.read_notify(None).await.unwrap();
        assert!(index >= 1);
        let data = log.state().data().await.unwrap();
        assert!(data.index >= index);
        assert!(data.database("db1").is_some());
    }

    #[tokio::test]
    async fn empty_log_passes_immediately() {
        let gate = ReadGate::new(local_log().await);
        assert_eq!(gate.read_notify(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lost_leadership_fails_the_read() {
        let log = local_log().await;
        log.step_down();
        let gate = ReadGate::new(log);
        assert!(matches!(gate.read_notify(None).await, Err(MetaError::ReadIndex(_))));
    }

    #[tokio::test]
    async fn lagging_apply_times_out() {
        let gate = ReadGate::new(Arc::new(LaggingLog { read_index: 10 }))
            .with_deadline(Duration::from_millis(20));
        let err = gate.read_notify(None).await.unwrap_err();
        assert!(matches!(err, MetaError::TimedOut(d) if d == Duration::from_millis(20)));
    }
}
