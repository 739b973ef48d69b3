use std::sync::Arc;
use std::time::Duration;

use rmeta_consensus::{ApplyWaiter, OnTimeout, ReadGate, ReplicatedLog};
use rmeta_storage::StateMachineStore;
use rmeta_types::{LogIndex, MetaError, MetaRequest, NodeId, Proposal};

#[derive(Debug, Clone)]
pub struct MetaServiceConfig {
    pub propose_timeout: Duration,
    pub read_timeout: Duration,
    pub on_timeout: OnTimeout,
}

impl Default for MetaServiceConfig {
    fn default() -> Self {
        MetaServiceConfig {
            propose_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(1),
            on_timeout: OnTimeout::Abort,
        }
    }
}

/// Serialized state at a linearizable point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSnapshot {
    pub index: LogIndex,
    /// bincode-encoded `MetaData`.
    pub data: Vec<u8>,
}

/// The gateway: typed commands in, applied results out.
pub struct MetaService<L, S> {
    log: Arc<L>,
    state: S,
    waiter: ApplyWaiter<L>,
    gate: ReadGate<L>,
}

impl<L: ReplicatedLog, S: StateMachineStore> MetaService<L, S> {
    pub fn new(log: Arc<L>, state: S, config: MetaServiceConfig) -> Self {
        let waiter = ApplyWaiter::new(log.clone())
            .with_deadline(config.propose_timeout)
            .with_on_timeout(config.on_timeout);
        let gate = ReadGate::new(log.clone()).with_deadline(config.read_timeout);
        MetaService { log, state, waiter, gate }
    }

    pub fn node_id(&self) -> NodeId {
        self.log.node_id()
    }

    /// Propose `request` and wait for its typed result.
    pub async fn execute<R: MetaRequest>(&self, request: R) -> Result<R::Output, MetaError> {
        let proposal = Proposal::encode(&request.into_command())?;
        let response = self.waiter.submit_and_wait(proposal, None).await?;
        R::extract(response)
    }

    /// Full state, guaranteed to include every write committed before the call.
    pub async fn data(&self) -> Result<DataSnapshot, MetaError> {
        self.gate.read_notify(None).await?;
        let data = self.state.data().await?;
        Ok(DataSnapshot { index: data.index, data: data.to_bytes()? })
    }

    /// Local applied index, without any leadership check.
    pub fn ping(&self) -> LogIndex {
        self.log.applied_index()
    }
}

#[cfg(test)]
mod tests {
    use rmeta_storage::MemStateMachine;
    use rmeta_types::command::{CreateDatabase, DropDatabase};
    use rmeta_types::{CommandKind, MetaResponse};

    use super::*;

    /// Log that acknowledges every proposal with an empty result.
    struct AckLog;

    impl ReplicatedLog for AckLog {
        fn node_id(&self) -> NodeId {
            7
        }

        async fn propose(&self, _proposal: Proposal) -> Result<MetaResponse, MetaError> {
            Ok(MetaResponse::Empty)
        }

        async fn read_index(&self) -> Result<LogIndex, MetaError> {
            Ok(0)
        }

        async fn wait_applied(&self, _index: LogIndex) -> Result<(), MetaError> {
            Ok(())
        }

        fn applied_index(&self) -> LogIndex {
            0
        }
    }

    fn service() -> MetaService<AckLog, MemStateMachine> {
        MetaService::new(Arc::new(AckLog), MemStateMachine::default(), MetaServiceConfig::default())
    }

    #[tokio::test]
    async fn unit_result_is_extracted() {
        let svc = service();
        assert_eq!(svc.node_id(), 7);
        svc.execute(DropDatabase { name: "db".into() }).await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_result_is_reported() {
        let err = service().execute(CreateDatabase { name: "db".into() }).await.unwrap_err();
        assert!(matches!(err, MetaError::UnexpectedResponse { kind: CommandKind::CreateDatabase }));
    }

    #[tokio::test]
    async fn data_encodes_current_state() {
        let snap = service().data().await.unwrap();
        assert_eq!(snap.index, 0);
        let data = rmeta_storage::MetaData::from_bytes(&snap.data).unwrap();
        assert!(data.databases.is_empty());
    }
}
