use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use rmeta_types::{CommandKind, MetaError, MetaResponse, Proposal};

use crate::ReplicatedLog;

/// What happens to the helper task when a caller's deadline expires first.
///
/// Either way the entry may already be in the log and will still apply;
/// only the helper's fate differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnTimeout {
    /// Cancel the helper. Nobody waits for the entry any longer.
    #[default]
    Abort,
    /// Let the helper run to completion and drop its result.
    Detach,
}

/// Turns a proposal into a blocking, exactly-matched call.
pub struct ApplyWaiter<L> {
    log: Arc<L>,
    default_deadline: Duration,
    on_timeout: OnTimeout,
}

impl<L: ReplicatedLog> ApplyWaiter<L> {
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

    pub fn new(log: Arc<L>) -> Self {
        ApplyWaiter {
            log,
            default_deadline: Self::DEFAULT_DEADLINE,
            on_timeout: OnTimeout::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = deadline;
        self
    }

    pub fn with_on_timeout(mut self, on_timeout: OnTimeout) -> Self {
        self.on_timeout = on_timeout;
        self
    }

    pub fn default_deadline(&self) -> Duration {
        self.default_deadline
    }

    /// Start proposing on a helper task and hand back the call to wait on.
    pub fn submit(&self, proposal: Proposal) -> PendingCall {
        let log = self.log.clone();
        let kind = proposal.kind();
        let handle = tokio::spawn(async move { log.propose(proposal).await });
        PendingCall { kind, handle, on_timeout: self.on_timeout }
    }

    /// `deadline` overrides the waiter's default for this call only.
    pub async fn submit_and_wait(
        &self,
        proposal: Proposal,
        deadline: Option<Duration>,
    ) -> Result<MetaResponse, MetaError> {
        self.submit(proposal)
            .wait(deadline.unwrap_or(self.default_deadline))
            .await
    }
}

/// One in-flight proposal, owned by exactly one caller and resolved once.
///
/// Under [`OnTimeout::Abort`] the helper is cancelled when this handle is
/// dropped unresolved, which covers both a timed-out `wait` and a caller
/// that goes away mid-wait.
#[must_use = "a PendingCall does nothing unless waited on"]
pub struct PendingCall {
    kind: CommandKind,
    handle: JoinHandle<Result<MetaResponse, MetaError>>,
    on_timeout: OnTimeout,
}

impl PendingCall {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Wait for the result. On deadline expiry the outcome is unknown: the
    /// command may still commit and apply.
    pub async fn wait(mut self, deadline: Duration) -> Result<MetaResponse, MetaError> {
        match tokio::time::timeout(deadline, &mut self.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(MetaError::Internal(format!("{} helper task failed: {e}", self.kind))),
            Err(_) => {
                tracing::warn!(
                    kind = %self.kind,
                    ?deadline,
                    on_timeout = ?self.on_timeout,
                    "gave up waiting for apply; outcome unknown"
                );
                Err(MetaError::TimedOut(deadline))
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.on_timeout == OnTimeout::Abort {
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use tokio::sync::mpsc;

    use rmeta_storage::mem::MemLogStorage;
    use rmeta_storage::{MemStateMachine, StateMachineStore};
    use rmeta_types::command::{CreateDatabase, CreateDataNode};
    use rmeta_types::{ApplyError, Command, LogIndex, NodeId};

    use super::*;
    use crate::{LocalLog, LocalLogConfig};

    /// Log whose proposals take `delay` and count how many ran to the end.
    struct SlowLog {
        delay: Duration,
        completed: AtomicUsize,
    }

    impl SlowLog {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(SlowLog { delay, completed: AtomicUsize::new(0) })
        }
    }

    impl ReplicatedLog for SlowLog {
        fn node_id(&self) -> NodeId {
            1
        }

        async fn propose(&self, _proposal: Proposal) -> Result<MetaResponse, MetaError> {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
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

    fn create_db(name: &str) -> Proposal {
        Proposal::encode(&Command::CreateDatabase(CreateDatabase { name: name.into() })).unwrap()
    }

    async fn local_log() -> Arc<LocalLog<MemLogStorage, MemStateMachine>> {
        let config = LocalLogConfig { node_id: 1, snapshot_threshold: 0 };
        Arc::new(LocalLog::start(config, MemLogStorage::new(), MemStateMachine::default()).await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_callers_get_their_own_results() {
        let waiter = Arc::new(ApplyWaiter::new(local_log().await));

        let (send, mut recv) = mpsc::unbounded_channel();
        for n in 0..100u32 {
            let send_clone = send.clone();
            let waiter_clone = waiter.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(rand::random::<u64>() % 20)).await;
                let cmd = Command::CreateDataNode(CreateDataNode {
                    http_addr: format!("h{n}:8086"),
                    tcp_addr: format!("h{n}:8088"),
                });
                let resp = waiter_clone
                    .submit_and_wait(Proposal::encode(&cmd).unwrap(), None)
                    .await
                    .unwrap();
                let _ = send_clone.send((n, resp));
            });
        }

        drop(send);
        let mut ids = Vec::new();
        while let Some((n, resp)) = recv.recv().await {
            let MetaResponse::Node(node) = resp else { panic!("unexpected {resp:?}") };
            assert_eq!(node.tcp_addr, format!("h{n}:8088"));
            ids.push(node.id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=100).collect::<Vec<NodeId>>());
    }

    #[tokio::test]
    async fn identical_proposals_are_not_deduplicated() {
        let log = local_log().await;
        let waiter = ApplyWaiter::new(log.clone());

        waiter.submit_and_wait(create_db("dup"), None).await.unwrap();
        let err = waiter.submit_and_wait(create_db("dup"), None).await.unwrap_err();
        assert!(matches!(err, MetaError::Apply(ApplyError::DatabaseExists(_))));
        // Both entries went through the log.
        assert_eq!(log.applied_index(), 2);
        assert_eq!(log.state().last_applied().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn wait_is_bounded_by_the_deadline() {
        let waiter = ApplyWaiter::new(SlowLog::new(Duration::from_secs(30)));
        let started = Instant::now();
        let err = waiter
            .submit_and_wait(create_db("db"), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, MetaError::TimedOut(d) if d == Duration::from_millis(50)));
        assert!(!err.is_rejection());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn abort_cancels_the_helper_on_timeout() {
        let log = SlowLog::new(Duration::from_millis(100));
        let waiter = ApplyWaiter::new(log.clone()).with_on_timeout(OnTimeout::Abort);
        let err = waiter.submit_and_wait(create_db("db"), Some(Duration::from_millis(10))).await;
        assert!(matches!(err, Err(MetaError::TimedOut(_))));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(log.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn detach_lets_the_helper_finish() {
        let log = SlowLog::new(Duration::from_millis(100));
        let waiter = ApplyWaiter::new(log.clone()).with_on_timeout(OnTimeout::Detach);
        let err = waiter.submit_and_wait(create_db("db"), Some(Duration::from_millis(10))).await;
        assert!(matches!(err, Err(MetaError::TimedOut(_))));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(log.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn aborted_call_still_applies() {
        let log = local_log().await;
        let waiter = ApplyWaiter::new(log.clone());

        let call = waiter.submit(create_db("db"));
        assert_eq!(call.kind(), CommandKind::CreateDatabase);
        drop(call);

        // Whether the helper got as far as appending is a race; whatever was
        // appended is applied and a fresh call sees consistent state.
        let resp = waiter.submit_and_wait(create_db("other"), None).await.unwrap();
        assert!(matches!(resp, MetaResponse::Database(_)));
        assert!(log.state().data().await.unwrap().database("other").is_some());
    }

    #[tokio::test]
    async fn rejection_is_reported_without_waiting() {
        let log = local_log().await;
        log.step_down();
        let waiter = ApplyWaiter::new(log.clone());

        let started = Instant::now();
        let err = waiter.submit_and_wait(create_db("db"), None).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(started.elapsed() < ApplyWaiter::<LocalLog<MemLogStorage, MemStateMachine>>::DEFAULT_DEADLINE);
    }

    #[test]
    fn default_deadline_is_three_seconds() {
        let waiter = ApplyWaiter::new(SlowLog::new(Duration::ZERO));
        assert_eq!(waiter.default_deadline(), Duration::from_secs(3));
        let waiter = waiter.with_deadline(Duration::from_millis(500));
        assert_eq!(waiter.default_deadline(), Duration::from_millis(500));
    }
}
