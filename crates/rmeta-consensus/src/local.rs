//! Single-voter log.
//!
//! Appends are totally ordered under one async mutex and applied in index
//! order by a dedicated applier task. With one voter an appended entry is
//! committed, so `read_index` is simply the last appended index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use rmeta_storage::{LogEntry, LogStorage, StateMachineStore};
use rmeta_types::{LogIndex, MetaError, MetaResponse, NodeId, Proposal};

use crate::ReplicatedLog;

type Reply = Result<MetaResponse, MetaError>;

#[derive(Debug, Clone)]
pub struct LocalLogConfig {
    pub node_id: NodeId,
    /// Snapshot and purge the log every this many applied entries; `0` disables.
    pub snapshot_threshold: u64,
}

impl Default for LocalLogConfig {
    fn default() -> Self {
        LocalLogConfig { node_id: 1, snapshot_threshold: 1024 }
    }
}

struct AppendState {
    last_index: LogIndex,
    last_appended_at_ns: i64,
    /// `None` once the log is shut down.
    applier: Option<mpsc::UnboundedSender<LogEntry>>,
}

struct Inner<S, M> {
    config: LocalLogConfig,
    storage: S,
    state: M,
    append: Mutex<AppendState>,
    /// Last appended (and therefore committed) index.
    committed: AtomicU64,
    leader: AtomicBool,
    /// Waiters keyed by the index assigned at append.
    pending: Mutex<HashMap<LogIndex, oneshot::Sender<Reply>>>,
    applied: watch::Sender<LogIndex>,
}

pub struct LocalLog<S, M> {
    inner: Arc<Inner<S, M>>,
    applier: Mutex<Option<JoinHandle<()>>>,
}

impl<S: LogStorage, M: StateMachineStore> LocalLog<S, M> {
    /// Recover from `storage` into `state` and start the applier.
    ///
    /// Recovery installs the stored snapshot (if any) and replays every entry
    /// after it.
    pub async fn start(config: LocalLogConfig, storage: S, state: M) -> Result<Self, MetaError> {
        if let Some(snapshot) = storage.read_snapshot().await? {
            tracing::info!(
                snapshot_id = %snapshot.meta.snapshot_id,
                index = snapshot.meta.last_log_index,
                "installing snapshot"
            );
            state.install_snapshot(snapshot).await?;
        }

        let mut applied = state.last_applied().await?;
        // Seeds the append clock so timestamps keep rising across restarts.
        let mut last_appended_at_ns = state.data().await?.applied_at_ns;
        let log_state = storage.log_state().await?;
        let high_water = log_state.high_water().max(applied);
        if high_water > applied {
            for entry in storage.get_entries(applied + 1, high_water).await? {
                match state.apply(&entry).await {
                    Ok(_) | Err(MetaError::Apply(_) | MetaError::Decode(_)) => {}
                    // Skipped the same way the applier skips it.
                    Err(MetaError::Internal(e)) => {
                        tracing::warn!(index = entry.index, error = %e, "replayed entry failed to apply");
                    }
                    Err(e) => return Err(e),
                }
                applied = entry.index;
                last_appended_at_ns = last_appended_at_ns.max(entry.appended_at_ns);
            }
        }

        let (applied_tx, _) = watch::channel(applied);
        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            append: Mutex::new(AppendState {
                last_index: high_water,
                last_appended_at_ns,
                applier: Some(entry_tx),
            }),
            committed: AtomicU64::new(high_water),
            leader: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            applied: applied_tx,
            config,
            storage,
            state,
        });

        tracing::info!(
            node_id = inner.config.node_id,
            applied,
            last_index = high_water,
            "metadata log recovered"
        );

        let handle = tokio::spawn(run_applier(inner.clone(), entry_rx));
        Ok(LocalLog { inner, applier: Mutex::new(Some(handle)) })
    }

    pub fn state(&self) -> &M {
        &self.inner.state
    }

    pub fn is_leader(&self) -> bool {
        self.inner.leader.load(Ordering::Acquire)
    }

    /// Relinquish leadership: later proposals fail with `NotLeader` and read
    /// index requests with `ReadIndex`. Entries already appended still apply.
    pub fn step_down(&self) {
        if self.inner.leader.swap(false, Ordering::AcqRel) {
            tracing::warn!(node_id = self.inner.config.node_id, "stepped down");
        }
    }

    /// Step down, drain the applier and fail whatever is still waiting.
    pub async fn shutdown(&self) {
        self.step_down();
        // Dropping the sender lets the applier finish queued entries and exit.
        self.inner.append.lock().await.applier = None;
        if let Some(handle) = self.applier.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "applier task failed");
            }
        }
        let mut pending = self.inner.pending.lock().await;
        for (_, waiter) in pending.drain() {
            let err = MetaError::Indeterminate("log shut down before the entry applied".into());
            let _ = waiter.send(Err(err));
        }
        tracing::info!(node_id = self.inner.config.node_id, "metadata log stopped");
    }
}

impl<S: LogStorage, M: StateMachineStore> Inner<S, M> {
    /// Assign the next index, persist the entry and hand it to the applier.
    async fn append(&self, proposal: Proposal) -> Result<oneshot::Receiver<Reply>, MetaError> {
        let mut g = self.append.lock().await;
        if !self.leader.load(Ordering::Acquire) {
            return Err(MetaError::NotLeader { leader: None });
        }
        let applier = g
            .applier
            .clone()
            .ok_or_else(|| MetaError::Rejected("log is shut down".into()))?;
        if applier.is_closed() {
            return Err(MetaError::Rejected("applier stopped".into()));
        }

        let index = g.last_index + 1;
        // Appended timestamps never go backwards, even if the wall clock does.
        let appended_at_ns = now_ns().max(g.last_appended_at_ns);
        let kind = proposal.kind();
        let entry = LogEntry { index, appended_at_ns, proposal };

        self.storage.append(vec![entry.clone()]).await?;
        g.last_index = index;
        g.last_appended_at_ns = appended_at_ns;
        self.committed.store(index, Ordering::Release);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(index, tx);
        if applier.send(entry).is_err() {
            self.pending.lock().await.remove(&index);
            return Err(MetaError::Indeterminate(format!(
                "entry {index} persisted but the applier stopped"
            )));
        }
        tracing::trace!(index, %kind, "appended");
        Ok(rx)
    }

    async fn compact(&self) -> Result<(), MetaError> {
        let snapshot = self.state.build_snapshot().await?;
        let index = snapshot.meta.last_log_index;
        let snapshot_id = snapshot.meta.snapshot_id.clone();
        self.storage.save_snapshot(snapshot).await?;
        self.storage.purge(index).await?;
        tracing::debug!(index, %snapshot_id, "log compacted");
        Ok(())
    }
}

async fn run_applier<S: LogStorage, M: StateMachineStore>(
    inner: Arc<Inner<S, M>>,
    mut entries: mpsc::UnboundedReceiver<LogEntry>,
) {
    while let Some(entry) = entries.recv().await {
        let index = entry.index;
        let result = inner.state.apply(&entry).await;
        if let Err(e) = &result {
            if !matches!(e, MetaError::Apply(_) | MetaError::Decode(_)) {
                tracing::error!(index, error = %e, "apply failed");
            }
        }

        let threshold = inner.config.snapshot_threshold;
        if threshold > 0 && index % threshold == 0 {
            if let Err(e) = inner.compact().await {
                tracing::warn!(index, error = %e, "log compaction failed");
            }
        }

        inner.applied.send_replace(index);
        // The caller may have given up; its slot is released either way.
        if let Some(waiter) = inner.pending.lock().await.remove(&index) {
            let _ = waiter.send(result);
        }
    }
}

impl<S: LogStorage, M: StateMachineStore> ReplicatedLog for LocalLog<S, M> {
    fn node_id(&self) -> NodeId {
        self.inner.config.node_id
    }

    async fn propose(&self, proposal: Proposal) -> Result<MetaResponse, MetaError> {
        let inner = self.inner.clone();
        // Appending runs on its own task so a cancelled caller never leaves an
        // entry persisted but not handed to the applier.
        let rx = tokio::spawn(async move { inner.append(proposal).await })
            .await
            .map_err(|e| MetaError::Internal(e.to_string()))??;
        rx.await
            .map_err(|_| MetaError::Indeterminate("log stopped before the entry was applied".into()))?
    }

    async fn read_index(&self) -> Result<LogIndex, MetaError> {
        if !self.is_leader() {
            return Err(MetaError::ReadIndex("not the leader".into()));
        }
        Ok(self.inner.committed.load(Ordering::Acquire))
    }

    async fn wait_applied(&self, index: LogIndex) -> Result<(), MetaError> {
        let mut rx = self.inner.applied.subscribe();
        rx.wait_for(|applied| *applied >= index)
            .await
            .map(|_| ())
            .map_err(|_| MetaError::ReadIndex("applier stopped".into()))
    }

    fn applied_index(&self) -> LogIndex {
        *self.inner.applied.borrow()
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
