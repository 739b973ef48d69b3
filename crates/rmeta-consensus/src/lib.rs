pub mod gate;
pub mod local;
pub mod waiter;

use std::future::Future;

use rmeta_types::{LogIndex, MetaError, MetaResponse, NodeId, Proposal};

pub use gate::ReadGate;
pub use local::{LocalLog, LocalLogConfig};
pub use waiter::{ApplyWaiter, OnTimeout, PendingCall};

// ---------------------------------------------------------------------------
// ReplicatedLog trait
// Uses RPITIT (Return Position Impl Trait In Trait, stable since Rust 1.75).
// The explicit `+ Send` bound on each future ensures generic callers can
// `.await` across thread boundaries.
// ---------------------------------------------------------------------------

/// The totally ordered decision log the gateway submits commands to.
pub trait ReplicatedLog: Send + Sync + 'static {
    fn node_id(&self) -> NodeId;

    /// Append `proposal` and block until its entry has been committed and
    /// applied, returning the state machine's result for exactly that entry.
    ///
    /// Fails fast with `NotLeader`/`Rejected` when the entry cannot be
    /// appended at all.
    fn propose(
        &self,
        proposal: Proposal,
    ) -> impl Future<Output = Result<MetaResponse, MetaError>> + Send;

    /// Confirm leadership and return the index every linearizable read must
    /// wait for. Fails with `MetaError::ReadIndex` when leadership is lost.
    fn read_index(&self) -> impl Future<Output = Result<LogIndex, MetaError>> + Send;

    /// Resolve once the local applied index reaches `index`.
    fn wait_applied(&self, index: LogIndex) -> impl Future<Output = Result<(), MetaError>> + Send;

    /// Local applied index. No leadership check; may be stale.
    fn applied_index(&self) -> LogIndex;
}
