use std::future::Future;

use rmeta_types::{LogIndex, MetaError, MetaResponse};

use crate::data::MetaData;
use crate::types::{LogEntry, LogState, Snapshot};

/// Durable storage for the metadata log.
///
/// Methods use RPITIT (`-> impl Future + Send`) like `ReplicatedLog` in
/// `rmeta-consensus`, so no `async-trait` dependency is needed.
pub trait LogStorage: Send + Sync + 'static {
    /// Return first index, last index, and last purged index.
    fn log_state(&self) -> impl Future<Output = Result<LogState, MetaError>> + Send;

    /// Return all entries in the inclusive range `[from, to_inclusive]`.
    fn get_entries(
        &self,
        from: LogIndex,
        to_inclusive: LogIndex,
    ) -> impl Future<Output = Result<Vec<LogEntry>, MetaError>> + Send;

    /// Append entries, overwriting any existing entry at the same index.
    fn append(&self, entries: Vec<LogEntry>) -> impl Future<Output = Result<(), MetaError>> + Send;

    /// Delete all entries with `index <= up_to_index` and record
    /// `last_purged_index`.
    fn purge(&self, up_to_index: LogIndex) -> impl Future<Output = Result<(), MetaError>> + Send;

    /// Durably replace the stored snapshot.
    fn save_snapshot(&self, snapshot: Snapshot)
        -> impl Future<Output = Result<(), MetaError>> + Send;

    fn read_snapshot(&self) -> impl Future<Output = Result<Option<Snapshot>, MetaError>> + Send;
}

/// The deterministic metadata state machine the log applies entries to.
pub trait StateMachineStore: Send + Sync + 'static {
    /// Index of the last applied entry, `0` before the first apply.
    fn last_applied(&self) -> impl Future<Output = Result<LogIndex, MetaError>> + Send;

    /// Apply one committed entry.
    ///
    /// Entries must arrive in index order. A domain failure is returned as
    /// `MetaError::Apply`; the state is left unchanged but the entry still
    /// counts as applied.
    fn apply(&self, entry: &LogEntry)
        -> impl Future<Output = Result<MetaResponse, MetaError>> + Send;

    /// Point-in-time copy of the whole state.
    fn data(&self) -> impl Future<Output = Result<MetaData, MetaError>> + Send;

    fn build_snapshot(&self) -> impl Future<Output = Result<Snapshot, MetaError>> + Send;

    /// Replace the state with a snapshot's contents.
    fn install_snapshot(&self, snapshot: Snapshot)
        -> impl Future<Output = Result<(), MetaError>> + Send;
}
