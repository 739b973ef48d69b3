use std::time::Duration;

use crate::{CommandKind, NodeId};

/// Gateway-level error taxonomy.
///
/// `TimedOut` and `Indeterminate` are ambiguous by contract: the proposal may
/// still commit and apply afterwards. Never read either as "the command did
/// not happen".
#[derive(thiserror::Error, Debug)]
pub enum MetaError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("proposal rejected: {0}")]
    Rejected(String),
    #[error("not the leader; hint: {leader:?}")]
    NotLeader { leader: Option<NodeId> },
    #[error("timed out after {0:?} waiting for commit and apply; outcome unknown")]
    TimedOut(Duration),
    /// The entry reached the log but its result was lost.
    #[error("outcome unknown: {0}")]
    Indeterminate(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("read index unavailable: {0}")]
    ReadIndex(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unexpected response for {kind:?}")]
    UnexpectedResponse { kind: CommandKind },
    #[error("internal error: {0}")]
    Internal(String),
}

impl MetaError {
    /// True when the log refused the proposal before it entered the log.
    /// Such a failure carries no ambiguity about the outcome.
    pub fn is_rejection(&self) -> bool {
        matches!(self, MetaError::Rejected(_) | MetaError::NotLeader { .. })
    }
}

/// Domain failures raised by the state machine while applying a command.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("database name required")]
    DatabaseNameRequired,
    #[error("database already exists: {0}")]
    DatabaseExists(String),
    #[error("database not found: {0}")]
    DatabaseNotFound(String),
    #[error("retention policy name required")]
    RetentionPolicyNameRequired,
    #[error("retention policy not found: {0}")]
    RetentionPolicyNotFound(String),
    #[error("retention policy already exists: {0}")]
    RetentionPolicyExists(String),
    #[error("retention policy conflicts with an existing policy: {0}")]
    RetentionPolicyConflict(String),
    #[error("replication factor must be greater than 0")]
    ReplicationFactorTooLow,
    #[error("retention policy duration must be at least 1h")]
    RetentionPolicyDurationTooLow,
    #[error("retention policy duration must be greater than the shard duration")]
    IncompatibleDurations,
    #[error("shard group not found: {0}")]
    ShardGroupNotFound(u64),
    #[error("data node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("username required")]
    UsernameRequired,
    #[error("user already exists: {0}")]
    UserExists(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("password hash failed: {0}")]
    PasswordHash(String),
    #[error("continuous query already exists: {0}")]
    ContinuousQueryExists(String),
    #[error("continuous query not found: {0}")]
    ContinuousQueryNotFound(String),
    #[error("subscription already exists: {0}")]
    SubscriptionExists(String),
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
    #[error("lease {name} is held by node {owner}")]
    LeaseHeld { name: String, owner: NodeId },
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),
}
