pub mod command;
pub mod error;
pub mod meta;
pub mod response;

pub type NodeId = u64;
pub type LogIndex = u64;
pub type ShardGroupId = u64;
pub type ShardId = u64;

pub use command::{Command, CommandKind, Proposal};
pub use error::{ApplyError, MetaError};
pub use meta::{
    ContinuousQueryInfo, DatabaseInfo, Lease, NodeInfo, Privilege, RetentionPolicyInfo,
    RetentionPolicySpec, RetentionPolicyUpdate, ShardGroupInfo, ShardInfo, SubscriptionInfo,
    UserInfo,
};
pub use response::{MetaRequest, MetaResponse};
