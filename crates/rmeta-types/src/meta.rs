use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NodeId, ShardGroupId, ShardId};

pub const HOUR_NS: u64 = 3_600_000_000_000;
pub const DAY_NS: u64 = 24 * HOUR_NS;
pub const WEEK_NS: u64 = 7 * DAY_NS;

/// Shortest finite retention a policy may declare.
pub const MIN_RETENTION_NS: u64 = HOUR_NS;

/// A data node registered with the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub id: NodeId,
    pub http_addr: String,
    pub tcp_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    /// Empty when the database has no default policy.
    pub default_retention_policy: String,
    pub retention_policies: Vec<RetentionPolicyInfo>,
    pub continuous_queries: Vec<ContinuousQueryInfo>,
}

impl DatabaseInfo {
    pub fn retention_policy(&self, name: &str) -> Option<&RetentionPolicyInfo> {
        self.retention_policies.iter().find(|rp| rp.name == name)
    }

    pub fn retention_policy_mut(&mut self, name: &str) -> Option<&mut RetentionPolicyInfo> {
        self.retention_policies.iter_mut().find(|rp| rp.name == name)
    }
}

/// Requested shape of a retention policy.
///
/// Durations are nanoseconds. `duration == 0` means data is kept forever;
/// `shard_group_duration == 0` asks the state machine to derive one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicySpec {
    pub name: String,
    pub replica_n: u32,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub shard_group_duration: u64,
}

/// Partial update of an existing retention policy; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicyUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub replica_n: Option<u32>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub shard_group_duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicyInfo {
    pub name: String,
    pub replica_n: u32,
    pub duration: u64,
    pub shard_group_duration: u64,
    pub shard_groups: Vec<ShardGroupInfo>,
    pub subscriptions: Vec<SubscriptionInfo>,
}

impl RetentionPolicyInfo {
    /// The non-deleted shard group whose `[start, end)` range contains `ts`.
    pub fn shard_group_by_timestamp(&self, ts: i64) -> Option<&ShardGroupInfo> {
        self.shard_groups
            .iter()
            .find(|sg| !sg.is_deleted() && sg.contains(ts))
    }
}

/// Time is Unix nanoseconds. The group covers `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardGroupInfo {
    pub id: ShardGroupId,
    pub start_time: i64,
    pub end_time: i64,
    pub deleted_at: Option<i64>,
    pub truncated_at: Option<i64>,
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start_time && ts < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardInfo {
    pub id: ShardId,
    pub owners: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub name: String,
    pub mode: String,
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousQueryInfo {
    pub name: String,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    #[serde(rename = "NO PRIVILEGES")]
    NoPrivileges,
    Read,
    Write,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub name: String,
    /// bcrypt hash; never the plaintext password.
    pub hash: String,
    pub admin: bool,
    /// database name → privilege
    pub privileges: BTreeMap<String, Privilege>,
}

/// Cluster-wide named lease. `expiration` is Unix nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub name: String,
    pub owner: NodeId,
    pub expiration: i64,
}
