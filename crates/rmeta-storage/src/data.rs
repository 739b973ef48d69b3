//! Replicated cluster metadata and its deterministic transition function.
//!
//! Every mutation reads time only from the log entry being applied and never
//! performs I/O, so replicas applying the same entries end in the same state.

use std::collections::BTreeMap;

use rmeta_types::command::{
    AcquireLease, Authenticate, CreateContinuousQuery, CreateDataNode, CreateDatabase,
    CreateDatabaseWithRetentionPolicy, CreateRetentionPolicy, CreateSubscription, CreateUser, DeleteDataNode, DeleteShardGroup, DropContinuousQuery,
    DropDatabase, DropRetentionPolicy, DropShard, DropSubscription, DropUser,
    PrecreateShardGroups, SetAdminPrivilege, SetPrivilege, TruncateShardGroups,
    UpdateRetentionPolicy, UpdateUser,
};
use rmeta_types::meta::{DAY_NS, HOUR_NS, MIN_RETENTION_NS, WEEK_NS};
use rmeta_types::{
    ApplyError, Command, ContinuousQueryInfo, DatabaseInfo, Lease, LogIndex, MetaError,
    MetaResponse, NodeId, NodeInfo, RetentionPolicyInfo, RetentionPolicySpec, ShardGroupId,
    ShardGroupInfo, ShardInfo, SubscriptionInfo, UserInfo,
};

use crate::codec::{decode, encode};
use crate::state::StateMachineConfig;
use crate::types::LogEntry;

/// Deleted shard groups are kept this long before pruning drops them.
const PRUNE_AFTER_NS: i64 = DAY_NS as i64;

const SUBSCRIPTION_MODES: [&str; 2] = ["ALL", "ANY"];

/// The whole replicated metadata state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    /// Index of the last applied log entry.
    pub index: LogIndex,
    /// Append time of the last applied log entry.
    pub applied_at_ns: i64,
    pub max_node_id: NodeId,
    pub max_shard_group_id: ShardGroupId,
    pub max_shard_id: u64,
    pub data_nodes: Vec<NodeInfo>,
    pub databases: Vec<DatabaseInfo>,
    pub users: Vec<UserInfo>,
    pub leases: BTreeMap<String, Lease>,
}

impl MetaData {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MetaError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetaError> {
        decode(bytes)
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.iter().find(|db| db.name == name)
    }

    fn database_mut(&mut self, name: &str) -> Result<&mut DatabaseInfo, ApplyError> {
        self.databases
            .iter_mut()
            .find(|db| db.name == name)
            .ok_or_else(|| ApplyError::DatabaseNotFound(name.to_string()))
    }

    fn retention_policy_mut(
        &mut self,
        database: &str,
        policy: &str,
    ) -> Result<&mut RetentionPolicyInfo, ApplyError> {
        self.database_mut(database)?
            .retention_policy_mut(policy)
            .ok_or_else(|| ApplyError::RetentionPolicyNotFound(policy.to_string()))
    }

    pub fn user(&self, name: &str) -> Option<&UserInfo> {
        self.users.iter().find(|u| u.name == name)
    }

    fn user_mut(&mut self, name: &str) -> Result<&mut UserInfo, ApplyError> {
        self.users
            .iter_mut()
            .find(|u| u.name == name)
            .ok_or_else(|| ApplyError::UserNotFound(name.to_string()))
    }

    pub fn data_node(&self, id: NodeId) -> Option<&NodeInfo> {
        self.data_nodes.iter().find(|n| n.id == id)
    }

    /// Apply one log entry.
    ///
    /// The command runs against a copy that replaces `self` only on success,
    /// so a rejected command leaves no partial mutation behind. The applied
    /// index advances either way.
    pub fn apply(
        &mut self,
        entry: &LogEntry,
        config: &StateMachineConfig,
    ) -> Result<MetaResponse, MetaError> {
        self.index = entry.index;
        self.applied_at_ns = entry.appended_at_ns;
        let command = entry.proposal.decode()?;
        let mut next = self.clone();
        let response = next.execute(command, entry, config)?;
        *self = next;
        Ok(response)
    }

    fn execute(
        &mut self,
        command: Command,
        entry: &LogEntry,
        config: &StateMachineConfig,
    ) -> Result<MetaResponse, ApplyError> {
        let now = entry.appended_at_ns;
        match command {
            Command::CreateDatabase(c) => self.create_database(c, config),
            Command::DropDatabase(c) => self.drop_database(c),
            Command::CreateRetentionPolicy(c) => self.create_retention_policy(c),
            Command::DropRetentionPolicy(c) => self.drop_retention_policy(c),
            Command::UpdateRetentionPolicy(c) => self.update_retention_policy(c),
            Command::CreateDatabaseWithRetentionPolicy(c) => {
                self.create_database_with_retention_policy(c)
            }
            Command::CreateShardGroup(c) => self
                .create_shard_group(&c.database, &c.policy, c.timestamp)
                .map(MetaResponse::ShardGroup),
            Command::DeleteShardGroup(c) => self.delete_shard_group(c, now),
            Command::DropShard(c) => self.drop_shard(c, now),
            Command::TruncateShardGroups(c) => self.truncate_shard_groups(c),
            Command::PruneShardGroups(_) => self.prune_shard_groups(now),
            Command::PrecreateShardGroups(c) => self.precreate_shard_groups(c),
            Command::CreateDataNode(c) => self.create_data_node(c),
            Command::DeleteDataNode(c) => self.delete_data_node(c),
            Command::CreateUser(c) => self.create_user(c, entry, config),
            Command::DropUser(c) => self.drop_user(c),
            Command::UpdateUser(c) => self.update_user(c, entry, config),
            Command::SetPrivilege(c) => self.set_privilege(c),
            Command::SetAdminPrivilege(c) => self.set_admin_privilege(c),
            Command::Authenticate(c) => self.authenticate(c),
            Command::CreateContinuousQuery(c) => self.create_continuous_query(c),
            Command::DropContinuousQuery(c) => self.drop_continuous_query(c),
            Command::CreateSubscription(c) => self.create_subscription(c),
            Command::DropSubscription(c) => self.drop_subscription(c),
            Command::AcquireLease(c) => self.acquire_lease(c, now, config),
        }
    }

    // -----------------------------------------------------------------------
    // Databases and retention policies
    // -----------------------------------------------------------------------

    fn create_database(
        &mut self,
        c: CreateDatabase,
        config: &StateMachineConfig,
    ) -> Result<MetaResponse, ApplyError> {
        if c.name.is_empty() {
            return Err(ApplyError::DatabaseNameRequired);
        }
        if self.database(&c.name).is_some() {
            return Err(ApplyError::DatabaseExists(c.name));
        }

        let mut db = DatabaseInfo {
            name: c.name,
            default_retention_policy: String::new(),
            retention_policies: Vec::new(),
            continuous_queries: Vec::new(),
        };
        if let Some(rp_name) = &config.default_retention_policy {
            let rp = new_retention_policy(&RetentionPolicySpec {
                name: rp_name.clone(),
                replica_n: 1,
                duration: 0,
                shard_group_duration: 0,
            })?;
            db.default_retention_policy = rp.name.clone();
            db.retention_policies.push(rp);
        }
        self.databases.push(db.clone());
        Ok(MetaResponse::Database(db))
    }

    fn drop_database(&mut self, c: DropDatabase) -> Result<MetaResponse, ApplyError> {
        self.databases.retain(|db| db.name != c.name);
        for user in &mut self.users {
            user.privileges.remove(&c.name);
        }
        Ok(MetaResponse::Empty)
    }

    fn create_retention_policy(
        &mut self,
        c: CreateRetentionPolicy,
    ) -> Result<MetaResponse, ApplyError> {
        let rp = new_retention_policy(&c.spec)?;
        let db = self.database_mut(&c.database)?;

        if let Some(existing) = db.retention_policy(&rp.name) {
            let already_default = db.default_retention_policy == rp.name;
            if same_shape(existing, &rp) && (!c.make_default || already_default) {
                return Ok(MetaResponse::RetentionPolicy(existing.clone()));
            }
            return Err(ApplyError::RetentionPolicyConflict(rp.name));
        }

        if c.make_default {
            db.default_retention_policy = rp.name.clone();
        }
        db.retention_policies.push(rp.clone());
        Ok(MetaResponse::RetentionPolicy(rp))
    }

    fn drop_retention_policy(&mut self, c: DropRetentionPolicy) -> Result<MetaResponse, ApplyError> {
        let db = self.database_mut(&c.database)?;
        db.retention_policies.retain(|rp| rp.name != c.policy);
        if db.default_retention_policy == c.policy {
            db.default_retention_policy.clear();
        }
        Ok(MetaResponse::Empty)
    }

    fn update_retention_policy(
        &mut self,
        c: UpdateRetentionPolicy,
    ) -> Result<MetaResponse, ApplyError> {
        let db = self.database_mut(&c.database)?;
        let current = db
            .retention_policy(&c.name)
            .ok_or_else(|| ApplyError::RetentionPolicyNotFound(c.name.clone()))?;

        let new_name = match c.update.name {
            Some(name) if name.is_empty() => return Err(ApplyError::RetentionPolicyNameRequired),
            Some(name) => name,
            None => c.name.clone(),
        };
        if new_name != c.name && db.retention_policy(&new_name).is_some() {
            return Err(ApplyError::RetentionPolicyExists(new_name));
        }

        let replica_n = c.update.replica_n.unwrap_or(current.replica_n);
        let duration = c.update.duration.unwrap_or(current.duration);
        let shard_group_duration = match c.update.shard_group_duration {
            Some(0) => normalized_shard_group_duration(duration),
            Some(d) => d,
            None => current.shard_group_duration,
        };
        validate_policy(replica_n, duration, shard_group_duration)?;

        if db.default_retention_policy == c.name || c.make_default {
            db.default_retention_policy = new_name.clone();
        }
        let rp = db
            .retention_policy_mut(&c.name)
            .ok_or_else(|| ApplyError::RetentionPolicyNotFound(c.name.clone()))?;
        rp.name = new_name;
        rp.replica_n = replica_n;
        rp.duration = duration;
        rp.shard_group_duration = shard_group_duration;
        Ok(MetaResponse::Empty)
    }

    fn create_database_with_retention_policy(
        &mut self,
        c: CreateDatabaseWithRetentionPolicy,
    ) -> Result<MetaResponse, ApplyError> {
        if c.name.is_empty() {
            return Err(ApplyError::DatabaseNameRequired);
        }
        let rp = new_retention_policy(&c.spec)?;

        if let Some(db) = self.database(&c.name) {
            let matches = db
                .retention_policy(&rp.name)
                .map(|existing| same_shape(existing, &rp))
                .unwrap_or(false);
            if matches && db.default_retention_policy == rp.name {
                return Ok(MetaResponse::Database(db.clone()));
            }
            return Err(ApplyError::RetentionPolicyConflict(rp.name));
        }

        let db = DatabaseInfo {
            name: c.name,
            default_retention_policy: rp.name.clone(),
            retention_policies: vec![rp],
            continuous_queries: Vec::new(),
        };
        self.databases.push(db.clone());
        Ok(MetaResponse::Database(db))
    }

    // -----------------------------------------------------------------------
    // Shard groups
    // -----------------------------------------------------------------------

    /// Return the live group covering `timestamp`, creating it if needed.
    fn create_shard_group(
        &mut self,
        database: &str,
        policy: &str,
        timestamp: i64,
    ) -> Result<ShardGroupInfo, ApplyError> {
        let rp = self.retention_policy_mut(database, policy)?;
        if let Some(sg) = rp.shard_group_by_timestamp(timestamp) {
            return Ok(sg.clone());
        }
        let group_duration = i64::try_from(rp.shard_group_duration).unwrap_or(i64::MAX).max(1);
        let start_time = timestamp
            .div_euclid(group_duration)
            .checked_mul(group_duration)
            .ok_or_else(|| {
                ApplyError::InvalidTimeRange(format!("no shard group can start before {timestamp}"))
            })?;
        let replica_n = rp.replica_n as usize;

        let mut nodes: Vec<NodeId> = self.data_nodes.iter().map(|n| n.id).collect();
        nodes.sort_unstable();

        self.max_shard_group_id += 1;
        let group_id = self.max_shard_group_id;

        // With no data nodes the group still gets one unowned shard.
        let (shard_n, owners_per_shard) = if nodes.is_empty() {
            (1, 0)
        } else {
            let replicas = replica_n.clamp(1, nodes.len());
            ((nodes.len() / replicas).max(1), replicas)
        };

        let mut next_owner = if nodes.is_empty() { 0 } else { group_id as usize % nodes.len() };
        let mut shards = Vec::with_capacity(shard_n);
        for _ in 0..shard_n {
            self.max_shard_id += 1;
            let mut owners = Vec::with_capacity(owners_per_shard);
            for _ in 0..owners_per_shard {
                owners.push(nodes[next_owner % nodes.len()]);
                next_owner += 1;
            }
            shards.push(ShardInfo { id: self.max_shard_id, owners });
        }

        let sg = ShardGroupInfo {
            id: group_id,
            start_time,
            end_time: start_time.saturating_add(group_duration),
            deleted_at: None,
            truncated_at: None,
            shards,
        };

        let rp = self.retention_policy_mut(database, policy)?;
        rp.shard_groups.push(sg.clone());
        rp.shard_groups.sort_by_key(|g| (g.start_time, g.id));
        Ok(sg)
    }

    fn delete_shard_group(&mut self, c: DeleteShardGroup, now: i64) -> Result<MetaResponse, ApplyError> {
        let rp = self.retention_policy_mut(&c.database, &c.policy)?;
        let sg = rp
            .shard_groups
            .iter_mut()
            .find(|sg| sg.id == c.id)
            .ok_or(ApplyError::ShardGroupNotFound(c.id))?;
        if sg.deleted_at.is_none() {
            sg.deleted_at = Some(now);
        }
        Ok(MetaResponse::Empty)
    }

    /// Removing an unknown shard is a no-op.
    fn drop_shard(&mut self, c: DropShard, now: i64) -> Result<MetaResponse, ApplyError> {
        for sg in self.shard_groups_mut() {
            let before = sg.shards.len();
            sg.shards.retain(|s| s.id != c.id);
            if sg.shards.len() != before {
                if sg.shards.is_empty() && sg.deleted_at.is_none() {
                    sg.deleted_at = Some(now);
                }
                break;
            }
        }
        Ok(MetaResponse::Empty)
    }

    fn truncate_shard_groups(&mut self, c: TruncateShardGroups) -> Result<MetaResponse, ApplyError> {
        let t = c.time;
        for sg in self.shard_groups_mut() {
            if sg.is_deleted() || t >= sg.end_time {
                continue;
            }
            if matches!(sg.truncated_at, Some(at) if t > at) {
                continue;
            }
            sg.truncated_at = Some(t.max(sg.start_time));
        }
        Ok(MetaResponse::Empty)
    }

    fn prune_shard_groups(&mut self, now: i64) -> Result<MetaResponse, ApplyError> {
        let expiration = now.saturating_sub(PRUNE_AFTER_NS);
        for db in &mut self.databases {
            for rp in &mut db.retention_policies {
                rp.shard_groups
                    .retain(|sg| sg.deleted_at.map_or(true, |at| at >= expiration));
            }
        }
        Ok(MetaResponse::Empty)
    }

    /// Create the successor of every policy's newest live group whose end
    /// falls inside `(from, to)`.
    fn precreate_shard_groups(&mut self, c: PrecreateShardGroups) -> Result<MetaResponse, ApplyError> {
        if c.from > c.to {
            return Err(ApplyError::InvalidTimeRange(format!("from {} > to {}", c.from, c.to)));
        }
        let mut due = Vec::new();
        for db in &self.databases {
            for rp in &db.retention_policies {
                let Some(last) = rp.shard_groups.iter().filter(|sg| !sg.is_deleted()).last() else {
                    continue;
                };
                if last.end_time > c.from && last.end_time < c.to {
                    due.push((db.name.clone(), rp.name.clone(), last.end_time));
                }
            }
        }
        for (database, policy, next_start) in due {
            let sg = self.create_shard_group(&database, &policy, next_start)?;
            tracing::debug!(%database, %policy, shard_group = sg.id, "precreated shard group");
        }
        Ok(MetaResponse::Empty)
    }

    fn shard_groups_mut(&mut self) -> impl Iterator<Item = &mut ShardGroupInfo> + '_ {
        self.databases
            .iter_mut()
            .flat_map(|db| db.retention_policies.iter_mut())
            .flat_map(|rp| rp.shard_groups.iter_mut())
    }

    // -----------------------------------------------------------------------
    // Data nodes
    // -----------------------------------------------------------------------

    /// Re-registering a known TCP address returns the existing node.
    fn create_data_node(&mut self, c: CreateDataNode) -> Result<MetaResponse, ApplyError> {
        if let Some(node) = self.data_nodes.iter().find(|n| n.tcp_addr == c.tcp_addr) {
            return Ok(MetaResponse::Node(node.clone()));
        }
        self.max_node_id += 1;
        let node = NodeInfo { id: self.max_node_id, http_addr: c.http_addr, tcp_addr: c.tcp_addr };
        self.data_nodes.push(node.clone());
        Ok(MetaResponse::Node(node))
    }

    fn delete_data_node(&mut self, c: DeleteDataNode) -> Result<MetaResponse, ApplyError> {
        let before = self.data_nodes.len();
        self.data_nodes.retain(|n| n.id != c.id);
        if self.data_nodes.len() == before {
            return Err(ApplyError::NodeNotFound(c.id));
        }
        for sg in self.shard_groups_mut() {
            for shard in &mut sg.shards {
                shard.owners.retain(|owner| *owner != c.id);
            }
        }
        Ok(MetaResponse::Empty)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    fn create_user(
        &mut self,
        c: CreateUser,
        entry: &LogEntry,
        config: &StateMachineConfig,
    ) -> Result<MetaResponse, ApplyError> {
        if c.name.is_empty() {
            return Err(ApplyError::UsernameRequired);
        }
        if self.user(&c.name).is_some() {
            return Err(ApplyError::UserExists(c.name));
        }
        let user = UserInfo {
            hash: hash_password(&c.password, entry, config)?,
            name: c.name,
            admin: c.admin,
            privileges: BTreeMap::new(),
        };
        self.users.push(user.clone());
        Ok(MetaResponse::User(user))
    }

    fn drop_user(&mut self, c: DropUser) -> Result<MetaResponse, ApplyError> {
        let before = self.users.len();
        self.users.retain(|u| u.name != c.name);
        if self.users.len() == before {
            return Err(ApplyError::UserNotFound(c.name));
        }
        Ok(MetaResponse::Empty)
    }

    fn update_user(
        &mut self,
        c: UpdateUser,
        entry: &LogEntry,
        config: &StateMachineConfig,
    ) -> Result<MetaResponse, ApplyError> {
        let hash = hash_password(&c.password, entry, config)?;
        self.user_mut(&c.name)?.hash = hash;
        Ok(MetaResponse::Empty)
    }

    fn set_privilege(&mut self, c: SetPrivilege) -> Result<MetaResponse, ApplyError> {
        if self.database(&c.database).is_none() {
            return Err(ApplyError::DatabaseNotFound(c.database));
        }
        self.user_mut(&c.user_name)?
            .privileges
            .insert(c.database, c.privilege);
        Ok(MetaResponse::Empty)
    }

    fn set_admin_privilege(&mut self, c: SetAdminPrivilege) -> Result<MetaResponse, ApplyError> {
        self.user_mut(&c.user_name)?.admin = c.admin;
        Ok(MetaResponse::Empty)
    }

    /// Unknown users and wrong passwords fail identically.
    fn authenticate(&self, c: Authenticate) -> Result<MetaResponse, ApplyError> {
        let user = self.user(&c.user_name).ok_or(ApplyError::AuthenticationFailed)?;
        match bcrypt::verify(&c.password, &user.hash) {
            Ok(true) => Ok(MetaResponse::User(user.clone())),
            _ => Err(ApplyError::AuthenticationFailed),
        }
    }

    // -----------------------------------------------------------------------
    // Continuous queries and subscriptions
    // -----------------------------------------------------------------------

    fn create_continuous_query(&mut self, c: CreateContinuousQuery) -> Result<MetaResponse, ApplyError> {
        let db = self.database_mut(&c.database)?;
        if let Some(cq) = db.continuous_queries.iter().find(|cq| cq.name == c.name) {
            if cq.query == c.query {
                return Ok(MetaResponse::Empty);
            }
            return Err(ApplyError::ContinuousQueryExists(c.name));
        }
        db.continuous_queries.push(ContinuousQueryInfo { name: c.name, query: c.query });
        Ok(MetaResponse::Empty)
    }

    fn drop_continuous_query(&mut self, c: DropContinuousQuery) -> Result<MetaResponse, ApplyError> {
        let db = self.database_mut(&c.database)?;
        let before = db.continuous_queries.len();
        db.continuous_queries.retain(|cq| cq.name != c.name);
        if db.continuous_queries.len() == before {
            return Err(ApplyError::ContinuousQueryNotFound(c.name));
        }
        Ok(MetaResponse::Empty)
    }

    fn create_subscription(&mut self, c: CreateSubscription) -> Result<MetaResponse, ApplyError> {
        let mode = c.mode.to_ascii_uppercase();
        if !SUBSCRIPTION_MODES.contains(&mode.as_str()) {
            return Err(ApplyError::InvalidSubscription(format!("unknown mode {:?}", c.mode)));
        }
        if c.destinations.is_empty() {
            return Err(ApplyError::InvalidSubscription("at least one destination required".into()));
        }
        let rp = self.retention_policy_mut(&c.database, &c.rp)?;
        if rp.subscriptions.iter().any(|s| s.name == c.name) {
            return Err(ApplyError::SubscriptionExists(c.name));
        }
        rp.subscriptions.push(SubscriptionInfo {
            name: c.name,
            mode,
            destinations: c.destinations,
        });
        Ok(MetaResponse::Empty)
    }

    fn drop_subscription(&mut self, c: DropSubscription) -> Result<MetaResponse, ApplyError> {
        let rp = self.retention_policy_mut(&c.database, &c.rp)?;
        let before = rp.subscriptions.len();
        rp.subscriptions.retain(|s| s.name != c.name);
        if rp.subscriptions.len() == before {
            return Err(ApplyError::SubscriptionNotFound(c.name));
        }
        Ok(MetaResponse::Empty)
    }

    // -----------------------------------------------------------------------
    // Leases
    // -----------------------------------------------------------------------

    /// Grant when free, expired, or already held by the caller.
    fn acquire_lease(
        &mut self,
        c: AcquireLease,
        now: i64,
        config: &StateMachineConfig,
    ) -> Result<MetaResponse, ApplyError> {
        if let Some(current) = self.leases.get(&c.name) {
            if current.expiration > now && current.owner != c.node_id {
                return Err(ApplyError::LeaseHeld { name: c.name, owner: current.owner });
            }
        }
        let duration = i64::try_from(config.lease_duration.as_nanos()).unwrap_or(i64::MAX);
        let lease = Lease {
            name: c.name.clone(),
            owner: c.node_id,
            expiration: now.saturating_add(duration),
        };
        self.leases.insert(c.name, lease.clone());
        Ok(MetaResponse::Lease(lease))
    }
}

/// Shard group duration derived from a policy's retention.
pub fn normalized_shard_group_duration(duration: u64) -> u64 {
    if duration == 0 || duration >= 180 * DAY_NS {
        WEEK_NS
    } else if duration >= 2 * DAY_NS {
        DAY_NS
    } else {
        HOUR_NS
    }
}

fn validate_policy(replica_n: u32, duration: u64, shard_group_duration: u64) -> Result<(), ApplyError> {
    if replica_n < 1 {
        return Err(ApplyError::ReplicationFactorTooLow);
    }
    if duration != 0 && duration < MIN_RETENTION_NS {
        return Err(ApplyError::RetentionPolicyDurationTooLow);
    }
    if duration != 0 && shard_group_duration > duration {
        return Err(ApplyError::IncompatibleDurations);
    }
    Ok(())
}

fn new_retention_policy(spec: &RetentionPolicySpec) -> Result<RetentionPolicyInfo, ApplyError> {
    if spec.name.is_empty() {
        return Err(ApplyError::RetentionPolicyNameRequired);
    }
    let shard_group_duration = match spec.shard_group_duration {
        0 => normalized_shard_group_duration(spec.duration),
        d => d,
    };
    validate_policy(spec.replica_n, spec.duration, shard_group_duration)?;
    Ok(RetentionPolicyInfo {
        name: spec.name.clone(),
        replica_n: spec.replica_n,
        duration: spec.duration,
        shard_group_duration,
        shard_groups: Vec::new(),
        subscriptions: Vec::new(),
    })
}

fn same_shape(a: &RetentionPolicyInfo, b: &RetentionPolicyInfo) -> bool {
    a.replica_n == b.replica_n
        && a.duration == b.duration
        && a.shard_group_duration == b.shard_group_duration
}

/// bcrypt with a salt taken from the log entry: random salts would give every
/// replica a different hash for the same command.
fn hash_password(
    password: &str,
    entry: &LogEntry,
    config: &StateMachineConfig,
) -> Result<String, ApplyError> {
    let mut salt = [0u8; 16];
    salt[..8].copy_from_slice(&entry.index.to_be_bytes());
    salt[8..].copy_from_slice(&entry.appended_at_ns.to_be_bytes());
    bcrypt::hash_with_salt(password, config.password_hash_cost, salt)
        .map(|parts| parts.format_for_version(bcrypt::Version::TwoB))
        .map_err(|e| ApplyError::PasswordHash(e.to_string()))
}
