use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::command::*;
use crate::meta::{DatabaseInfo, Lease, NodeInfo, RetentionPolicyInfo, ShardGroupInfo, UserInfo};
use crate::MetaError;

/// Value produced by the state machine for one applied command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaResponse {
    Empty,
    Database(DatabaseInfo),
    RetentionPolicy(RetentionPolicyInfo),
    ShardGroup(ShardGroupInfo),
    Node(NodeInfo),
    User(UserInfo),
    Lease(Lease),
}

/// Binds a request payload to its command kind and typed result.
pub trait MetaRequest: DeserializeOwned + Send + 'static {
    const KIND: CommandKind;
    /// Reply field that carries the result, `None` when there is no result.
    const RESULT_FIELD: Option<&'static str>;
    type Output: Serialize + Send + 'static;

    fn into_command(self) -> Command;

    fn extract(response: MetaResponse) -> Result<Self::Output, MetaError>;
}

macro_rules! bind_result {
    ($req:ident => $variant:ident($out:ty) as $field:literal) => {
        impl MetaRequest for $req {
            const KIND: CommandKind = CommandKind::$req;
            const RESULT_FIELD: Option<&'static str> = Some($field);
            type Output = $out;

            fn into_command(self) -> Command {
                Command::$req(self)
            }

            fn extract(response: MetaResponse) -> Result<$out, MetaError> {
                match response {
                    MetaResponse::$variant(v) => Ok(v),
                    _ => Err(MetaError::UnexpectedResponse { kind: CommandKind::$req }),
                }
            }
        }
    };
    ($req:ident => ()) => {
        impl MetaRequest for $req {
            const KIND: CommandKind = CommandKind::$req;
            const RESULT_FIELD: Option<&'static str> = None;
            type Output = ();

            fn into_command(self) -> Command {
                Command::$req(self)
            }

            fn extract(response: MetaResponse) -> Result<(), MetaError> {
                match response {
                    MetaResponse::Empty => Ok(()),
                    _ => Err(MetaError::UnexpectedResponse { kind: CommandKind::$req }),
                }
            }
        }
    };
}

bind_result!(CreateDatabase => Database(DatabaseInfo) as "dbInfo");
bind_result!(DropDatabase => ());
bind_result!(CreateRetentionPolicy => RetentionPolicy(RetentionPolicyInfo) as "retentionPolicyInfo");
bind_result!(DropRetentionPolicy => ());
bind_result!(UpdateRetentionPolicy => ());
bind_result!(CreateDatabaseWithRetentionPolicy => Database(DatabaseInfo) as "dbInfo");
bind_result!(CreateShardGroup => ShardGroup(ShardGroupInfo) as "shardGroupInfo");
bind_result!(DeleteShardGroup => ());
bind_result!(DropShard => ());
bind_result!(TruncateShardGroups => ());
bind_result!(PruneShardGroups => ());
bind_result!(PrecreateShardGroups => ());
bind_result!(CreateDataNode => Node(NodeInfo) as "nodeInfo");
bind_result!(DeleteDataNode => ());
bind_result!(CreateUser => User(UserInfo) as "userInfo");
bind_result!(DropUser => ());
bind_result!(UpdateUser => ());
bind_result!(SetPrivilege => ());
bind_result!(SetAdminPrivilege => ());
bind_result!(Authenticate => User(UserInfo) as "userInfo");
bind_result!(CreateContinuousQuery => ());
bind_result!(DropContinuousQuery => ());
bind_result!(CreateSubscription => ());
bind_result!(DropSubscription => ());
bind_result!(AcquireLease => Lease(Lease) as "lease");
