//! Command registry and proposal envelope.
//!
//! Every metadata mutation is one [`Command`] variant wrapping a payload struct
//! of the same name. [`CommandKind`] tags are written into the log and must
//! never be renumbered; add new kinds with fresh tags at the end of the table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::meta::{Privilege, RetentionPolicySpec, RetentionPolicyUpdate};
use crate::{MetaError, NodeId, ShardGroupId, ShardId};

macro_rules! command_registry {
    ($($kind:ident = $tag:literal),+ $(,)?) => {
        /// Stable tag identifying the payload schema of a [`Proposal`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "u16", try_from = "u16")]
        #[repr(u16)]
        pub enum CommandKind {
            $($kind = $tag),+
        }

        impl CommandKind {
            pub const ALL: &'static [CommandKind] = &[$(CommandKind::$kind),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(CommandKind::$kind => stringify!($kind)),+
                }
            }
        }

        impl TryFrom<u16> for CommandKind {
            type Error = MetaError;

            fn try_from(tag: u16) -> Result<Self, MetaError> {
                match tag {
                    $($tag => Ok(CommandKind::$kind),)+
                    other => Err(MetaError::Decode(format!("unknown command tag {other}"))),
                }
            }
        }

        /// A typed metadata mutation.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Command {
            $($kind($kind)),+
        }

        impl Command {
            pub fn kind(&self) -> CommandKind {
                match self {
                    $(Command::$kind(_) => CommandKind::$kind),+
                }
            }

            fn encode_payload(&self) -> serde_json::Result<Vec<u8>> {
                match self {
                    $(Command::$kind(payload) => serde_json::to_vec(payload)),+
                }
            }

            fn decode_payload(kind: CommandKind, payload: &[u8]) -> serde_json::Result<Self> {
                match kind {
                    $(CommandKind::$kind => serde_json::from_slice(payload).map(Command::$kind)),+
                }
            }
        }
    };
}

command_registry! {
    CreateDatabase = 1,
    DropDatabase = 2,
    CreateRetentionPolicy = 3,
    DropRetentionPolicy = 4,
    UpdateRetentionPolicy = 5,
    CreateDatabaseWithRetentionPolicy = 6,
    CreateShardGroup = 7,
    DeleteShardGroup = 8,
    DropShard = 9,
    TruncateShardGroups = 10,
    PruneShardGroups = 11,
    PrecreateShardGroups = 12,
    CreateDataNode = 13,
    DeleteDataNode = 14,
    CreateUser = 15,
    DropUser = 16,
    UpdateUser = 17,
    SetPrivilege = 18,
    SetAdminPrivilege = 19,
    Authenticate = 20,
    CreateContinuousQuery = 21,
    DropContinuousQuery = 22,
    CreateSubscription = 23,
    DropSubscription = 24,
    AcquireLease = 25,
}

impl From<CommandKind> for u16 {
    fn from(kind: CommandKind) -> u16 {
        kind as u16
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// The unit submitted to the replicated log: a kind tag plus the serialized
/// payload. Fields are private so a proposal cannot change after it is built.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    kind: CommandKind,
    payload: Vec<u8>,
}

impl Proposal {
    pub fn encode(command: &Command) -> Result<Self, MetaError> {
        let payload = command
            .encode_payload()
            .map_err(|e| MetaError::Internal(format!("encode {}: {e}", command.kind())))?;
        Ok(Proposal { kind: command.kind(), payload })
    }

    /// Wrap an already-serialized payload. Nothing is validated until
    /// [`Proposal::decode`].
    pub fn from_parts(kind: CommandKind, payload: Vec<u8>) -> Self {
        Proposal { kind, payload }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode(&self) -> Result<Command, MetaError> {
        Command::decode_payload(self.kind, &self.payload)
            .map_err(|e| MetaError::Decode(format!("{} payload: {e}", self.kind)))
    }
}

// Payloads can carry passwords; only the shape is printed. The encoded payload
// itself keeps the plaintext: CreateUser, UpdateUser and Authenticate entries
// sit in the persisted log until compaction purges them.
impl fmt::Debug for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proposal")
            .field("kind", &self.kind)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Payload schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabase {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropDatabase {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRetentionPolicy {
    pub database: String,
    pub spec: RetentionPolicySpec,
    #[serde(default)]
    pub make_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRetentionPolicy {
    pub database: String,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRetentionPolicy {
    pub database: String,
    pub name: String,
    #[serde(default)]
    pub update: RetentionPolicyUpdate,
    #[serde(default)]
    pub make_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseWithRetentionPolicy {
    pub name: String,
    pub spec: RetentionPolicySpec,
}

/// `timestamp` is Unix nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShardGroup {
    pub database: String,
    pub policy: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteShardGroup {
    pub database: String,
    pub policy: String,
    pub id: ShardGroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropShard {
    pub id: ShardId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncateShardGroups {
    pub time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneShardGroups {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecreateShardGroups {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDataNode {
    pub http_addr: String,
    pub tcp_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDataNode {
    pub id: NodeId,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropUser {
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPrivilege {
    pub user_name: String,
    pub database: String,
    pub privilege: Privilege,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminPrivilege {
    pub user_name: String,
    pub admin: bool,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticate {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContinuousQuery {
    pub database: String,
    pub name: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropContinuousQuery {
    pub database: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscription {
    pub database: String,
    pub rp: String,
    pub name: String,
    pub mode: String,
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropSubscription {
    pub database: String,
    pub rp: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireLease {
    pub name: String,
    pub node_id: NodeId,
}

impl fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUser")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("admin", &self.admin)
            .finish()
    }
}

impl fmt::Debug for UpdateUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateUser")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for Authenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticate")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}
