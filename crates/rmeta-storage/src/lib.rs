pub mod codec;
pub mod data;
pub mod fjall;
pub mod keys;
pub mod mem;
pub mod state;
pub mod traits;
pub mod types;

pub use data::MetaData;
pub use state::{MemStateMachine, StateMachineConfig};
pub use traits::{LogStorage, StateMachineStore};
pub use types::{LogEntry, LogState, Snapshot, SnapshotMeta};
