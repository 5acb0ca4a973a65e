//! Replicated state primitives and their merge rules.
//!
//! This module contains the oplog-replicated counter, the grow-only message
//! set, and the per-node state object that owns them.

pub mod counter;
pub mod message_set;
pub mod state;
pub mod types;

// Re-export the main public API
pub use counter::CounterReplica;
pub use message_set::MessageSetReplica;
pub use state::{ReplicaState, Workload};
pub use types::{MergeOutcome, NetworkTopology, NodeId, Oplog, OplogEntry, PeerSnapshot};
