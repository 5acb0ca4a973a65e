//! # crdt-gossip - Gossip-Replicated Counter and Set
//!
//! Eventually consistent replicated primitives for a fixed set of nodes that
//! talk over an unreliable, unordered, at-least-once message substrate.
//!
//! ## Features
//!
//! - **Replicated counter**: every node appends its `add` deltas to a log it
//!   owns; peers catch their copies up by appending missing tails
//! - **Replicated set**: a grow-only set merged by union from bulk pushes
//! - **Anti-entropy gossip**: a cancellable timer pushes snapshots to peers;
//!   lost pushes are repaired by the next round
//! - **Order-insensitive merges**: redelivered, reordered or stale gossip
//!   leaves state unchanged
//!
//! ## Example
//!
//! ```rust
//! use crdt_gossip::{CounterReplica, NodeId, PeerSnapshot};
//!
//! let a = CounterReplica::new(NodeId::from("n1"));
//! let b = CounterReplica::new(NodeId::from("n2"));
//! a.apply_local_add(5).unwrap();
//! a.apply_local_add(-2).unwrap();
//!
//! for snapshot in a.snapshot() {
//!     if let PeerSnapshot::Oplog { origin, entries } = snapshot {
//!         b.merge_remote_oplog(&origin, &entries);
//!     }
//! }
//! assert_eq!(b.read(), 3);
//! ```

pub mod config;
pub mod crdt;
pub mod error;
pub mod gossip;
pub mod logging;
pub mod node;

// Re-export the main public API
pub use config::NodeConfig;
pub use crdt::{
    CounterReplica, MergeOutcome, MessageSetReplica, NetworkTopology, NodeId, Oplog, OplogEntry,
    PeerSnapshot, ReplicaState, Workload,
};
pub use error::{ErrorCode, ReplicaError};
pub use gossip::{FanoutMode, GossipConfig, GossipScheduler, GossipStats, RoundReport};

/// Result type alias for replica operations
pub type Result<T> = std::result::Result<T, ReplicaError>;
