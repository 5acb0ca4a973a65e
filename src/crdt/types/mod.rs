//! Type definitions for the replicated primitives.
//!
//! This module contains the value types shared by the counter and the message
//! set, organized into focused submodules.

pub mod oplog;
pub mod replica;
pub mod snapshot;
pub mod topology;

pub use oplog::{AppliedTail, Oplog, OplogEntry};
pub use replica::NodeId;
pub use snapshot::{MergeOutcome, PeerSnapshot};
pub use topology::NetworkTopology;
