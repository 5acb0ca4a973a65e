//! Point-in-time copies of replica state exchanged by gossip.

use crate::crdt::types::oplog::OplogEntry;
use crate::crdt::types::replica::NodeId;

/// An immutable copy of a replica's externally visible state.
///
/// Created by the sender while it holds its read lock, then owned by the
/// message that carries it. It never aliases the sender's live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSnapshot {
    /// One origin's complete operation log
    Oplog {
        origin: NodeId,
        entries: Vec<OplogEntry>,
    },
    /// Every element of a message set
    Messages(Vec<i64>),
}

impl PeerSnapshot {
    /// Number of entries or elements carried
    pub fn len(&self) -> usize {
        match self {
            PeerSnapshot::Oplog { entries, .. } => entries.len(),
            PeerSnapshot::Messages(values) => values.len(),
        }
    }

    /// Returns true if the snapshot carries nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of folding a [`PeerSnapshot`] into local state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Oplog entries appended or set elements newly inserted
    pub added: usize,
}

impl MergeOutcome {
    /// A merge that changed nothing
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Returns true if local state changed
    pub fn changed(&self) -> bool {
        self.added > 0
    }
}
