//! Grow-only replicated set of broadcast values.

use crossbeam_skiplist::SkipSet;

use crate::crdt::types::{MergeOutcome, PeerSnapshot};

/// The broadcast variant: a set of integers that only ever grows.
///
/// Uses a concurrent SkipSet, so inserts never block readers and iteration is
/// always in ascending order.
#[derive(Default)]
pub struct MessageSetReplica {
    known: SkipSet<i64>,
}

impl MessageSetReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a locally broadcast value. Returns false if it was already known.
    pub fn apply_local_broadcast(&self, value: i64) -> bool {
        self.insert(value)
    }

    /// Set union with a peer's bulk payload.
    pub fn merge_remote_bulk(&self, values: &[i64]) -> MergeOutcome {
        let added = values.iter().filter(|&&v| self.insert(v)).count();
        MergeOutcome { added }
    }

    /// Ascending copy of every known value.
    pub fn read(&self) -> Vec<i64> {
        self.known.iter().map(|entry| *entry.value()).collect()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.known.contains(&value)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// The whole set as a single gossip payload.
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot::Messages(self.read())
    }

    // The newness flag is advisory; two racing inserts of the same value may
    // both report it as new.
    fn insert(&self, value: i64) -> bool {
        if self.known.contains(&value) {
            return false;
        }
        self.known.insert(value);
        true
    }
}
