//! Replicated counter backed by per-origin operation logs.
//!
//! Every node appends its own `add` deltas to the log it owns and gossips every
//! log it knows about. Receivers catch their copy of each log up to the longest
//! version seen. Because only the origin ever appends to a log, all copies are
//! prefixes of one another and the counter value, the sum of all logs,
//! converges on every node.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::crdt::types::{MergeOutcome, NodeId, Oplog, OplogEntry, PeerSnapshot};
use crate::error::ReplicaError;
use crate::Result;

/// The oplog variant of the replicated counter.
///
/// # Design
///
/// - One [`Oplog`] per origin node, keyed by [`NodeId`]
/// - A cached `value` that always equals the sum of every log
/// - A single writer-fair `RwLock` guards both, so readers never observe a
///   log and a value that disagree
pub struct CounterReplica {
    /// The node that owns this replica; its deltas go to its own log
    local: NodeId,
    inner: RwLock<CounterState>,
}

#[derive(Debug, Default)]
struct CounterState {
    value: i64,
    logs: BTreeMap<NodeId, Oplog>,
}

impl CounterReplica {
    /// Creates an empty counter owned by `local`.
    pub fn new(local: NodeId) -> Self {
        CounterReplica {
            local,
            inner: RwLock::new(CounterState::default()),
        }
    }

    /// The node whose local adds this replica records.
    pub fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// Records a local `add`, returning the new value.
    ///
    /// The append and the increment happen under one write lock. A delta that
    /// would overflow the current value is rejected before anything is
    /// recorded.
    pub fn apply_local_add(&self, delta: OplogEntry) -> Result<i64> {
        let mut state = self.inner.write();
        let value = state.value.checked_add(delta).ok_or_else(|| {
            ReplicaError::malformed(format!(
                "add of {delta} overflows counter value {}",
                state.value
            ))
        })?;
        state
            .logs
            .entry(self.local.clone())
            .or_default()
            .push(delta);
        state.value = value;
        Ok(value)
    }

    /// Current counter value.
    pub fn read(&self) -> i64 {
        self.inner.read().value
    }

    /// Folds a peer's copy of `origin`'s log into local state.
    ///
    /// Entries past the local copy's length are appended and their sum added to
    /// the value. A remote log that is not longer than the local copy is a
    /// no-op, which makes redelivered and reordered gossip harmless.
    ///
    /// Remote tails are folded in with wrapping arithmetic: every replica
    /// wraps the same way, so values still agree once logs do.
    pub fn merge_remote_oplog(&self, origin: &NodeId, remote: &[OplogEntry]) -> MergeOutcome {
        if remote.is_empty() {
            return MergeOutcome::unchanged();
        }

        let mut state = self.inner.write();
        let applied = state
            .logs
            .entry(origin.clone())
            .or_default()
            .catch_up(remote);

        match applied {
            Some(tail) => {
                state.value = state.value.wrapping_add(tail.sum);
                debug_assert_eq!(
                    state.value,
                    state.logs.values().map(Oplog::sum).fold(0, i64::wrapping_add)
                );
                MergeOutcome {
                    added: tail.appended,
                }
            }
            None => MergeOutcome::unchanged(),
        }
    }

    /// Copies every known log, one snapshot per origin.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let state = self.inner.read();
        state
            .logs
            .iter()
            .map(|(origin, log)| PeerSnapshot::Oplog {
                origin: origin.clone(),
                entries: log.entries().to_vec(),
            })
            .collect()
    }

    /// Length of the local copy of `origin`'s log.
    pub fn log_len(&self, origin: &NodeId) -> usize {
        self.inner.read().logs.get(origin).map_or(0, Oplog::len)
    }

    /// Number of origins with at least one known entry.
    pub fn origin_count(&self) -> usize {
        self.inner.read().logs.len()
    }
}
