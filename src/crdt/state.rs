//! Per-node replica state shared by request handlers and the gossip scheduler.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::crdt::counter::CounterReplica;
use crate::crdt::message_set::MessageSetReplica;
use crate::crdt::types::{MergeOutcome, NetworkTopology, NodeId, PeerSnapshot};

/// Which replicated primitive a node serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    /// Oplog-replicated counter (`add`, `read`)
    #[default]
    Counter,
    /// Bulk-gossiped message set (`broadcast`, `read`)
    Broadcast,
}

impl Workload {
    /// Gossip interval used when none is configured
    pub fn default_gossip_interval(self) -> Duration {
        match self {
            Workload::Counter => Duration::from_secs(3),
            Workload::Broadcast => Duration::from_secs(5),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Workload::Counter => "counter",
            Workload::Broadcast => "broadcast",
        }
    }
}

impl std::str::FromStr for Workload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" | "g-counter" => Ok(Workload::Counter),
            "broadcast" => Ok(Workload::Broadcast),
            other => Err(format!("unknown workload '{other}'")),
        }
    }
}

/// Everything a node replicates, owned in one place and shared by reference.
///
/// Both replicas exist regardless of workload; only the one matching
/// `workload` is ever mutated or gossiped.
pub struct ReplicaState {
    node_id: NodeId,
    workload: Workload,
    counter: CounterReplica,
    messages: MessageSetReplica,
    topology: RwLock<Option<NetworkTopology>>,
}

impl ReplicaState {
    /// Creates empty state for `node_id`.
    pub fn new(node_id: NodeId, workload: Workload) -> Self {
        ReplicaState {
            counter: CounterReplica::new(node_id.clone()),
            messages: MessageSetReplica::new(),
            topology: RwLock::new(None),
            node_id,
            workload,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn workload(&self) -> Workload {
        self.workload
    }

    pub fn counter(&self) -> &CounterReplica {
        &self.counter
    }

    pub fn messages(&self) -> &MessageSetReplica {
        &self.messages
    }

    /// Replaces the installed topology.
    pub fn install_topology(&self, topology: NetworkTopology) {
        *self.topology.write() = Some(topology);
    }

    /// Neighbors of this node, once a topology naming it has been installed.
    pub fn neighbors(&self) -> Option<Vec<NodeId>> {
        self.topology
            .read()
            .as_ref()
            .and_then(|t| t.neighbors(&self.node_id).map(<[NodeId]>::to_vec))
    }

    /// Point-in-time copy of the workload's replica, ready to gossip.
    ///
    /// Each replica lock is released before this returns.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        match self.workload {
            Workload::Counter => self.counter.snapshot(),
            Workload::Broadcast => vec![self.messages.snapshot()],
        }
    }

    /// Folds a peer's snapshot into the matching replica.
    pub fn merge(&self, snapshot: &PeerSnapshot) -> MergeOutcome {
        match snapshot {
            PeerSnapshot::Oplog { origin, entries } => {
                self.counter.merge_remote_oplog(origin, entries)
            }
            PeerSnapshot::Messages(values) => self.messages.merge_remote_bulk(values),
        }
    }
}
