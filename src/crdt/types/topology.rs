//! Network topology as delivered by the `topology` control message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crdt::types::replica::NodeId;

/// Mapping from node identifier to its ordered list of neighbors.
///
/// Installed once per run and read-only afterwards. Whether gossip fan-out
/// follows it is decided by configuration, not by its presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkTopology(HashMap<NodeId, Vec<NodeId>>);

impl NetworkTopology {
    /// Creates an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Neighbors of `node`, or `None` if the topology does not mention it
    pub fn neighbors(&self, node: &NodeId) -> Option<&[NodeId]> {
        self.0.get(node).map(Vec::as_slice)
    }

    /// Number of nodes with an entry
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no node has an entry
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NodeId, Vec<NodeId>)> for NetworkTopology {
    fn from_iter<I: IntoIterator<Item = (NodeId, Vec<NodeId>)>>(iter: I) -> Self {
        NetworkTopology(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_lookup() {
        let topology: NetworkTopology = [
            (NodeId::from("n1"), vec![NodeId::from("n2")]),
            (NodeId::from("n2"), vec![NodeId::from("n1"), NodeId::from("n3")]),
        ]
        .into_iter()
        .collect();

        assert_eq!(topology.len(), 2);
        assert_eq!(
            topology.neighbors(&NodeId::from("n2")),
            Some(&[NodeId::from("n1"), NodeId::from("n3")][..])
        );
        assert_eq!(topology.neighbors(&NodeId::from("n9")), None);
    }

    #[test]
    fn test_deserializes_from_wire_map() {
        let json = r#"{"n1":["n2","n3"],"n2":["n1"],"n3":["n1"]}"#;
        let topology: NetworkTopology = serde_json::from_str(json).unwrap();

        assert_eq!(topology.len(), 3);
        assert_eq!(
            topology.neighbors(&NodeId::from("n1")).map(<[NodeId]>::len),
            Some(2)
        );
    }
}
