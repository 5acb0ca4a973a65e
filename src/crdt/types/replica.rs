//! Node identifier type and related functionality.
//!
//! This module contains the definition of NodeId, which names every participant
//! on the message substrate: replica nodes (`n1`), clients (`c4`) and services
//! (`seq-kv`).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A unique identifier for each node in the distributed system.
///
/// Identifiers are opaque strings assigned by the harness at `init` time.
/// Ordering is lexical, which gives deterministic iteration over per-origin logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Gets the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new("n1");
        assert_eq!(id.to_string(), "n1");
        assert_eq!(id.as_str(), "n1");
    }

    #[test]
    fn test_node_id_ordering() {
        let a = NodeId::from("n1");
        let b = NodeId::from("n2");
        assert!(a < b);
    }

    #[test]
    fn test_node_id_serializes_as_plain_string() {
        let id = NodeId::from("seq-kv");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"seq-kv\"");

        let back: NodeId = serde_json::from_str("\"c7\"").unwrap();
        assert_eq!(back, NodeId::from("c7"));
    }
}
