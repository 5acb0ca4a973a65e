//! Message envelopes and bodies exchanged between nodes, clients and services.
//!
//! Bodies are tagged by their `type` field; `msg_id` and `in_reply_to` sit next
//! to the payload fields in the same JSON object.

use serde::{Deserialize, Serialize};

use crate::crdt::{NetworkTopology, NodeId, OplogEntry, PeerSnapshot};
use crate::error::ReplicaError;
use crate::Result;

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

/// Message body: correlation ids plus a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Body {
    pub fn new(payload: Payload) -> Self {
        Body {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }
}

/// Every operation this crate sends or understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,

    Add {
        delta: i64,
    },
    AddOk,

    /// Client read (no key) or key-value read (with key)
    Read {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    ReadOk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        messages: Option<Vec<i64>>,
    },

    Broadcast {
        message: i64,
    },
    BroadcastOk,

    Topology {
        topology: NetworkTopology,
    },
    TopologyOk,

    /// One origin's oplog pushed by gossip; `origin` defaults to the sender
    RecvOplog {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<NodeId>,
        oplog: Vec<OplogEntry>,
    },
    /// A peer's whole message set pushed by gossip
    BulkBroadcast {
        messages: Vec<i64>,
    },

    Write {
        key: String,
        value: i64,
    },
    WriteOk,
    Cas {
        key: String,
        from: i64,
        to: i64,
        #[serde(default)]
        create_if_not_exists: bool,
    },
    CasOk,

    Error {
        code: u32,
        text: String,
    },
}

impl Payload {
    /// The wire `type` of this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Add { .. } => "add",
            Payload::AddOk => "add_ok",
            Payload::Read { .. } => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
            Payload::RecvOplog { .. } => "recv_oplog",
            Payload::BulkBroadcast { .. } => "bulk_broadcast",
            Payload::Write { .. } => "write",
            Payload::WriteOk => "write_ok",
            Payload::Cas { .. } => "cas",
            Payload::CasOk => "cas_ok",
            Payload::Error { .. } => "error",
        }
    }

    /// Builds an `error` payload for a failed request.
    pub fn error(err: &ReplicaError) -> Self {
        Payload::Error {
            code: err.code().code(),
            text: err.to_string(),
        }
    }

    /// Turns an `error` reply into `Err`, anything else into `Ok`.
    pub fn into_result(self) -> Result<Payload> {
        match self {
            Payload::Error { code, text } => Err(ReplicaError::service(code, text)),
            other => Ok(other),
        }
    }
}

impl From<PeerSnapshot> for Payload {
    fn from(snapshot: PeerSnapshot) -> Self {
        match snapshot {
            PeerSnapshot::Oplog { origin, entries } => Payload::RecvOplog {
                origin: Some(origin),
                oplog: entries,
            },
            PeerSnapshot::Messages(messages) => Payload::BulkBroadcast { messages },
        }
    }
}

/// An envelope whose body has not been interpreted yet.
///
/// Lets the runtime answer a request whose body fails to decode, since the
/// sender and `msg_id` are still reachable.
#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: serde_json::Value,
}

impl RawMessage {
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// The body's `msg_id`, if it has a numeric one.
    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(serde_json::Value::as_u64)
    }

    /// Interprets the body.
    pub fn decode(self) -> Result<Message> {
        let body: Body = serde_json::from_value(self.body)
            .map_err(|e| ReplicaError::malformed(e.to_string()))?;
        Ok(Message {
            src: self.src,
            dest: self.dest,
            body,
        })
    }
}
