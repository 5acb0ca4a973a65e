//! Outbound side of the message substrate.
//!
//! Handlers and the gossip scheduler never touch the wire. They hand messages
//! to an [`Outbox`], which stamps a `msg_id` and queues them on a channel; a
//! single writer task drains that channel onto the output stream.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::crdt::NodeId;
use crate::error::ReplicaError;
use crate::node::message::{Body, Message, Payload};
use crate::Result;

/// Send-side primitives every handler and scheduler relies on.
///
/// Delivery is fire-and-forget: `Ok` means the message was queued, not that
/// it arrived.
pub trait PeerTransport: Send + Sync {
    /// This node's identifier
    fn node_id(&self) -> &NodeId;

    /// Every node in the cluster, including this one
    fn node_ids(&self) -> &[NodeId];

    /// Queues `payload` for `dest`, returning the assigned `msg_id`
    fn deliver(&self, dest: &NodeId, in_reply_to: Option<u64>, payload: Payload) -> Result<u64>;

    /// Sends an uncorrelated message
    fn send(&self, dest: &NodeId, payload: Payload) -> Result<()> {
        self.deliver(dest, None, payload).map(|_| ())
    }

    /// Answers `request`
    fn reply(&self, request: &Message, payload: Payload) -> Result<()> {
        self.deliver(&request.src, request.body.msg_id, payload)
            .map(|_| ())
    }

    /// Every node except this one
    fn peers(&self) -> Vec<NodeId> {
        self.node_ids()
            .iter()
            .filter(|id| *id != self.node_id())
            .cloned()
            .collect()
    }
}

/// Channel-backed [`PeerTransport`] with request/response correlation.
pub struct Outbox {
    node_id: NodeId,
    node_ids: Vec<NodeId>,
    next_msg_id: AtomicU64,
    outbound_tx: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Payload>>>,
}

impl Outbox {
    /// Creates an outbox and the receiving end its messages are queued on.
    pub fn new(
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let outbox = Outbox {
            node_id,
            node_ids,
            next_msg_id: AtomicU64::new(1),
            outbound_tx,
            pending: Mutex::new(HashMap::new()),
        };
        (outbox, outbound_rx)
    }

    fn next_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn push(&self, dest: &NodeId, body: Body) -> Result<()> {
        let message = Message {
            src: self.node_id.clone(),
            dest: dest.clone(),
            body,
        };
        self.outbound_tx
            .send(message)
            .map_err(|_| ReplicaError::transport("outbound channel closed", dest))
    }

    /// Sends `payload` to `dest` and waits for the correlated reply.
    ///
    /// An `error` reply becomes `Err`. On timeout the pending slot is dropped,
    /// so a late reply is discarded.
    pub async fn rpc(
        &self,
        dest: &NodeId,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload> {
        let msg_id = self.next_id();
        let operation = payload.kind();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(msg_id, tx);

        let body = Body {
            msg_id: Some(msg_id),
            in_reply_to: None,
            payload,
        };
        if let Err(e) = self.push(dest, body) {
            self.pending.lock().remove(&msg_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(_)) => Err(ReplicaError::transport("reply slot dropped", dest)),
            Err(_) => {
                self.pending.lock().remove(&msg_id);
                Err(ReplicaError::timeout(operation, timeout))
            }
        }
    }

    /// Routes a reply to the RPC waiting on it.
    ///
    /// Returns the message back if nothing is waiting for it.
    pub fn complete(&self, message: Message) -> Option<Message> {
        let Some(in_reply_to) = message.body.in_reply_to else {
            return Some(message);
        };
        let waiter = self.pending.lock().remove(&in_reply_to);
        match waiter {
            Some(tx) => {
                // The caller may have given up already; nothing to do then.
                let _ = tx.send(message.body.payload);
                None
            }
            None => Some(message),
        }
    }

    /// Number of RPCs still waiting for a reply.
    pub fn pending_rpcs(&self) -> usize {
        self.pending.lock().len()
    }
}

impl PeerTransport for Outbox {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    fn deliver(&self, dest: &NodeId, in_reply_to: Option<u64>, payload: Payload) -> Result<u64> {
        let msg_id = self.next_id();
        let body = Body {
            msg_id: Some(msg_id),
            in_reply_to,
            payload,
        };
        self.push(dest, body)?;
        Ok(msg_id)
    }
}

/// Drains queued messages onto `output` as JSON lines until every sender is gone.
pub async fn write_loop<W>(
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    mut output: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound_rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        trace!(dest = %message.dest, kind = message.body.payload.kind(), "writing message");
        output.write_all(&line).await?;
        output.flush().await?;
    }
    debug!("outbound channel closed, writer exiting");
    Ok(())
}
