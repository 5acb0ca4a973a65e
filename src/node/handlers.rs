//! Request handlers: translate inbound messages into replica mutations and replies.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::crdt::{PeerSnapshot, ReplicaState, Workload};
use crate::error::ReplicaError;
use crate::node::kv::{read_int_or_zero, KvStore};
use crate::node::message::{Message, Payload};
use crate::node::transport::PeerTransport;
use crate::Result;

/// External store the counter value is mirrored into.
pub struct CounterStore {
    kv: Arc<dyn KvStore>,
    key: String,
    read_timeout: Duration,
    // Held across read-value-then-write so the store never ends on a stale value.
    publish: tokio::sync::Mutex<()>,
}

impl CounterStore {
    pub fn new(kv: Arc<dyn KvStore>, key: impl Into<String>, read_timeout: Duration) -> Self {
        CounterStore {
            kv,
            key: key.into(),
            read_timeout,
            publish: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Dispatches every inbound request for one node.
pub struct Handlers {
    state: Arc<ReplicaState>,
    transport: Arc<dyn PeerTransport>,
    store: Option<CounterStore>,
}

impl Handlers {
    pub fn new(state: Arc<ReplicaState>, transport: Arc<dyn PeerTransport>) -> Self {
        Handlers {
            state,
            transport,
            store: None,
        }
    }

    /// Mirrors the counter value into `store`; reads are then served from it.
    pub fn with_store(mut self, store: CounterStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> &Arc<ReplicaState> {
        &self.state
    }

    /// Handles one message, sending whatever reply it calls for.
    ///
    /// Failures are answered with an `error` body when the request carries a
    /// `msg_id`; gossip without one fails silently apart from the log line.
    pub async fn handle(&self, msg: Message) {
        let op = msg.body.payload.kind();
        match self.dispatch(&msg).await {
            Ok(Some(reply)) => {
                if let Err(e) = self.transport.reply(&msg, reply) {
                    warn!(op, src = %msg.src, error = %e, "failed to send reply");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(op, src = %msg.src, error = %e, "request failed");
                if msg.body.msg_id.is_some() {
                    if let Err(send_err) = self.transport.reply(&msg, Payload::error(&e)) {
                        warn!(op, src = %msg.src, error = %send_err, "failed to send error reply");
                    }
                }
            }
        }
    }

    /// Applies `msg` to local state and returns the reply payload, if any.
    pub async fn dispatch(&self, msg: &Message) -> Result<Option<Payload>> {
        let workload = self.state.workload();
        match (&msg.body.payload, workload) {
            (Payload::Add { delta }, Workload::Counter) => {
                let value = self.state.counter().apply_local_add(*delta)?;
                debug!(delta, value, "applied local add");
                // The delta is already in the log and will be gossiped.
                self.publish_counter()
                    .await
                    .map_err(ReplicaError::after_local_apply)?;
                Ok(Some(Payload::AddOk))
            }
            (Payload::Read { key: None }, Workload::Counter) => {
                let value = self.read_counter().await?;
                Ok(Some(Payload::ReadOk {
                    value: Some(value),
                    messages: None,
                }))
            }
            (Payload::Read { key: None }, Workload::Broadcast) => Ok(Some(Payload::ReadOk {
                value: None,
                messages: Some(self.state.messages().read()),
            })),
            (Payload::Broadcast { message }, Workload::Broadcast) => {
                if self.state.messages().apply_local_broadcast(*message) {
                    debug!(value = *message, "accepted broadcast");
                }
                Ok(Some(Payload::BroadcastOk))
            }
            (Payload::Topology { topology }, _) => {
                debug!(nodes = topology.len(), "installed topology");
                self.state.install_topology(topology.clone());
                Ok(Some(Payload::TopologyOk))
            }
            (Payload::RecvOplog { origin, oplog }, Workload::Counter) => {
                let snapshot = PeerSnapshot::Oplog {
                    origin: origin.clone().unwrap_or_else(|| msg.src.clone()),
                    entries: oplog.clone(),
                };
                let outcome = self.state.merge(&snapshot);
                if outcome.changed() {
                    debug!(from = %msg.src, added = outcome.added, "merged remote oplog");
                    self.publish_counter().await?;
                }
                Ok(None)
            }
            (Payload::BulkBroadcast { messages }, Workload::Broadcast) => {
                let outcome = self.state.merge(&PeerSnapshot::Messages(messages.clone()));
                if outcome.changed() {
                    debug!(from = %msg.src, added = outcome.added, "merged bulk broadcast");
                }
                Ok(None)
            }
            (payload, workload) => Err(ReplicaError::unsupported(format!(
                "{} on a {} node",
                payload.kind(),
                workload.as_str()
            ))),
        }
    }

    async fn read_counter(&self) -> Result<i64> {
        match &self.store {
            Some(store) => {
                read_int_or_zero(store.kv.as_ref(), &store.key, store.read_timeout).await
            }
            None => Ok(self.state.counter().read()),
        }
    }

    async fn publish_counter(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _guard = store.publish.lock().await;
        let value = self.state.counter().read();
        store.kv.write(&store.key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::NodeId;
    use crate::error::ErrorCode;
    use crate::node::kv::MemoryKv;
    use crate::node::message::Body;
    use crate::node::transport::Outbox;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    fn setup(workload: Workload) -> (Handlers, mpsc::UnboundedReceiver<Message>) {
        let (outbox, rx) = Outbox::new(
            NodeId::from("n1"),
            vec![NodeId::from("n1"), NodeId::from("n2")],
        );
        let state = Arc::new(ReplicaState::new(NodeId::from("n1"), workload));
        (Handlers::new(state, Arc::new(outbox)), rx)
    }

    fn request(msg_id: Option<u64>, payload: Payload) -> Message {
        Message {
            src: NodeId::from("c1"),
            dest: NodeId::from("n1"),
            body: Body {
                msg_id,
                in_reply_to: None,
                payload,
            },
        }
    }

    #[tokio::test]
    async fn test_add_then_read() {
        let (handlers, mut rx) = setup(Workload::Counter);

        handlers.handle(request(Some(1), Payload::Add { delta: 5 })).await;
        handlers.handle(request(Some(2), Payload::Add { delta: -2 })).await;
        handlers.handle(request(Some(3), Payload::Read { key: None })).await;

        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::AddOk);
        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::AddOk);
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(3));
        assert_eq!(
            reply.body.payload,
            Payload::ReadOk {
                value: Some(3),
                messages: None
            }
        );
    }

    #[tokio::test]
    async fn test_fresh_counter_reads_zero() {
        let (handlers, _rx) = setup(Workload::Counter);
        let reply = handlers
            .dispatch(&request(Some(1), Payload::Read { key: None }))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(Payload::ReadOk {
                value: Some(0),
                messages: None
            })
        );
    }

    #[tokio::test]
    async fn test_gossip_is_not_answered() {
        let (handlers, mut rx) = setup(Workload::Counter);
        let mut msg = request(
            None,
            Payload::RecvOplog {
                origin: None,
                oplog: vec![5, -2],
            },
        );
        msg.src = NodeId::from("n2");

        handlers.handle(msg).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(handlers.state().counter().read(), 3);
        assert_eq!(handlers.state().counter().log_len(&NodeId::from("n2")), 2);
    }

    #[tokio::test]
    async fn test_broadcast_and_read() {
        let (handlers, mut rx) = setup(Workload::Broadcast);

        handlers.handle(request(Some(1), Payload::Broadcast { message: 9 })).await;
        handlers
            .handle(request(
                None,
                Payload::BulkBroadcast {
                    messages: vec![7, 9],
                },
            ))
            .await;
        handlers.handle(request(Some(2), Payload::Read { key: None })).await;

        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::BroadcastOk);
        assert_eq!(
            rx.recv().await.unwrap().body.payload,
            Payload::ReadOk {
                value: None,
                messages: Some(vec![7, 9])
            }
        );
    }

    #[tokio::test]
    async fn test_topology_is_acknowledged() {
        let (handlers, mut rx) = setup(Workload::Broadcast);
        let topology = [(NodeId::from("n1"), vec![NodeId::from("n2")])]
            .into_iter()
            .collect();

        handlers
            .handle(request(Some(1), Payload::Topology { topology }))
            .await;

        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::TopologyOk);
        assert_eq!(handlers.state().neighbors(), Some(vec![NodeId::from("n2")]));
    }

    #[tokio::test]
    async fn test_wrong_workload_is_rejected_with_error_reply() {
        let (handlers, mut rx) = setup(Workload::Broadcast);

        handlers.handle(request(Some(7), Payload::Add { delta: 1 })).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(7));
        match reply.body.payload {
            Payload::Error { code, .. } => assert_eq!(code, ErrorCode::NotSupported.code()),
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_counter_mirrored_into_store() {
        let (handlers, _rx) = setup(Workload::Counter);
        let kv = Arc::new(MemoryKv::new());
        let handlers = handlers.with_store(CounterStore::new(
            kv.clone(),
            "counter/n1",
            Duration::from_secs(1),
        ));

        // Nothing written yet: the missing key reads as zero.
        let reply = handlers
            .dispatch(&request(Some(1), Payload::Read { key: None }))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(Payload::ReadOk {
                value: Some(0),
                messages: None
            })
        );

        handlers
            .dispatch(&request(Some(2), Payload::Add { delta: 4 }))
            .await
            .unwrap();
        let mut gossip = request(
            None,
            Payload::RecvOplog {
                origin: Some(NodeId::from("n2")),
                oplog: vec![6],
            },
        );
        gossip.src = NodeId::from("n2");
        handlers.dispatch(&gossip).await.unwrap();

        assert_eq!(kv.read_int("counter/n1").await.unwrap(), 10);
        let reply = handlers
            .dispatch(&request(Some(3), Payload::Read { key: None }))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(Payload::ReadOk {
                value: Some(10),
                messages: None
            })
        );
    }

    /// Store that accepts reads but refuses every write.
    struct RefusingKv;

    #[async_trait]
    impl KvStore for RefusingKv {
        async fn read_int(&self, _key: &str) -> Result<i64> {
            Ok(0)
        }

        async fn write(&self, _key: &str, _value: i64) -> Result<()> {
            Err(ReplicaError::service(
                ErrorCode::TemporarilyUnavailable,
                "store is overloaded",
            ))
        }

        async fn compare_and_swap(
            &self,
            _key: &str,
            _from: i64,
            _to: i64,
            _create_if_missing: bool,
        ) -> Result<()> {
            Err(ReplicaError::service(
                ErrorCode::TemporarilyUnavailable,
                "store is overloaded",
            ))
        }
    }

    #[tokio::test]
    async fn test_failed_mirror_after_add_is_reported_as_indefinite() {
        let (handlers, mut rx) = setup(Workload::Counter);
        let handlers = handlers.with_store(CounterStore::new(
            Arc::new(RefusingKv),
            "counter/n1",
            Duration::from_secs(1),
        ));

        handlers.handle(request(Some(4), Payload::Add { delta: 5 })).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(4));
        match reply.body.payload {
            Payload::Error { code, .. } => {
                assert_eq!(code, ErrorCode::Crash.code());
                assert!(!ErrorCode::from(code).is_definite());
            }
            other => panic!("expected error reply, got {other:?}"),
        }
        // The add did happen and will still be gossiped.
        assert_eq!(handlers.state().counter().read(), 5);
        assert_eq!(handlers.state().snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_add_is_rejected_and_not_applied() {
        let (handlers, mut rx) = setup(Workload::Counter);

        handlers
            .handle(request(Some(1), Payload::Add { delta: i64::MAX }))
            .await;
        handlers.handle(request(Some(2), Payload::Add { delta: 1 })).await;

        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::AddOk);
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(2));
        match reply.body.payload {
            Payload::Error { code, .. } => assert_eq!(code, ErrorCode::MalformedRequest.code()),
            other => panic!("expected error reply, got {other:?}"),
        }
        assert_eq!(handlers.state().counter().read(), i64::MAX);
        assert_eq!(handlers.state().counter().log_len(&NodeId::from("n1")), 1);
    }
}
