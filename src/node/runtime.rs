//! Node lifecycle: init handshake, inbound dispatch, gossip, shutdown.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{NodeConfig, ValueStore};
use crate::crdt::{NodeId, ReplicaState, Workload};
use crate::gossip::GossipScheduler;
use crate::node::handlers::{CounterStore, Handlers};
use crate::node::kv::ServiceKv;
use crate::node::message::{Message, Payload, RawMessage};
use crate::node::transport::{write_loop, Outbox, PeerTransport};
use crate::Result;

/// Runs a node over newline-delimited JSON until `input` reaches EOF.
///
/// Nothing but `init` is accepted until the handshake completes. Each request
/// after that is handled on its own task, so a handler waiting on a store RPC
/// never blocks the loop that delivers the RPC's reply.
pub async fn run<R, W>(config: NodeConfig, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = input.lines();

    let Some((init, node_id, node_ids)) = await_init(&mut lines).await? else {
        info!("Input closed before init");
        return Ok(());
    };

    let (outbox, outbound_rx) = Outbox::new(node_id.clone(), node_ids);
    let outbox = Arc::new(outbox);
    let writer = tokio::spawn(write_loop(outbound_rx, output));
    outbox.reply(&init, Payload::InitOk)?;

    info!(
        node = %node_id,
        peers = outbox.peers().len(),
        workload = config.workload.as_str(),
        "Node initialized"
    );

    let state = Arc::new(ReplicaState::new(node_id.clone(), config.workload));
    let transport: Arc<dyn PeerTransport> = outbox.clone();
    let handlers = Arc::new(build_handlers(&config, &node_id, &state, &outbox, &transport));
    let scheduler = Arc::new(GossipScheduler::new(&config.gossip, state, transport));
    let gossip = scheduler.clone().spawn();

    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(msg) = decode_or_reject(&line, &outbox) else {
            continue;
        };
        let Some(msg) = outbox.complete(msg) else {
            continue;
        };
        if msg.body.in_reply_to.is_some() {
            debug!(src = %msg.src, kind = msg.body.payload.kind(), "dropping unsolicited reply");
            continue;
        }

        let handlers = handlers.clone();
        in_flight.spawn(async move { handlers.handle(msg).await });
        while let Some(finished) = in_flight.try_join_next() {
            log_handler_exit(finished);
        }
    }

    info!(node = %node_id, "Input closed, shutting down");
    scheduler.stop();
    gossip.await?;
    while let Some(finished) = in_flight.join_next().await {
        log_handler_exit(finished);
    }

    // The writer exits once every handle on the outbox is gone.
    drop(handlers);
    drop(scheduler);
    drop(outbox);
    writer.await?
}

async fn await_init<R>(
    lines: &mut tokio::io::Lines<R>,
) -> Result<Option<(Message, NodeId, Vec<NodeId>)>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match RawMessage::parse(&line).and_then(RawMessage::decode) {
            Ok(msg) => {
                if let Payload::Init { node_id, node_ids } = &msg.body.payload {
                    let (node_id, node_ids) = (node_id.clone(), node_ids.clone());
                    return Ok(Some((msg, node_id, node_ids)));
                }
                warn!(
                    src = %msg.src,
                    kind = msg.body.payload.kind(),
                    "dropping message received before init"
                );
            }
            Err(e) => warn!(error = %e, "dropping undecodable message received before init"),
        }
    }
    Ok(None)
}

fn build_handlers(
    config: &NodeConfig,
    node_id: &NodeId,
    state: &Arc<ReplicaState>,
    outbox: &Arc<Outbox>,
    transport: &Arc<dyn PeerTransport>,
) -> Handlers {
    let handlers = Handlers::new(state.clone(), transport.clone());
    if config.workload != Workload::Counter || config.counter.store != ValueStore::Service {
        return handlers;
    }

    let key = config.counter.key_for(node_id);
    info!(
        service = %config.counter.service,
        key = %key,
        "Mirroring counter into key-value service"
    );
    let kv = ServiceKv::new(
        outbox.clone(),
        config.counter.service_node(),
        config.counter.read_timeout(),
    );
    handlers.with_store(CounterStore::new(
        Arc::new(kv),
        key,
        config.counter.read_timeout(),
    ))
}

/// A handler that panicked never replied; say so instead of dropping it.
fn log_handler_exit(finished: std::result::Result<(), JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, panicked = e.is_panic(), "request handler task failed");
    }
}

/// Decodes one line; a request whose body is unreadable gets an error reply.
fn decode_or_reject(line: &str, outbox: &Outbox) -> Option<Message> {
    let raw = match RawMessage::parse(line) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "dropping unparsable line");
            return None;
        }
    };

    let src = raw.src.clone();
    let msg_id = raw.msg_id();
    match raw.decode() {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!(src = %src, error = %e, "rejecting undecodable request");
            if let Some(msg_id) = msg_id {
                if let Err(send_err) = outbox.deliver(&src, Some(msg_id), Payload::error(&e)) {
                    warn!(src = %src, error = %send_err, "failed to send error reply");
                }
            }
            None
        }
    }
}
