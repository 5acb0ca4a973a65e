//! Periodic anti-entropy gossip.
//!
//! Every interval the scheduler snapshots the node's replica and pushes it to
//! each target peer. Pushes are unacknowledged; a lost push is repaired by the
//! next round, so there is no retry logic here.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::crdt::{NodeId, ReplicaState, Workload};
use crate::node::message::Payload;
use crate::node::transport::PeerTransport;

/// Which peers receive each round's snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FanoutMode {
    /// Every other node in the cluster
    #[default]
    AllPeers,
    /// This node's neighbors from the installed topology; all peers until one arrives
    Neighbors,
}

impl std::str::FromStr for FanoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all-peers" | "all" => Ok(FanoutMode::AllPeers),
            "neighbors" | "topology" => Ok(FanoutMode::Neighbors),
            other => Err(format!("unknown fanout mode '{other}'")),
        }
    }
}

/// Configuration for the gossip scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Interval between rounds; the workload's default when unset
    pub interval_ms: Option<u64>,
    /// Target selection
    pub fanout: FanoutMode,
}

impl GossipConfig {
    /// Effective interval for `workload`; zero falls back to the default
    pub fn interval(&self, workload: Workload) -> Duration {
        self.interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or_else(|| workload.default_gossip_interval())
    }
}

/// Running totals across all rounds
#[derive(Debug, Clone, Default, Serialize)]
pub struct GossipStats {
    pub rounds: u64,
    pub sends: u64,
    pub failed_sends: u64,
    pub last_round_at: Option<DateTime<Utc>>,
}

/// What a single round did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub targets: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Background task pushing replica snapshots to peers.
pub struct GossipScheduler {
    state: Arc<ReplicaState>,
    transport: Arc<dyn PeerTransport>,
    interval: Duration,
    fanout: FanoutMode,
    shutdown: CancellationToken,
    stats: Mutex<GossipStats>,
}

impl GossipScheduler {
    pub fn new(
        config: &GossipConfig,
        state: Arc<ReplicaState>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        GossipScheduler {
            interval: config.interval(state.workload()),
            fanout: config.fanout,
            state,
            transport,
            shutdown: CancellationToken::new(),
            stats: Mutex::new(GossipStats::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Token that stops the loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops the loop after its current round
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn stats(&self) -> GossipStats {
        self.stats.lock().clone()
    }

    /// Peers that the next round will push to.
    pub fn targets(&self) -> Vec<NodeId> {
        let me = self.transport.node_id();
        match self.fanout {
            FanoutMode::AllPeers => self.transport.peers(),
            FanoutMode::Neighbors => match self.state.neighbors() {
                Some(neighbors) => neighbors.into_iter().filter(|n| n != me).collect(),
                None => {
                    trace!("no topology for this node yet, gossiping to all peers");
                    self.transport.peers()
                }
            },
        }
    }

    /// Runs one round: snapshot and push to every target.
    ///
    /// The snapshot is retaken per peer and no replica lock is held while
    /// sending. A failed send skips the rest of that peer's payloads only.
    pub fn tick(&self) -> RoundReport {
        let targets = self.targets();
        let mut report = RoundReport {
            targets: targets.len(),
            ..RoundReport::default()
        };

        for peer in &targets {
            let snapshots = self.state.snapshot();
            for snapshot in snapshots.into_iter().filter(|s| !s.is_empty()) {
                match self.transport.send(peer, Payload::from(snapshot)) {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "failed to push gossip");
                        report.failed += 1;
                        break;
                    }
                }
            }
        }

        let mut stats = self.stats.lock();
        stats.rounds += 1;
        stats.sends += report.sent as u64;
        stats.failed_sends += report.failed as u64;
        stats.last_round_at = Some(Utc::now());

        report
    }

    /// Ticks every interval until the shutdown token is cancelled.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            node = %self.transport.node_id(),
            interval = ?self.interval,
            fanout = ?self.fanout,
            "Starting gossip loop"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Gossip loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.tick();
                    debug!(
                        targets = report.targets,
                        sent = report.sent,
                        failed = report.failed,
                        "gossip round complete"
                    );
                }
            }
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}
