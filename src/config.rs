//! Config loading.
//!
//! A node reads an optional TOML file named by `CRDT_GOSSIP_CONFIG`, then
//! applies `CRDT_GOSSIP_*` environment overrides. Every field has a default, so
//! a node with neither still runs the counter workload.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::crdt::{NodeId, Workload};
use crate::error::ReplicaError;
use crate::gossip::GossipConfig;
use crate::logging::LogConfig;
use crate::Result;

pub const CONFIG_PATH_ENV: &str = "CRDT_GOSSIP_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub workload: Workload,
    pub gossip: GossipConfig,
    pub counter: CounterConfig,
    pub log: LogConfig,
}

/// Where `read` gets the counter value from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueStore {
    /// The in-memory replica
    #[default]
    Replica,
    /// A key-value service the value is mirrored into
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub store: ValueStore,
    pub service: String,
    pub key_prefix: String,
    pub read_timeout_ms: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            store: ValueStore::Replica,
            service: "seq-kv".to_string(),
            key_prefix: "counter/".to_string(),
            read_timeout_ms: 5_000,
        }
    }
}

impl CounterConfig {
    pub fn service_node(&self) -> NodeId {
        NodeId::new(self.service.clone())
    }

    /// Store key holding `node`'s counter value
    pub fn key_for(&self, node: &NodeId) -> String {
        format!("{}{}", self.key_prefix, node)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl NodeConfig {
    /// Rejects values that parse but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.gossip.interval_ms == Some(0) {
            return Err(ReplicaError::config("gossip.interval_ms must be greater than 0"));
        }
        if self.counter.read_timeout_ms == 0 {
            return Err(ReplicaError::config(
                "counter.read_timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Parses and validates TOML config text.
pub fn parse(contents: &str) -> Result<NodeConfig> {
    let config: NodeConfig = toml::from_str(contents)
        .map_err(|e| ReplicaError::config(format!("invalid config: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Parses a config file.
pub fn load_file(path: &Path) -> Result<NodeConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ReplicaError::config(format!("failed to read {}: {e}", path.display())))?;
    parse(&contents).map_err(|e| match e {
        ReplicaError::Config { message } => {
            ReplicaError::config(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// Loads the file named by [`CONFIG_PATH_ENV`] (if any), then env overrides.
pub fn load() -> Result<NodeConfig> {
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_file(Path::new(path.trim()))?,
        _ => NodeConfig::default(),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies `CRDT_GOSSIP_*` overrides read through `var`.
///
/// Invalid values are reported and ignored.
pub fn apply_env_overrides(config: &mut NodeConfig, var: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| {
        var(name)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    if let Some(raw) = read("CRDT_GOSSIP_WORKLOAD") {
        match raw.parse() {
            Ok(workload) => config.workload = workload,
            Err(err) => tracing::warn!("invalid CRDT_GOSSIP_WORKLOAD, ignoring: {err}"),
        }
    }

    if let Some(raw) = read("CRDT_GOSSIP_INTERVAL_MS") {
        match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => config.gossip.interval_ms = Some(ms),
            _ => tracing::warn!("invalid CRDT_GOSSIP_INTERVAL_MS '{raw}', ignoring"),
        }
    }

    if let Some(raw) = read("CRDT_GOSSIP_FANOUT") {
        match raw.parse() {
            Ok(fanout) => config.gossip.fanout = fanout,
            Err(err) => tracing::warn!("invalid CRDT_GOSSIP_FANOUT, ignoring: {err}"),
        }
    }

    if let Some(raw) = read("CRDT_GOSSIP_COUNTER_STORE") {
        match raw.to_ascii_lowercase().as_str() {
            "replica" => config.counter.store = ValueStore::Replica,
            "service" => config.counter.store = ValueStore::Service,
            _ => tracing::warn!("invalid CRDT_GOSSIP_COUNTER_STORE '{raw}', ignoring"),
        }
    }

    if let Some(raw) = read("CRDT_GOSSIP_LOG") {
        config.log.level = raw;
    }
}
