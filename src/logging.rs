//! Logging setup.
//!
//! Standard output carries protocol traffic, so every log line goes to stderr.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, Layer, Registry};

use crate::error::ReplicaError;
use crate::Result;

/// Log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directives, e.g. `info` or `crdt_gossip=debug,tokio=warn`
    pub level: String,
    /// Emit one JSON object per line
    pub json: bool,
    /// Enable ANSI colors
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            ansi: false,
        }
    }
}

impl LogConfig {
    /// Builds the filter, rejecting malformed directives
    pub fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| ReplicaError::config(format!("invalid log level '{}': {e}", self.level)))
    }
}

/// Installs the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(config.ansi);

    let subscriber = Registry::default()
        .with(config.filter()?)
        .with(if config.json {
            fmt_layer.json().boxed()
        } else {
            fmt_layer.boxed()
        });

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ReplicaError::config(format!("logging already initialized: {e}")))
}
