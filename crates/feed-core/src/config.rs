//! Configuration parsing for the feed pipeline.
//!
//! Settings come from a single JSON file. Every field is optional; the
//! `effective_*` accessors supply defaults so that an empty object (or
//! [`AppConfig::default`]) describes a working BTCUSDT trade feed over the
//! lock-free queue.
//!
//! # Example config
//!
//! ```json
//! {
//!   "module": { "module_name": "binance_trade", "log_path": "/tmp/log" },
//!   "feed": { "endpoint": "data-stream.binance.vision", "streams": ["btcusdt@trade"] },
//!   "transport": { "kind": "ring", "ring_capacity": 16, "consumers": 1 },
//!   "cpu_affinity": { "consumers": [2] }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::{
    error::FeedError,
    ring_buffer::{self, READ_POLL_INTERVAL, WRITE_POLL_INTERVAL},
};

pub const DEFAULT_ENDPOINT: &str = "data-stream.binance.vision";
pub const DEFAULT_STREAM: &str = "btcusdt@trade";
pub const DEFAULT_RING_CAPACITY: usize = 16;
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_micros(50);

/// Top-level application config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub module: ModuleMeta,
    pub feed: FeedConfig,
    pub transport: TransportConfig,
    pub cpu_affinity: AffinityConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Upstream stream selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// Host serving the raw WebSocket streams.
    pub endpoint: Option<String>,
    /// Stream names, e.g. `["btcusdt@trade", "ethusdt@trade"]`. The first is
    /// connected directly; the rest are added with a SUBSCRIBE frame.
    pub streams: Option<Vec<String>>,
    /// Client ping interval in seconds. `None` relies on server pings.
    pub ping_interval_sec: Option<u64>,
}

/// Which transport decouples ingestion from the consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Unbounded lock-free queue; never blocks ingestion.
    #[default]
    Queue,
    /// Bounded ring buffer; ingestion blocks while full.
    Ring,
}

impl std::str::FromStr for TransportKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "ring" => Ok(Self::Ring),
            other => Err(FeedError::Config(format!("unknown transport kind: {other}"))),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Ring => write!(f, "ring"),
        }
    }
}

/// Transport sizing and polling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportConfig {
    pub kind: Option<TransportKind>,
    pub ring_capacity: Option<usize>,
    /// Number of consumer threads. The ring transport supports exactly one.
    pub consumers: Option<usize>,
    pub write_poll_us: Option<u64>,
    pub read_poll_us: Option<u64>,
    /// Consumer sleep after an empty poll of the queue.
    pub idle_sleep_us: Option<u64>,
}

impl TransportConfig {
    pub fn effective_kind(&self) -> TransportKind {
        self.kind.unwrap_or_default()
    }

    pub fn effective_ring_capacity(&self) -> usize {
        self.ring_capacity.unwrap_or(DEFAULT_RING_CAPACITY)
    }

    pub fn effective_consumers(&self) -> usize {
        self.consumers.unwrap_or(1)
    }

    pub fn write_poll(&self) -> Duration {
        self.write_poll_us.map(Duration::from_micros).unwrap_or(WRITE_POLL_INTERVAL)
    }

    pub fn read_poll(&self) -> Duration {
        self.read_poll_us.map(Duration::from_micros).unwrap_or(READ_POLL_INTERVAL)
    }

    pub fn idle_sleep(&self) -> Duration {
        self.idle_sleep_us.map(Duration::from_micros).unwrap_or(DEFAULT_IDLE_SLEEP)
    }
}

/// CPU pinning for consumer threads (by consumer index).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AffinityConfig {
    pub consumers: Option<Vec<usize>>,
}

impl AffinityConfig {
    pub fn consumer_core(&self, idx: usize) -> Option<usize> {
        self.consumers.as_ref().and_then(|cores| cores.get(idx).copied())
    }
}

impl FeedConfig {
    pub fn effective_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn effective_streams(&self) -> Vec<String> {
        self.streams.clone().unwrap_or_else(|| vec![DEFAULT_STREAM.to_string()])
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_sec.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Module name from the config, defaulting to `"binance_trade"`.
    pub fn module_name(&self) -> String {
        self.module.module_name.clone().unwrap_or_else(|| "binance_trade".to_string())
    }

    pub fn log_path(&self) -> Option<String> {
        self.module.log_path.clone()
    }

    /// Reject combinations the transports cannot honor.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.feed.effective_streams().is_empty() {
            return Err(FeedError::Config("at least one stream is required".into()));
        }

        let consumers = self.transport.effective_consumers();
        if consumers == 0 {
            return Err(FeedError::Config("at least one consumer is required".into()));
        }

        if self.transport.effective_kind() == TransportKind::Ring {
            if consumers > 1 {
                return Err(FeedError::Config(format!(
                    "ring transport supports a single reader, got {consumers} consumers"
                )));
            }
            ring_buffer::check_capacity(self.transport.effective_ring_capacity())?;
        }

        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
