//! Environment-driven configuration, loaded once at start-up via `envy`.
//!
//! Grounded on the teacher's `Cargo.toml` already declaring `envy` for its
//! off-chain indexer binary; this server reuses the same pattern of a flat
//! `HOLDEM_*`-prefixed env namespace deserialized straight into a struct.

use std::net::SocketAddr;
use std::time::Duration;

use holdem_core::constants::{DEFAULT_COALESCE_WINDOW, DEFAULT_IDEMPOTENCY_TTL};
use holdem_session::session::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_COALESCE_BATCH_SIZE, DEFAULT_SEND_QUEUE_CAPACITY};
use serde::Deserialize;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_idempotency_ttl_secs() -> u64 {
    DEFAULT_IDEMPOTENCY_TTL.as_secs()
}
fn default_coalesce_window_ms() -> u64 {
    DEFAULT_COALESCE_WINDOW.as_millis() as u64
}
fn default_max_coalesce_batch_size() -> usize {
    DEFAULT_MAX_COALESCE_BATCH_SIZE
}
fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64
}
fn default_send_queue_capacity() -> usize {
    DEFAULT_SEND_QUEUE_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,

    #[serde(default = "default_max_coalesce_batch_size")]
    pub max_coalesce_batch_size: usize,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        envy::prefixed("HOLDEM_").from_env::<Config>().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr.parse().map_err(|e| anyhow::anyhow!("invalid HOLDEM_BIND_ADDR {:?}: {e}", self.bind_addr))
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_parseable_socket_addr() {
        let config = Config {
            bind_addr: default_bind_addr(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            coalesce_window_ms: default_coalesce_window_ms(),
            max_coalesce_batch_size: default_max_coalesce_batch_size(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            send_queue_capacity: default_send_queue_capacity(),
        };
        assert!(config.socket_addr().is_ok());
    }
}
