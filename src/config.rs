//! Configuration for relayd
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{RelayError, Result};

/// Main configuration for a relayd server and its endpoints
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Disable Nagle's algorithm on accepted TCP streams
    pub nodelay: bool,

    // -------------------------------------------------------------------------
    // Endpoint Configuration
    // -------------------------------------------------------------------------
    /// Time without input after which an endpoint counts as idle
    pub idle_threshold: Duration,

    /// Per-endpoint outbound queue capacity (0 = rendezvous, every send
    /// waits for the write loop to pick it up)
    pub outbound_capacity: usize,

    /// Server inbound queue capacity (None = unbounded)
    pub inbound_capacity: Option<usize>,

    /// Longest accepted input line in bytes, delimiter included
    pub max_line_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6667".to_string(),
            max_connections: 1024,
            nodelay: true,
            idle_threshold: Duration::from_secs(5 * 60), // 5 minutes
            outbound_capacity: 64,
            inbound_capacity: Some(1024),
            max_line_length: 4096,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Enable or disable TCP_NODELAY on accepted streams
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Set the idle threshold
    pub fn idle_threshold(mut self, threshold: Duration) -> Self {
        self.config.idle_threshold = threshold;
        self
    }

    /// Set the idle threshold in whole minutes
    pub fn idle_minutes(self, minutes: u64) -> Self {
        self.idle_threshold(Duration::from_secs(minutes * 60))
    }

    /// Set the per-endpoint outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    /// Set the inbound queue capacity (None for unbounded)
    pub fn inbound_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    /// Set the maximum input line length (in bytes)
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.config.max_line_length = bytes;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<Config> {
        if self.config.max_line_length == 0 {
            return Err(RelayError::Config(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        if self.config.max_connections == 0 {
            return Err(RelayError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(self.config)
    }
}
