//! Server configuration.
//!
//! All limits are fixed for the life of the server; there is no dynamic
//! reconfiguration. Use [`ServerConfig::builder`] for ergonomic
//! construction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::handler::{Logger, NoOpLogger};

/// Configuration for the reactor.
///
/// ## Resource limits
///
/// - `max_clients`: number of connection slots, and so the hard limit on
///   concurrent clients. Connections beyond it are closed at accept time.
/// - `buffer_size`: per-client input buffer capacity, which bounds the
///   longest acceptable message. Buffers are allocated on first use and
///   kept for the life of the process.
///
/// ## Timing
///
/// - `tick_interval`: heartbeat period; drives the timer event and idle
///   accounting. One real minute in the original deployment shape.
/// - `idle_timeout_ticks`: heartbeat ticks without read activity after
///   which a client is dropped.
/// - `poll_timeout`: upper bound on one readiness wait, which bounds
///   heartbeat latency under silence.
/// - `handshake_timeout`: deadline for the synchronous accept-time
///   handshake.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub address: SocketAddr,
    /// Maximum number of concurrent clients
    pub max_clients: usize,
    /// Per-client input buffer capacity
    pub buffer_size: usize,
    /// Idle heartbeat ticks before a client is dropped
    pub idle_timeout_ticks: u32,
    /// Heartbeat interval
    pub tick_interval: Duration,
    /// Bound on a single readiness wait
    pub poll_timeout: Duration,
    /// Deadline for the accept-time handshake
    pub handshake_timeout: Duration,
    /// Logger for reactor diagnostics
    pub logger: Arc<dyn Logger>,
}

impl ServerConfig {
    /// Create a new builder for ServerConfig
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:6666".parse().unwrap(),
            max_clients: 32,
            buffer_size: 1024,
            idle_timeout_ticks: 10,
            tick_interval: Duration::from_secs(60),
            poll_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(10),
            logger: Arc::new(NoOpLogger),
        }
    }
}

/// Builder for ServerConfig. Unset fields take the defaults from
/// `ServerConfig::default()`.
pub struct ServerConfigBuilder {
    address: Option<SocketAddr>,
    max_clients: Option<usize>,
    buffer_size: Option<usize>,
    idle_timeout_ticks: Option<u32>,
    tick_interval: Option<Duration>,
    poll_timeout: Option<Duration>,
    handshake_timeout: Option<Duration>,
    logger: Option<Arc<dyn Logger>>,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            address: None,
            max_clients: None,
            buffer_size: None,
            idle_timeout_ticks: None,
            tick_interval: None,
            poll_timeout: None,
            handshake_timeout: None,
            logger: None,
        }
    }

    /// Set the address to bind to
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the maximum number of concurrent clients
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = Some(max);
        self
    }

    /// Set the per-client input buffer capacity
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set the idle tick threshold after which clients are dropped
    pub fn idle_timeout_ticks(mut self, ticks: u32) -> Self {
        self.idle_timeout_ticks = Some(ticks);
        self
    }

    /// Set the heartbeat interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Set the bound on a single readiness wait
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Set the deadline for the accept-time handshake
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Set the logger implementation
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the ServerConfig
    pub fn build(self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig {
            address: self.address.unwrap_or(default.address),
            max_clients: self.max_clients.unwrap_or(default.max_clients),
            buffer_size: self.buffer_size.unwrap_or(default.buffer_size),
            idle_timeout_ticks: self
                .idle_timeout_ticks
                .unwrap_or(default.idle_timeout_ticks),
            tick_interval: self.tick_interval.unwrap_or(default.tick_interval),
            poll_timeout: self.poll_timeout.unwrap_or(default.poll_timeout),
            handshake_timeout: self.handshake_timeout.unwrap_or(default.handshake_timeout),
            logger: self.logger.unwrap_or(default.logger),
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
