//! # Mill-Line
//! A single-threaded secure line-protocol server core built on [`mio`].
//! Mill-Line multiplexes many concurrent text-protocol clients over TLS on
//! one thread, frames their messages, and hands complete messages to an
//! application-supplied handler, so application logic never touches
//! socket mechanics, record-layer plumbing, buffering, or timeout
//! bookkeeping.
//!
//! ## Core Philosophy
//! Mill-Line was designed for small command-and-response services that
//! require:
//! - **Predictable behavior** from one cooperative loop with a fixed
//!   connection table and deterministic service order
//! - **Runtime-agnostic architecture** that doesn't force async/await
//!   patterns
//! - **A hard ceiling on resources**: slots, buffers, and idle time are
//!   all bounded up front
//!
//! ## Architecture Overview
//! ```text
//! ┌────────────┐   accept/handshake   ┌─────────────┐
//! │  Server    │─────────────────────▶│  Acceptor   │ (rustls)
//! │ (reactor)  │                      └─────────────┘
//! │            │   read/write         ┌─────────────┐
//! │ ClientTable│◀────────────────────▶│  Session    │ (per client)
//! └─────┬──────┘                      └─────────────┘
//!       │ events: connect / data / eod / error /
//!       │         overflow / timeout / timer
//!       ▼
//! ┌──────────────┐
//! │ServiceHandler│ (application logic)
//! └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mill_line::{Client, Server, ServerConfig, ServiceHandler, TlsAcceptor};
//!
//! struct Echo;
//!
//! impl ServiceHandler for Echo {
//!     fn on_data(&mut self, client: &mut Client<'_>, message: &[u8]) {
//!         let _ = client.send(message);
//!         let _ = client.send(b"\n");
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .address("0.0.0.0:6666".parse()?)
//!         .build();
//!     let acceptor = TlsAcceptor::from_pem_files(
//!         "cert.pem",
//!         "key.pem",
//!         Duration::from_secs(10),
//!     )?;
//!     let mut server = Server::new(config, Box::new(acceptor), Echo)?;
//!     server.run()?; // Blocks until a handler requests shutdown
//!     Ok(())
//! }
//! ```
//!
//! Messages are ASCII strings terminated by NUL, CR, LF, or EOT (0x04);
//! the terminator is stripped before dispatch. A message longer than the
//! per-client buffer never reaches the handler: the client gets an
//! overflow event and the over-length message is discarded whole.
//!
//! Handlers run synchronously on the loop thread. Approximately once a
//! minute every handler also receives a timer event, usable for
//! time-based chores, and clients silent for ten of those ticks are
//! dropped with a timeout event.
//!
//! - [`Server`]: the reactor, owning the loop, the listener, and the
//!   connection table
//! - [`ServiceHandler`]: trait for implementing application logic
//! - [`Acceptor`] / [`Session`]: the secure-transport seam, implemented
//!   for rustls by [`TlsAcceptor`] / [`TlsSession`]
//! - [`ServerConfig`]: limits and timing, via a builder
//! - [`Logger`]: pluggable diagnostics sink

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod handler;
mod heartbeat;
pub mod reactor;
mod table;
pub mod tls;
pub mod transport;

pub use client::{Client, ClientId, ClientInfo, Control};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{HandshakeError, ServerError, TlsConfigError};
pub use handler::{LogLevel, Logger, NoOpLogger, ServiceHandler, StderrLogger};
pub use reactor::Server;
pub use tls::{TlsAcceptor, TlsSession};
pub use transport::{Acceptor, Session};

/// A convenient prelude module that re-exports commonly used types and
/// traits.
///
/// ```rust
/// use mill_line::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{Client, ClientId, ClientInfo, Control};
    pub use crate::config::ServerConfig;
    pub use crate::handler::{LogLevel, Logger, ServiceHandler};
    pub use crate::reactor::Server;
    pub use crate::tls::TlsAcceptor;
    pub use crate::transport::{Acceptor, Session};
}
