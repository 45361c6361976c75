//! Error types.
//!
//! Only initialization and the readiness-wait primitive are fatal; every
//! per-connection failure is delivered to the service handler as an event
//! and never aborts the loop.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal server failures. Returned by [`Server::new`] and [`Server::run`].
///
/// [`Server::new`]: crate::Server::new
/// [`Server::run`]: crate::Server::run
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to set up readiness polling: {0}")]
    Poll(io::Error),

    #[error("failed to register listener for readiness: {0}")]
    Register(io::Error),

    #[error("readiness wait failed: {0}")]
    Wait(io::Error),
}

/// A secure-transport handshake that did not produce a session. The
/// connection is discarded; no slot is consumed and no event is emitted.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("tls protocol error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("handshake deadline exceeded")]
    TimedOut,
}

/// Failure to assemble the TLS server credentials at startup.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("cannot read certificate file {path}: {source}")]
    CertFile { path: PathBuf, source: io::Error },

    #[error("no certificates found in {path}")]
    NoCerts { path: PathBuf },

    #[error("cannot read private key file {path}: {source}")]
    KeyFile { path: PathBuf, source: io::Error },

    #[error("no private key found in {path}")]
    NoKey { path: PathBuf },

    #[error("certificate/key material rejected: {0}")]
    Invalid(#[from] rustls::Error),
}
