//! rustls-backed secure transport.
//!
//! [`TlsAcceptor`] performs the server-side handshake on freshly accepted
//! sockets; [`TlsSession`] carries one client's record layer for the rest
//! of the connection's life. Sockets stay non-blocking throughout, so the
//! handshake is driven in a bounded retry loop and session reads surface
//! `WouldBlock` when neither buffered plaintext nor socket data is
//! available.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConnection;

use crate::error::{HandshakeError, TlsConfigError};
use crate::transport::{Acceptor, Session};

const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(5);

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let file = File::open(path).map_err(|source| TlsConfigError::CertFile {
        path: path.to_path_buf(),
        source,
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|source| TlsConfigError::CertFile {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsConfigError::NoCerts {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let file = File::open(path).map_err(|source| TlsConfigError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsConfigError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsConfigError::NoKey {
            path: path.to_path_buf(),
        })
}

/// Server-side TLS handshaker.
#[derive(Debug)]
pub struct TlsAcceptor {
    config: Arc<rustls::ServerConfig>,
    timeout: Duration,
}

impl TlsAcceptor {
    /// Builds an acceptor from PEM-encoded certificate chain and private
    /// key files. Client authentication is not requested.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<Self, TlsConfigError> {
        let certs = load_certs(cert_path.as_ref())?;
        let key = load_key(key_path.as_ref())?;
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Self::new(Arc::new(config), timeout))
    }

    /// Builds an acceptor from an already-assembled rustls config.
    pub fn new(config: Arc<rustls::ServerConfig>, timeout: Duration) -> Self {
        TlsAcceptor { config, timeout }
    }
}

impl Acceptor for TlsAcceptor {
    /// Runs the handshake to completion on the loop thread. The socket is
    /// non-blocking, so progress is made in a retry loop bounded by the
    /// configured deadline. This stalls the reactor for the duration, the
    /// one accepted blocking point of the design.
    fn handshake(&mut self, mut stream: TcpStream) -> Result<Box<dyn Session>, HandshakeError> {
        let mut conn = ServerConnection::new(self.config.clone())?;
        let deadline = Instant::now() + self.timeout;

        while conn.is_handshaking() {
            match conn.complete_io(&mut stream) {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(HandshakeError::TimedOut);
                    }
                    thread::sleep(HANDSHAKE_RETRY_DELAY);
                }
                Err(err) => return Err(HandshakeError::Io(err)),
            }
        }

        Ok(Box::new(TlsSession { conn, stream }))
    }
}

/// One established TLS connection. The record layer is declared before
/// the stream so it is released first on drop, after which the socket
/// closes.
pub struct TlsSession {
    conn: ServerConnection,
    stream: TcpStream,
}

impl Session for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // Plaintext already decrypted in a previous pass comes first;
            // a short destination slice can leave some behind.
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(err),
            }

            match self.conn.read_tls(&mut self.stream) {
                // Peer closed the socket without close_notify; treat as
                // end-of-data like any other EOF.
                Ok(0) => return Ok(0),
                Ok(_) => {
                    self.conn
                        .process_new_packets()
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.conn.writer().write(buf)?;
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.stream) {
                Ok(_) => {}
                // Remaining records stay buffered in rustls and are
                // flushed by later writes or by close().
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    fn close(&mut self) {
        self.conn.send_close_notify();
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.stream) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }
}

impl Source for TlsSession {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}
