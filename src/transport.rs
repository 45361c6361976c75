//! The secure-transport capability boundary.
//!
//! The reactor never speaks to a record layer directly; it accepts raw
//! TCP streams and hands them to an [`Acceptor`], and from then on does
//! all I/O for that client through the returned [`Session`]. The rustls
//! implementation lives in [`crate::tls`]; tests drive the reactor with a
//! plaintext implementation to keep transport concerns out of loop tests.

use std::io;

use mio::net::TcpStream;

use crate::error::HandshakeError;

/// One client's established secure channel. Owns the socket: dropping the
/// session releases the record layer and then closes the descriptor,
/// exactly once.
///
/// `mio::event::Source` is a supertrait so the reactor can add the
/// session's descriptor to (and remove it from) the readiness set.
pub trait Session: mio::event::Source + Send {
    /// Reads decrypted bytes. `Ok(0)` signals orderly end-of-data;
    /// `ErrorKind::WouldBlock` means no plaintext is available yet and is
    /// not a fault.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes plaintext through the secure channel, returning the number
    /// of payload bytes accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Best-effort graceful shutdown of the secure channel. Resource
    /// release itself happens on drop.
    fn close(&mut self);
}

/// Performs the security handshake on a freshly accepted connection.
///
/// The stream is consumed either way: on failure it is closed by drop and
/// the reactor neither consumes a slot nor emits an event. The handshake
/// runs synchronously on the loop thread and is the one accepted blocking
/// point of the design; implementations must bound it with a deadline.
pub trait Acceptor: Send {
    fn handshake(&mut self, stream: TcpStream) -> Result<Box<dyn Session>, HandshakeError>;
}
