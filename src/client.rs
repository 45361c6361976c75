//! Client views handed to the service handler during dispatch.
//!
//! None of these types may be retained beyond the callback that received
//! them; the lifetimes enforce that. [`Client`] is passed only for events
//! where the connection is live and writable (connect, data); the cheaper
//! [`ClientInfo`] is passed where the descriptor is already invalid.

use std::io;
use std::net::SocketAddr;

use crate::transport::Session;

/// Identity of a client connection, derived from its slot index at accept
/// time. Distinct connections that occupy the same slot over time share
/// an id; only the slot index is reused, so an id uniquely names a client
/// among those currently connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(usize);

impl ClientId {
    pub(crate) fn from_index(index: usize) -> Self {
        ClientId(index + 1)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and address of a client whose connection is no longer
/// usable (end-of-data, error, overflow, timeout events).
#[derive(Debug, Clone, Copy)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer: SocketAddr,
}

/// Loop control handle. Passed to the timer callback and embedded in
/// [`Client`]; requests take effect when the current dispatch returns.
pub struct Control {
    pub(crate) shutdown_requested: bool,
    pub(crate) drop_requested: bool,
}

impl Control {
    pub(crate) fn new() -> Self {
        Control {
            shutdown_requested: false,
            drop_requested: false,
        }
    }

    /// Asks the reactor to stop: the loop enters its terminating state at
    /// the end of the current iteration, drops every client, and releases
    /// the listener.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub(crate) fn take_drop(&mut self) -> bool {
        std::mem::take(&mut self.drop_requested)
    }
}

/// A live client connection, valid for the duration of one connect or
/// data callback.
pub struct Client<'a> {
    id: ClientId,
    peer: SocketAddr,
    session: &'a mut dyn Session,
    control: &'a mut Control,
}

impl<'a> Client<'a> {
    pub(crate) fn new(
        id: ClientId,
        peer: SocketAddr,
        session: &'a mut dyn Session,
        control: &'a mut Control,
    ) -> Self {
        Client {
            id,
            peer,
            session,
            control,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends a reply through the secure channel. Returns the number of
    /// payload bytes accepted by the transport.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.session.write(bytes)
    }

    /// Requests an orderly disconnect of this client once the current
    /// callback returns. No event is emitted for an explicit drop, and
    /// the underlying release is idempotent.
    pub fn close(&mut self) {
        self.control.drop_requested = true;
    }

    /// See [`Control::request_shutdown`].
    pub fn request_shutdown(&mut self) {
        self.control.request_shutdown();
    }
}
