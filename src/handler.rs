//! Service handler and logging capabilities.

use crate::client::{Client, ClientInfo, Control};

/// The dispatch interface between the reactor and application logic.
///
/// Callbacks run synchronously on the loop thread; a slow callback stalls
/// every connection, so handlers must not block on long work. All methods
/// default to no-ops so a handler implements only the events it cares
/// about.
///
/// A [`Client`] argument means the connection is live: the handler may
/// [`send`](Client::send) and [`close`](Client::close). A [`ClientInfo`]
/// argument means the connection is already gone and only identity
/// remains. References must not be retained beyond the call.
pub trait ServiceHandler {
    /// Fired approximately once per heartbeat interval (one real minute
    /// by default) regardless of traffic, including with zero clients.
    /// Useful for time-based chores such as reopening a log file.
    fn on_timer_expired(&mut self, ctl: &mut Control) {
        let _ = ctl;
    }

    /// A client completed the secure handshake and occupies a slot.
    fn on_connect(&mut self, client: &mut Client<'_>) {
        let _ = client;
    }

    /// A client sent one complete message. `message` holds the bytes up
    /// to, and not including, the terminator.
    fn on_data(&mut self, client: &mut Client<'_>, message: &[u8]) {
        let _ = (client, message);
    }

    /// The client ended the stream in an orderly fashion. Its slot has
    /// been dropped.
    fn on_end_of_data(&mut self, client: &ClientInfo) {
        let _ = client;
    }

    /// Reading from the client failed. Its slot has been dropped.
    fn on_error(&mut self, client: &ClientInfo) {
        let _ = client;
    }

    /// A message outgrew the input buffer before a terminator arrived.
    /// The buffered bytes were discarded and the rest of the over-length
    /// message will be swallowed up to its terminator; the connection
    /// stays open.
    fn on_overflow(&mut self, client: &ClientInfo) {
        let _ = client;
    }

    /// The client showed no read activity for the configured number of
    /// heartbeat ticks. Its slot has been dropped.
    fn on_timeout(&mut self, client: &ClientInfo) {
        let _ = client;
    }
}

/// Log levels for reactor diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger capability for reactor diagnostics.
///
/// Embedders can implement this trait to route messages however they
/// prefer without the crate coupling to a specific logging framework.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default logger that discards all messages.
#[derive(Default, Clone)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: LogLevel, _message: &str) {
        // Do nothing
    }
}

/// Logger that writes diagnostics to stderr.
#[derive(Default, Clone)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, message: &str) {
        eprintln!("[{level:?}] {message}");
    }
}
