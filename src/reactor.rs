//! The reactor loop.
//!
//! One thread, one bounded readiness wait per iteration, and a fixed
//! order of work inside the iteration: heartbeat (idle timeouts plus the
//! timer event), then at most one accept, then a lowest-index-first sweep
//! of clients with unserviced readiness. Everything (handshakes and
//! handler callbacks included) runs on this thread, so no state in the
//! server needs synchronization.
//!
//! The poller reports readiness edge-wise, while the loop deliberately
//! services one read per client per iteration. Readiness is therefore
//! recorded in sticky per-slot flags and the wait shrinks to zero length
//! while any flag is still set, which reproduces level-triggered sweeps
//! without ever stranding buffered input.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use crate::client::{Client, ClientInfo, Control};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::framing::{self, OVERFLOW_RESERVE};
use crate::handler::{LogLevel, ServiceHandler};
use crate::heartbeat::Heartbeat;
use crate::table::{ClientTable, Slot};
use crate::transport::Acceptor;

const LISTENER: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Initializing,
    Listening,
    Terminating,
}

/// Outcome of servicing one ready slot.
enum ReadOutcome {
    /// No plaintext available; readiness was spurious or already drained.
    WouldBlock,
    /// Bytes arrived but no terminator yet.
    Incomplete,
    /// No room left to read; the buffered fragment was discarded.
    Overflow,
    /// A terminator completed a message of `len` bytes. `suppressed`
    /// marks the tail of an overflowed message, which is discarded.
    Message { len: usize, suppressed: bool },
    /// Orderly end of stream.
    EndOfData,
    /// Transport fault.
    Failed(io::Error),
}

/// The connection-multiplexing reactor.
///
/// Owns every piece of loop state (poller, listener, connection table,
/// acceptor, handler) so independent servers can coexist in one process.
pub struct Server<H: ServiceHandler> {
    config: ServerConfig,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    acceptor: Box<dyn Acceptor>,
    table: ClientTable,
    handler: H,
    heartbeat: Heartbeat,
    control: Control,
    listener_ready: bool,
    state: LoopState,
}

impl<H: ServiceHandler> Server<H> {
    /// Binds the listener and prepares the readiness set. Failures here
    /// are fatal per the error policy; nothing is retried.
    pub fn new(
        config: ServerConfig,
        acceptor: Box<dyn Acceptor>,
        handler: H,
    ) -> Result<Self, ServerError> {
        let mut listener = TcpListener::bind(config.address).map_err(|source| ServerError::Bind {
            addr: config.address,
            source,
        })?;
        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Register)?;

        let table = ClientTable::new(config.max_clients, config.buffer_size);
        let heartbeat = Heartbeat::new(config.tick_interval, now_secs());

        if let Ok(local) = listener.local_addr() {
            config.logger.log(
                LogLevel::Info,
                &format!("listening on {local} ({} client slots)", config.max_clients),
            );
        }

        Ok(Server {
            config,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            acceptor,
            table,
            handler,
            heartbeat,
            control: Control::new(),
            listener_ready: false,
            state: LoopState::Initializing,
        })
    }

    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the loop until a shutdown is requested through a dispatch
    /// handle or the readiness wait fails. Either way the teardown runs
    /// before returning: every client is dropped and the listener leaves
    /// the readiness set.
    pub fn run(&mut self) -> Result<(), ServerError> {
        if self.state == LoopState::Terminating {
            return Ok(());
        }
        self.state = LoopState::Listening;

        let result = loop {
            if let Err(err) = self.turn() {
                self.config
                    .logger
                    .log(LogLevel::Error, &format!("fatal: {err}"));
                break Err(err);
            }
            if self.control.shutdown_requested {
                break Ok(());
            }
        };

        self.state = LoopState::Terminating;
        self.teardown();
        result
    }

    /// One loop iteration: wait, note readiness, tick, accept, sweep.
    fn turn(&mut self) -> Result<(), ServerError> {
        let timeout = if self.listener_ready || self.table.any_ready() {
            Duration::ZERO
        } else {
            self.config.poll_timeout
        };
        self.poll
            .poll(&mut self.events, Some(timeout))
            .map_err(ServerError::Wait)?;

        for event in self.events.iter() {
            match event.token() {
                LISTENER => self.listener_ready = true,
                Token(index) => self.table.mark_ready(index),
            }
        }

        if self.heartbeat.due(now_secs()) {
            self.run_heartbeat();
        }

        if self.listener_ready {
            self.accept_one();
        }

        for index in 0..self.table.capacity() {
            if self.table.is_ready(index) {
                self.service_client(index);
            }
        }

        Ok(())
    }

    /// Ages every active client, drops the ones past the idle threshold,
    /// then fires the slot-less timer event.
    fn run_heartbeat(&mut self) {
        for index in 0..self.table.capacity() {
            let expired = {
                let Some(slot) = self.table.slot_mut(index) else {
                    continue;
                };
                if !slot.is_active() {
                    continue;
                }
                slot.idle_ticks += 1;
                if slot.idle_ticks >= self.config.idle_timeout_ticks {
                    slot.conn.as_ref().map(|conn| ClientInfo {
                        id: ClientTable::id_of(index),
                        peer: conn.peer,
                    })
                } else {
                    None
                }
            };
            if let Some(info) = expired {
                self.config
                    .logger
                    .log(LogLevel::Info, &format!("client {} timed out", info.id));
                self.handler.on_timeout(&info);
                self.drop_client(index);
            }
        }

        self.handler.on_timer_expired(&mut self.control);
    }

    /// Accepts one pending connection. Capacity is checked before any
    /// resource is committed: a connection beyond the slot limit is
    /// closed immediately with no handshake, no slot, and no event.
    fn accept_one(&mut self) {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.listener_ready = false;
                return;
            }
            Err(err) => {
                self.config
                    .logger
                    .log(LogLevel::Error, &format!("accept error: {err}"));
                self.listener_ready = false;
                return;
            }
        };

        let Some(index) = self.table.allocate() else {
            self.config.logger.log(
                LogLevel::Warn,
                &format!(
                    "max clients reached ({} active), rejecting {peer}",
                    self.table.active_count()
                ),
            );
            return;
        };

        let _ = stream.set_nodelay(true);

        match self.acceptor.handshake(stream) {
            Ok(mut session) => {
                if let Err(err) =
                    self.poll
                        .registry()
                        .register(&mut *session, Token(index), Interest::READABLE)
                {
                    self.config.logger.log(
                        LogLevel::Error,
                        &format!("failed to register client from {peer}: {err}"),
                    );
                    session.close();
                    return;
                }
                self.table.activate(index, session, peer);
                self.config.logger.log(
                    LogLevel::Info,
                    &format!("client {} connected from {peer}", ClientTable::id_of(index)),
                );
                self.dispatch_connect(index);
            }
            Err(err) => {
                self.config.logger.log(
                    LogLevel::Warn,
                    &format!("handshake with {peer} failed: {err}"),
                );
            }
        }
    }

    /// Applies the overflow guard and one read to a ready slot, then
    /// dispatches whatever the read produced.
    fn service_client(&mut self, index: usize) {
        let outcome = match self.table.slot_mut(index) {
            Some(slot) if slot.is_active() => read_ready_slot(slot, self.config.buffer_size),
            _ => return,
        };

        match outcome {
            ReadOutcome::WouldBlock => {
                if let Some(slot) = self.table.slot_mut(index) {
                    slot.ready = false;
                }
            }
            ReadOutcome::Incomplete => {}
            ReadOutcome::Overflow => {
                // The unread input stays pending, so `ready` stays set and
                // the now-empty buffer absorbs it next iteration.
                if let Some(info) = self.client_info(index) {
                    self.handler.on_overflow(&info);
                }
            }
            ReadOutcome::Message { len, suppressed } => {
                if !suppressed {
                    self.dispatch_data(index, len);
                }
            }
            ReadOutcome::EndOfData => {
                if let Some(info) = self.client_info(index) {
                    self.config
                        .logger
                        .log(LogLevel::Info, &format!("client {} disconnected", info.id));
                    self.handler.on_end_of_data(&info);
                }
                self.drop_client(index);
            }
            ReadOutcome::Failed(err) => {
                if let Some(info) = self.client_info(index) {
                    self.config.logger.log(
                        LogLevel::Warn,
                        &format!("read error on client {}: {err}", info.id),
                    );
                    self.handler.on_error(&info);
                }
                self.drop_client(index);
            }
        }
    }

    fn dispatch_connect(&mut self, index: usize) {
        if let Some(slot) = self.table.slot_mut(index) {
            if let Some(conn) = slot.conn.as_mut() {
                let mut client = Client::new(
                    ClientTable::id_of(index),
                    conn.peer,
                    &mut *conn.session,
                    &mut self.control,
                );
                self.handler.on_connect(&mut client);
            }
        }
        self.finish_dispatch(index);
    }

    fn dispatch_data(&mut self, index: usize, len: usize) {
        if let Some(slot) = self.table.slot_mut(index) {
            if let (Some(conn), Some(buffer)) = (slot.conn.as_mut(), slot.buffer.as_ref()) {
                let message = &buffer[..len];
                let mut client = Client::new(
                    ClientTable::id_of(index),
                    conn.peer,
                    &mut *conn.session,
                    &mut self.control,
                );
                self.handler.on_data(&mut client, message);
            }
        }
        self.finish_dispatch(index);
    }

    /// Applies a drop the handler requested during the dispatch that just
    /// returned.
    fn finish_dispatch(&mut self, index: usize) {
        if self.control.take_drop() {
            self.drop_client(index);
        }
    }

    fn client_info(&mut self, index: usize) -> Option<ClientInfo> {
        let slot = self.table.slot_mut(index)?;
        slot.conn.as_ref().map(|conn| ClientInfo {
            id: ClientTable::id_of(index),
            peer: conn.peer,
        })
    }

    /// Removes a client from the readiness set and closes its session.
    /// Safe to call for already-dropped clients.
    fn drop_client(&mut self, index: usize) {
        if let Some(mut session) = self.table.release(index) {
            let _ = self.poll.registry().deregister(&mut *session);
            session.close();
        }
    }

    fn teardown(&mut self) {
        for index in 0..self.table.capacity() {
            self.drop_client(index);
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        self.config.logger.log(LogLevel::Info, "server terminated");
    }
}

/// One read for one slot, with the overflow guard applied first. Framing
/// per the message protocol: the scan covers only the newly appended
/// region, a completed message resets the buffer, and bytes read past the
/// terminator are discarded with it.
fn read_ready_slot(slot: &mut Slot, buffer_size: usize) -> ReadOutcome {
    let free = buffer_size - slot.used;
    if free < OVERFLOW_RESERVE {
        slot.used = 0;
        slot.overflowed = true;
        return ReadOutcome::Overflow;
    }

    let Some(conn) = slot.conn.as_mut() else {
        return ReadOutcome::WouldBlock;
    };
    let Some(buffer) = slot.buffer.as_mut() else {
        return ReadOutcome::WouldBlock;
    };

    let start = slot.used;
    match conn.session.read(&mut buffer[start..]) {
        Ok(0) => ReadOutcome::EndOfData,
        Ok(n) => {
            slot.used += n;
            slot.idle_ticks = 0;
            match framing::scan(&buffer[..slot.used], start) {
                Some(pos) => {
                    let suppressed = slot.overflowed;
                    slot.overflowed = false;
                    slot.used = 0;
                    ReadOutcome::Message {
                        len: pos,
                        suppressed,
                    }
                }
                None => ReadOutcome::Incomplete,
            }
        }
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
        Err(err) => ReadOutcome::Failed(err),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ClientTable;
    use crate::transport::Session;
    use mio::event::Source;
    use mio::Registry;
    use std::collections::VecDeque;

    /// Session fed from a script of read results.
    struct ScriptedSession {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedSession {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            ScriptedSession {
                reads: reads.into(),
            }
        }
    }

    impl Source for ScriptedSession {
        fn register(&mut self, _: &Registry, _: Token, _: Interest) -> io::Result<()> {
            Ok(())
        }
        fn reregister(&mut self, _: &Registry, _: Token, _: Interest) -> io::Result<()> {
            Ok(())
        }
        fn deregister(&mut self, _: &Registry) -> io::Result<()> {
            Ok(())
        }
    }

    impl Session for ScriptedSession {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn close(&mut self) {}
    }

    fn table_with(reads: Vec<io::Result<Vec<u8>>>, buffer_size: usize) -> ClientTable {
        let mut table = ClientTable::new(1, buffer_size);
        table.activate(
            0,
            Box::new(ScriptedSession::new(reads)),
            "127.0.0.1:9".parse().unwrap(),
        );
        table
    }

    #[test]
    fn one_read_yields_at_most_one_message() {
        // Two messages in one read: the first completes, the rest of the
        // read is discarded with the buffer reset.
        let mut table = table_with(vec![Ok(b"a\nb\n".to_vec())], 64);
        let slot = table.slot_mut(0).unwrap();
        match read_ready_slot(slot, 64) {
            ReadOutcome::Message { len, suppressed } => {
                assert_eq!(len, 1);
                assert!(!suppressed);
            }
            _ => panic!("expected a completed message"),
        }
        assert_eq!(table.slot_mut(0).unwrap().used, 0);
    }

    #[test]
    fn partial_reads_accumulate_until_the_terminator() {
        let mut table = table_with(vec![Ok(b"he".to_vec()), Ok(b"llo\n".to_vec())], 64);

        let slot = table.slot_mut(0).unwrap();
        assert!(matches!(
            read_ready_slot(slot, 64),
            ReadOutcome::Incomplete
        ));
        assert_eq!(slot.used, 2);

        match read_ready_slot(slot, 64) {
            ReadOutcome::Message { len, suppressed } => {
                assert_eq!(len, 5);
                assert!(!suppressed);
                assert_eq!(&slot.buffer.as_ref().unwrap()[..len], b"hello");
            }
            _ => panic!("expected a completed message"),
        }
    }

    #[test]
    fn read_activity_resets_idle_ticks() {
        let mut table = table_with(vec![Ok(b"x".to_vec())], 64);
        let slot = table.slot_mut(0).unwrap();
        slot.idle_ticks = 7;
        let _ = read_ready_slot(slot, 64);
        assert_eq!(slot.idle_ticks, 0);
    }

    #[test]
    fn full_buffer_triggers_overflow_and_swallows_the_tail() {
        // 8-byte buffer: the first read fills it, the guard then fires,
        // and the terminator that finally arrives is suppressed.
        let mut table = table_with(
            vec![Ok(b"12345678".to_vec()), Ok(b"9\n".to_vec())],
            8,
        );

        let slot = table.slot_mut(0).unwrap();
        assert!(matches!(read_ready_slot(slot, 8), ReadOutcome::Incomplete));
        assert_eq!(slot.used, 8);

        assert!(matches!(read_ready_slot(slot, 8), ReadOutcome::Overflow));
        assert_eq!(slot.used, 0);
        assert!(slot.overflowed);

        match read_ready_slot(slot, 8) {
            ReadOutcome::Message { suppressed, .. } => assert!(suppressed),
            _ => panic!("expected the overflowed tail to complete"),
        }
        assert!(!slot.overflowed);
    }

    #[test]
    fn end_of_data_and_errors_are_distinguished() {
        let mut table = table_with(vec![Ok(Vec::new())], 64);
        let slot = table.slot_mut(0).unwrap();
        assert!(matches!(read_ready_slot(slot, 64), ReadOutcome::EndOfData));

        let mut table = table_with(
            vec![Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))],
            64,
        );
        let slot = table.slot_mut(0).unwrap();
        assert!(matches!(read_ready_slot(slot, 64), ReadOutcome::Failed(_)));
    }
}
