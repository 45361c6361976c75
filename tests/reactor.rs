//! End-to-end tests for the reactor loop over loopback TCP.
//!
//! The transport seam is exercised with a plaintext `Acceptor`/`Session`
//! pair so these tests cover slot lifecycle, framing, timeouts, and
//! dispatch without certificate fixtures.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Interest, Registry, Token};

use mill_line::{
    Acceptor, Client, ClientInfo, HandshakeError, Server, ServerConfig, ServerConfigBuilder,
    ServerError, ServiceHandler, Session,
};

const EVENT_WAIT: Duration = Duration::from_secs(10);

struct PlainSession {
    stream: mio::net::TcpStream,
}

impl Source for PlainSession {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
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

impl Session for PlainSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct PlainAcceptor;

impl Acceptor for PlainAcceptor {
    fn handshake(
        &mut self,
        stream: mio::net::TcpStream,
    ) -> Result<Box<dyn Session>, HandshakeError> {
        Ok(Box::new(PlainSession { stream }))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
enum Ev {
    Connect(usize),
    Data(usize, Vec<u8>),
    Eod(usize),
    Error(usize),
    Overflow(usize),
    Timeout(usize),
    Timer,
}

/// Records every event; understands `quit` (shut the server down),
/// `bye` (drop me), and `echo` (send a reply).
struct Recorder {
    tx: Sender<Ev>,
}

impl ServiceHandler for Recorder {
    fn on_timer_expired(&mut self, _ctl: &mut mill_line::Control) {
        let _ = self.tx.send(Ev::Timer);
    }

    fn on_connect(&mut self, client: &mut Client<'_>) {
        let _ = self.tx.send(Ev::Connect(client.id().get()));
    }

    fn on_data(&mut self, client: &mut Client<'_>, message: &[u8]) {
        if message == b"quit" {
            client.request_shutdown();
        } else if message == b"bye" {
            client.close();
        } else if message == b"echo" {
            let _ = client.send(b"echoed\n");
        }
        let _ = self.tx.send(Ev::Data(client.id().get(), message.to_vec()));
    }

    fn on_end_of_data(&mut self, client: &ClientInfo) {
        let _ = self.tx.send(Ev::Eod(client.id.get()));
    }

    fn on_error(&mut self, client: &ClientInfo) {
        let _ = self.tx.send(Ev::Error(client.id.get()));
    }

    fn on_overflow(&mut self, client: &ClientInfo) {
        let _ = self.tx.send(Ev::Overflow(client.id.get()));
    }

    fn on_timeout(&mut self, client: &ClientInfo) {
        let _ = self.tx.send(Ev::Timeout(client.id.get()));
    }
}

type ServerHandle = thread::JoinHandle<Result<(), ServerError>>;

fn start_server(
    configure: impl FnOnce(ServerConfigBuilder) -> ServerConfigBuilder,
) -> (SocketAddr, ServerHandle, Receiver<Ev>) {
    let (tx, rx) = mpsc::channel();
    let config = configure(ServerConfig::builder().address("127.0.0.1:0".parse().unwrap())).build();
    let mut server =
        Server::new(config, Box::new(PlainAcceptor), Recorder { tx }).expect("server setup");
    let addr = server.local_addr().expect("local addr");
    let handle = thread::spawn(move || server.run());
    (addr, handle, rx)
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(EVENT_WAIT))
        .expect("read timeout");
    stream
}

fn next_event(rx: &Receiver<Ev>) -> Ev {
    rx.recv_timeout(EVENT_WAIT).expect("timed out waiting for event")
}

/// Waits for an event matching `pred`, skipping the ones that don't
/// (timer ticks, mostly).
fn wait_for(rx: &Receiver<Ev>, mut pred: impl FnMut(&Ev) -> bool) -> Ev {
    let deadline = Instant::now() + EVENT_WAIT;
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for matching event");
        let ev = rx.recv_timeout(remaining).expect("event channel");
        if pred(&ev) {
            return ev;
        }
    }
}

fn read_to_eof(stream: &mut TcpStream) {
    let mut sink = Vec::new();
    let _ = stream.read_to_end(&mut sink);
}

#[test]
fn delivers_messages_and_replies() {
    let (addr, handle, rx) = start_server(|b| b);
    let mut c1 = connect(addr);

    assert_eq!(next_event(&rx), Ev::Connect(1));

    c1.write_all(b"ping\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"ping".to_vec()));

    // An empty line is still one complete (empty) message.
    c1.write_all(b"\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, Vec::new()));

    // The reply path goes back through the session.
    c1.write_all(b"echo\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"echo".to_vec()));
    let mut reply = [0u8; 7];
    c1.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"echoed\n");

    // Shutdown from the handler tears the whole server down.
    c1.write_all(b"quit\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"quit".to_vec()));
    handle.join().unwrap().expect("clean shutdown");
    read_to_eof(&mut c1);
}

#[test]
fn one_message_per_read_with_the_tail_discarded() {
    let (addr, handle, rx) = start_server(|b| b);
    let mut c1 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    // Both lines land in one segment; only the first becomes a message,
    // the rest of that read is dropped with the buffer reset.
    c1.write_all(b"a\nb\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"a".to_vec()));

    thread::sleep(Duration::from_millis(200));
    c1.write_all(b"marker\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"marker".to_vec()));

    c1.write_all(b"quit\n").unwrap();
    let _ = handle.join().unwrap();
}

#[test]
fn accumulates_a_message_across_partial_reads() {
    let (addr, handle, rx) = start_server(|b| b);
    let mut c1 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    c1.write_all(b"pi").unwrap();
    thread::sleep(Duration::from_millis(200));
    c1.write_all(b"ng\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"ping".to_vec()));

    c1.write_all(b"quit\n").unwrap();
    let _ = handle.join().unwrap();
}

#[test]
fn rejects_connections_beyond_capacity_without_events() {
    let (addr, handle, rx) = start_server(|b| b.max_clients(1));

    let c1 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    // The second connection is closed at accept time: no slot, no event.
    let mut c2 = connect(addr);
    read_to_eof(&mut c2);
    thread::sleep(Duration::from_millis(300));
    assert!(rx.try_recv().is_err(), "rejection must not emit events");

    // Dropping the first client frees the slot, and the next accept
    // reuses it, id included.
    drop(c1);
    assert_eq!(next_event(&rx), Ev::Eod(1));

    let mut c3 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    c3.write_all(b"quit\n").unwrap();
    let _ = handle.join().unwrap();
}

#[test]
fn overflow_discards_the_long_message_and_recovers() {
    let (addr, handle, rx) = start_server(|b| b.buffer_size(16));
    let mut c1 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    // 20 bytes with no terminator cannot fit in a 16-byte buffer.
    c1.write_all(&[b'A'; 20]).unwrap();
    assert_eq!(next_event(&rx), Ev::Overflow(1));

    // The terminator that finally ends the over-length message is
    // swallowed, not delivered as a truncated message.
    thread::sleep(Duration::from_millis(200));
    c1.write_all(b"\n").unwrap();
    thread::sleep(Duration::from_millis(200));

    c1.write_all(b"ok\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"ok".to_vec()));

    c1.write_all(b"quit\n").unwrap();
    let _ = handle.join().unwrap();
}

#[test]
fn explicit_close_drops_the_client_without_an_event() {
    let (addr, handle, rx) = start_server(|b| b);
    let mut c1 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    c1.write_all(b"bye\n").unwrap();
    assert_eq!(next_event(&rx), Ev::Data(1, b"bye".to_vec()));
    read_to_eof(&mut c1);

    thread::sleep(Duration::from_millis(300));
    assert!(rx.try_recv().is_err(), "explicit drops emit no event");

    // The slot is reusable afterwards.
    let mut c2 = connect(addr);
    assert_eq!(next_event(&rx), Ev::Connect(1));

    c2.write_all(b"quit\n").unwrap();
    let _ = handle.join().unwrap();
}

#[test]
fn timer_fires_with_zero_clients_and_idle_clients_time_out() {
    let (addr, handle, rx) = start_server(|b| {
        b.tick_interval(Duration::from_secs(1))
            .idle_timeout_ticks(2)
    });

    // Heartbeats arrive with no traffic and no clients at all.
    assert_eq!(wait_for(&rx, |ev| *ev == Ev::Timer), Ev::Timer);
    assert_eq!(wait_for(&rx, |ev| *ev == Ev::Timer), Ev::Timer);

    let mut c1 = connect(addr);
    wait_for(&rx, |ev| *ev == Ev::Connect(1));

    // Silence for two ticks drops the client with exactly one timeout.
    wait_for(&rx, |ev| *ev == Ev::Timeout(1));
    read_to_eof(&mut c1);

    // The slot is immediately reusable by a new accept.
    let mut c2 = connect(addr);
    wait_for(&rx, |ev| *ev == Ev::Connect(1));

    // Activity keeps the replacement alive past the idle threshold.
    for _ in 0..4 {
        c2.write_all(b"keepalive\n").unwrap();
        wait_for(&rx, |ev| matches!(ev, Ev::Data(1, _)));
        thread::sleep(Duration::from_millis(700));
    }

    c2.write_all(b"quit\n").unwrap();
    let _ = handle.join().unwrap();
}

#[test]
fn teardown_closes_every_client() {
    let (addr, handle, rx) = start_server(|b| b.max_clients(4));

    let mut c1 = connect(addr);
    wait_for(&rx, |ev| *ev == Ev::Connect(1));
    let mut c2 = connect(addr);
    wait_for(&rx, |ev| *ev == Ev::Connect(2));

    c1.write_all(b"quit\n").unwrap();
    handle.join().unwrap().expect("clean shutdown");

    // Both sockets see end-of-stream once the loop has terminated.
    read_to_eof(&mut c1);
    read_to_eof(&mut c2);
}
