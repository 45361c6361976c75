//! Example secure server that responds to hello, path, and goodby.
//!
//! Test with `openssl s_client -connect <hostname>:6666`.
//!
//! The server requires `key.pem` and `cert.pem` certificates. To create
//! self-signed certificates:
//!
//! ```text
//! openssl req -newkey rsa:2048 -new -nodes -x509 \
//!             -days 3650 -keyout key.pem -out cert.pem
//! ```
//!
//! All data transmitted is encrypted.

use std::sync::Arc;
use std::time::Duration;

use mill_line::{Client, ClientInfo, Server, ServerConfig, ServiceHandler, StderrLogger, TlsAcceptor};

/// The reactor keeps track of clients and dispatches their messages; this
/// handler is the part that processes them.
struct Greeter;

impl ServiceHandler for Greeter {
    fn on_connect(&mut self, client: &mut Client<'_>) {
        let _ = client.send(b"Greetings\n> ");
        println!("Client {} connected from {}", client.id(), client.peer());
    }

    fn on_data(&mut self, client: &mut Client<'_>, message: &[u8]) {
        println!("client {} sent {} bytes.", client.id(), message.len());

        if message.starts_with(b"hello") {
            let _ = client.send(b"Hello\n> ");
        } else if message.starts_with(b"path") {
            let path = std::env::var("PATH").unwrap_or_default();
            let _ = client.send(path.as_bytes());
            let _ = client.send(b"\n> ");
        } else if message.starts_with(b"goodby") {
            println!("Client {} said goodby", client.id());
            let _ = client.send(b"So long...\n");
            client.close();
        } else {
            let _ = client.send(b"You said \"");
            let _ = client.send(message);
            let _ = client.send(b"\"\n> ");
        }
    }

    fn on_end_of_data(&mut self, client: &ClientInfo) {
        println!("Client {} dropped", client.id);
    }

    fn on_error(&mut self, client: &ClientInfo) {
        println!("Client {} dropped", client.id);
    }

    fn on_timeout(&mut self, client: &ClientInfo) {
        println!("Client {} dropped", client.id);
    }
}

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::builder()
        .address("0.0.0.0:6666".parse()?)
        .logger(Arc::new(StderrLogger))
        .build();
    let acceptor = TlsAcceptor::from_pem_files("cert.pem", "key.pem", Duration::from_secs(10))?;

    let mut server = Server::new(config, Box::new(acceptor), Greeter)?;
    server.run()?;
    Ok(())
}
