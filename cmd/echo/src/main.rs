//! netlane echo server
//!
//! Echoes every 2-byte length-prefixed frame back to its sender. Idle
//! connections are dropped after 5 seconds.
//!
//! Usage:
//!     cargo build --release -p netlane-echo
//!     ./target/release/netlane-echo [addr] [read_buffer_len]
//!
//! Test with:
//!     ./target/release/netlane-echo-client [addr] [clients]
//!
//! Log level via `RUST_LOG` (default `info`); other knobs via `NETLANE_*`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use netlane::{CloseReason, Conn, Handler, LengthPrefixCodec, Server, ServerConfig};

struct Echo;

impl Handler for Echo {
    fn on_connect(&self, conn: &Arc<Conn>) {
        info!(conn = %conn.id(), fd = conn.fd(), addr = conn.addr(), "connect");
    }

    fn on_message(&self, conn: &Arc<Conn>, payload: &[u8]) {
        info!(conn = %conn.id(), msg = %String::from_utf8_lossy(payload), "read");
        if let Err(e) = conn.write_with_encoder(payload) {
            error!(conn = %conn.id(), error = %e, "echo failed");
            conn.close();
        }
    }

    fn on_close(&self, conn: &Arc<Conn>, reason: CloseReason) {
        info!(conn = %conn.id(), fd = conn.fd(), %reason, "close");
    }
}

fn main() -> netlane::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).cloned().unwrap_or_else(|| "0.0.0.0:8080".into());
    let read_buffer_len: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);

    let config = ServerConfig::from_env()
        .listen_addr(addr)
        .read_buffer_len(read_buffer_len)
        .idle_timeout(Duration::from_secs(5));

    let server = Server::builder(Echo)
        .config(config)
        .codec(LengthPrefixCodec::new(2, 1024)?)
        .build()?;
    server.run()?;
    info!(addr = %server.local_addr(), "echo server listening");

    server.join();
    Ok(())
}
