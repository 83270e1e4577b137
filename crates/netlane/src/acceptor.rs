//! Acceptor loops
//!
//! Each loop blocks in `accept()` on the shared listener. `stop()` shuts
//! the listener down, which fails every pending `accept()` and ends the
//! loops. Other accept errors are logged and the loop keeps going.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use netlane_core::buffer::Buffer;
use netlane_core::error::CloseReason;
use netlane_module::sys;

use crate::conn::Conn;
use crate::server::Shared;

/// Back-off when the process runs out of descriptors or memory.
const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(10);

pub(crate) fn accept_loop(server: Arc<Shared>, index: usize) {
    debug!(acceptor = index, addr = %server.local_addr, "acceptor started");

    while !server.is_stopping() {
        match server.listener.accept() {
            Ok((stream, peer)) => {
                if server.is_stopping() {
                    let _ = stream.shutdown(Shutdown::Both);
                    break;
                }
                if let Err(e) = admit(&server, stream, peer) {
                    warn!(acceptor = index, %peer, error = %e, "failed to admit connection");
                }
            }
            Err(e) if server.is_stopping() => {
                debug!(acceptor = index, error = %e, "listener shut down");
                break;
            }
            Err(e) if sys::is_listener_closed(&e) => {
                error!(acceptor = index, error = %e, "listener closed unexpectedly");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(acceptor = index, error = %e, "accept failed");
                if sys::is_resource_exhausted(&e) {
                    thread::sleep(EXHAUSTED_BACKOFF);
                }
            }
        }
    }

    debug!(acceptor = index, "acceptor stopped");
}

/// Register a freshly accepted socket: registry, `on_connect`, timeout
/// watch, then the poller. Events can only arrive after `on_connect`.
fn admit(server: &Arc<Shared>, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "TCP_NODELAY not set");
    }

    let id = server.next_conn_id();
    let buffer = Buffer::new(server.pool.acquire(server.config.read_buffer_len));
    let conn = Arc::new(Conn::new(
        id,
        stream,
        peer.to_string(),
        buffer,
        Arc::downgrade(server),
        server.now_ms(),
    ));

    server.registry.insert(Arc::clone(&conn));
    debug!(conn = %id, addr = %peer, fd = conn.fd(), "connection accepted");
    server.handler.on_connect(&conn);
    if conn.is_closed() {
        return Ok(());
    }

    if let Some(supervisor) = &server.supervisor {
        supervisor.watch(id, conn.last_read_ms());
    }
    if let Err(e) = server.poller.register(conn.fd(), id.as_u64()) {
        conn.close_with(CloseReason::Io(e));
    }
    Ok(())
}
