//! Reactor loops
//!
//! Every reactor polls the one shared poller. Registrations are one-shot,
//! so a ready connection is drained by exactly one loop at a time and its
//! messages are delivered in stream order.
//!
//! ```text
//!   poll ──► Readable ──► drain ──► decode ──► on_message ──► rearm
//!        └─► Closed   ──► close(RemoteEof)
//! ```

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, trace};

use netlane_core::buffer::Buffer;
use netlane_core::error::CloseReason;
use netlane_core::poller::EventKind;

use crate::conn::{Conn, ConnId};
use crate::server::Shared;

/// Pause after a failed poll so a persistent error does not spin.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(10);

pub(crate) fn reactor_loop(server: Arc<Shared>, index: usize) {
    let mut events = Vec::with_capacity(server.config.max_events);
    debug!(reactor = index, backend = server.poller.name(), "reactor started");

    while !server.is_stopping() {
        events.clear();
        if let Err(e) = server.poller.poll(&mut events, Some(server.config.poll_timeout)) {
            error!(reactor = index, error = %e, "poll failed");
            thread::sleep(POLL_ERROR_BACKOFF);
            continue;
        }

        for event in &events {
            // closed and removed after the event was queued
            let Some(conn) = server.registry.get(ConnId::from_token(event.token)) else {
                continue;
            };
            match event.kind {
                EventKind::Readable => on_readable(&server, &conn),
                EventKind::Closed => conn.close_with(CloseReason::RemoteEof),
            }
        }
    }

    debug!(reactor = index, "reactor stopped");
}

fn on_readable(server: &Shared, conn: &Arc<Conn>) {
    let Some(mut buffer) = conn.begin_drain() else {
        return;
    };
    if let Err(reason) = drain(server, conn, &mut buffer) {
        conn.close_with(reason);
    }
    if conn.end_drain(buffer) {
        if let Err(e) = server.poller.rearm(conn.fd(), conn.id().as_u64()) {
            conn.close_with(CloseReason::Io(e));
        }
    }
}

/// Read until the socket would block, dispatching after every read.
fn drain(server: &Shared, conn: &Arc<Conn>, buffer: &mut Buffer) -> Result<(), CloseReason> {
    let mut stream = conn.stream();
    loop {
        match buffer.read_from(&mut stream, server.pool.as_ref()) {
            Ok(0) => return Err(CloseReason::RemoteEof),
            Ok(n) => {
                trace!(conn = %conn.id(), bytes = n, buffered = buffer.len(), "read");
                conn.touch(server.now_ms());
                dispatch(server, conn, buffer)?;
                if conn.is_closed() {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CloseReason::Io(e)),
        }
    }
}

/// Hand buffered bytes to the decoder, or pass them through unframed.
fn dispatch(server: &Shared, conn: &Arc<Conn>, buffer: &mut Buffer) -> Result<(), CloseReason> {
    let handler = &server.handler;
    match &server.decoder {
        Some(decoder) => {
            decoder.decode(buffer, &mut |payload: &[u8]| {
                // a handler may close the connection mid-batch
                if !conn.is_closed() {
                    handler.on_message(conn, payload);
                }
            })?;
        }
        None => {
            let payload = buffer.read_all();
            if !payload.is_empty() {
                handler.on_message(conn, payload);
            }
        }
    }
    Ok(())
}
