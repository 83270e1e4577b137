//! # Connection — one accepted socket and its read buffer
//!
//! ```text
//!   accept ──► Open ──(any close trigger)──► Closing ──► Closed
//!                                              │            │
//!                          buffer released, registry     on_close
//!                          entry removed, count - 1      fired once
//! ```
//!
//! Close triggers (read error, EOF, framing error, timeout, explicit close,
//! shutdown) may race from several threads. They all funnel into
//! `close_with`, where a compare-and-swap on the state picks one winner.
//!
//! The buffer slot decides who runs the side effects:
//! - `Idle`: nobody is reading, the winner releases the buffer itself.
//! - `Draining`: a reactor loop holds the buffer; it sees `Closing` when it
//!   hands the buffer back and finishes the close.
//!
//! The state CAS and the slot inspection happen under the slot lock, so
//! exactly one of the two paths performs the release.
//!
//! The socket is shut down and deregistered on close, but its descriptor is
//! only closed when the last `Arc<Conn>` drops. A late `write` therefore
//! fails cleanly instead of hitting a reused descriptor.

use std::any::Any;
use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use netlane_core::buffer::Buffer;
use netlane_core::error::CloseReason;
use netlane_core::poller::Token;
use netlane_module::sys;

use crate::config::defaults;
use crate::error::{Error, Result};
use crate::server::Shared;

/// Registry key. Assigned at accept from a monotonic counter and never
/// reused, unlike file descriptor numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) fn from_token(token: Token) -> Self {
        Self(token)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnState {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnState::Open,
            1 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

enum BufferSlot {
    Idle(Buffer),
    Draining,
    Released,
}

type UserData = Arc<dyn Any + Send + Sync>;

/// A live (or recently closed) client connection.
pub struct Conn {
    id: ConnId,
    stream: TcpStream,
    addr: String,
    state: AtomicU8,
    slot: Mutex<BufferSlot>,
    /// Set by the winning close trigger, consumed by `finish_close`.
    reason: Mutex<Option<CloseReason>>,
    /// Milliseconds since server start of the last successful read.
    last_read: AtomicU64,
    data: Mutex<Option<UserData>>,
    server: Weak<Shared>,
}

impl Conn {
    pub(crate) fn new(
        id: ConnId,
        stream: TcpStream,
        addr: String,
        buffer: Buffer,
        server: Weak<Shared>,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            stream,
            addr,
            state: AtomicU8::new(ConnState::Open as u8),
            slot: Mutex::new(BufferSlot::Idle(buffer)),
            reason: Mutex::new(None),
            last_read: AtomicU64::new(now_ms),
            data: Mutex::new(None),
            server,
        }
    }

    #[inline]
    pub fn id(&self) -> ConnId {
        self.id
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Remote address, `ip:port`.
    #[inline]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[inline]
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once any close trigger has won, even before `on_close` runs.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state() != ConnState::Open
    }

    /// Time since the last successful read (or since accept).
    pub fn idle_for(&self) -> Duration {
        match self.server.upgrade() {
            Some(server) => Duration::from_millis(server.now_ms().saturating_sub(self.last_read_ms())),
            None => Duration::ZERO,
        }
    }

    /// Instant of the last successful read (or of accept). `None` once the
    /// server is gone.
    pub fn last_read(&self) -> Option<Instant> {
        let server = self.server.upgrade()?;
        Some(server.epoch() + Duration::from_millis(self.last_read_ms()))
    }

    #[inline]
    pub(crate) fn last_read_ms(&self) -> u64 {
        self.last_read.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn touch(&self, now_ms: u64) {
        self.last_read.store(now_ms, Ordering::Release);
    }

    #[inline]
    pub(crate) fn stream(&self) -> &TcpStream {
        &self.stream
    }

    // ── Writes ──

    /// One non-blocking `send`. Returns the bytes written, which may be
    /// fewer than `bytes.len()`; a full socket buffer surfaces as an
    /// `Io` error of kind `WouldBlock`. Use `write_all` for full delivery.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok((&self.stream).write(bytes)?)
    }

    /// Write every byte, waiting for writability when the socket is full.
    ///
    /// Fails with `Closed` if the connection closes part-way.
    pub fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let wait = self
            .server
            .upgrade()
            .map(|s| s.config.write_wait)
            .unwrap_or(Duration::from_millis(defaults::WRITE_WAIT_MS));

        let mut rest = bytes;
        while !rest.is_empty() {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            match (&self.stream).write(rest) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => rest = &rest[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    sys::wait_writable(self.fd(), wait)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Encode `payload` with the server's encoder and write all of it.
    pub fn write_with_encoder(&self, payload: &[u8]) -> Result<()> {
        let server = self.server.upgrade().ok_or(Error::Stopped)?;
        let encoder = server.encoder.as_ref().ok_or(Error::NoEncoder)?;
        let wire = encoder.encode(payload)?;
        self.write_all(&wire)
    }

    // ── User data ──

    /// Attach an application value, replacing any previous one.
    pub fn set_data<T: Any + Send + Sync>(&self, value: T) {
        *self.data.lock() = Some(Arc::new(value));
    }

    /// The attached value, if present and of type `T`.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.data.lock().clone()?;
        data.downcast::<T>().ok()
    }

    /// Detach and return the application value.
    pub fn take_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.data.lock().take()
    }

    // ── Close ──

    /// Close the connection. `on_close` receives `ExplicitClose` unless
    /// another trigger won first. Safe to call from any thread, any number
    /// of times.
    pub fn close(self: &Arc<Self>) {
        self.close_with(CloseReason::ExplicitClose);
    }

    /// The single close routine every trigger goes through.
    pub(crate) fn close_with(self: &Arc<Self>, reason: CloseReason) {
        let released = {
            let mut slot = self.slot.lock();
            if self
                .state
                .compare_exchange(
                    ConnState::Open as u8,
                    ConnState::Closing as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                return;
            }
            trace!(conn = %self.id, reason = reason.as_str(), "close triggered");
            *self.reason.lock() = Some(reason);
            match std::mem::replace(&mut *slot, BufferSlot::Released) {
                BufferSlot::Idle(buffer) => Some(buffer),
                other => {
                    // a reactor is draining; it finishes the close
                    *slot = other;
                    None
                }
            }
        };

        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(server) = self.server.upgrade() {
            if let Err(e) = server.poller.deregister(self.fd()) {
                trace!(conn = %self.id, error = %e, "deregister failed");
            }
        }

        if let Some(buffer) = released {
            self.finish_close(buffer);
        }
    }

    /// Check the buffer out for a drain. `None` if the connection is
    /// closing or another drain is in flight.
    pub(crate) fn begin_drain(&self) -> Option<Buffer> {
        let mut slot = self.slot.lock();
        if self.state() != ConnState::Open {
            return None;
        }
        match std::mem::replace(&mut *slot, BufferSlot::Draining) {
            BufferSlot::Idle(buffer) => Some(buffer),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Hand the buffer back after a drain. Returns `false` if a close won
    /// meanwhile, in which case this call has completed it.
    pub(crate) fn end_drain(self: &Arc<Self>, buffer: Buffer) -> bool {
        {
            let mut slot = self.slot.lock();
            if self.state() == ConnState::Open {
                *slot = BufferSlot::Idle(buffer);
                return true;
            }
            *slot = BufferSlot::Released;
        }
        self.finish_close(buffer);
        false
    }

    /// Side effects of a committed close, in order: buffer release,
    /// registry removal + count decrement, `Closed`, `on_close`. The
    /// timeout supervisor is told so it can shed the stale deadline.
    fn finish_close(self: &Arc<Self>, buffer: Buffer) {
        let reason = self
            .reason
            .lock()
            .take()
            .unwrap_or(CloseReason::ExplicitClose);

        let Some(server) = self.server.upgrade() else {
            self.state.store(ConnState::Closed as u8, Ordering::Release);
            return;
        };
        server.pool.release(buffer.into_inner());
        server.registry.remove(self);
        if let Some(supervisor) = server.supervisor.as_ref() {
            supervisor.forget();
        }
        self.state.store(ConnState::Closed as u8, Ordering::Release);

        debug!(conn = %self.id, addr = %self.addr, reason = %reason, "connection closed");
        server.handler.on_close(self, reason);
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("fd", &self.fd())
            .field("addr", &self.addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;

    /// Connected (client, server-side Conn) pair with no server attached.
    pub(crate) fn detached(id: u64) -> (TcpStream, Arc<Conn>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();
        let conn = Conn::new(
            ConnId::new(id),
            stream,
            peer.to_string(),
            Buffer::new(vec![0; 16]),
            Weak::new(),
            0,
        );
        (client, Arc::new(conn))
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_client, conn) = detached(1);
        assert_eq!(conn.state(), ConnState::Open);
        conn.close();
        assert_eq!(conn.state(), ConnState::Closed);
        conn.close();
        conn.close_with(CloseReason::ReadTimeout);
        assert_eq!(conn.state(), ConnState::Closed);
        assert!(conn.begin_drain().is_none());
    }

    #[test]
    fn test_close_during_drain_defers_release() {
        let (_client, conn) = detached(2);
        let buffer = conn.begin_drain().unwrap();
        // second reader is refused
        assert!(conn.begin_drain().is_none());

        conn.close_with(CloseReason::ReadTimeout);
        assert_eq!(conn.state(), ConnState::Closing);

        assert!(!conn.end_drain(buffer));
        assert_eq!(conn.state(), ConnState::Closed);
    }

    #[test]
    fn test_drain_round_trip_keeps_open() {
        let (_client, conn) = detached(3);
        let buffer = conn.begin_drain().unwrap();
        assert!(conn.end_drain(buffer));
        assert_eq!(conn.state(), ConnState::Open);
        assert!(conn.begin_drain().is_some());
    }

    #[test]
    fn test_write_after_close_fails() {
        let (_client, conn) = detached(4);
        assert_eq!(conn.write(b"hi").unwrap(), 2);
        conn.close();
        assert!(matches!(conn.write(b"hi"), Err(Error::Closed)));
        assert!(matches!(conn.write_all(b"hi"), Err(Error::Closed)));
    }

    #[test]
    fn test_user_data() {
        let (_client, conn) = detached(5);
        assert!(conn.data::<u32>().is_none());
        conn.set_data(42u32);
        assert_eq!(*conn.data::<u32>().unwrap(), 42);
        assert!(conn.data::<String>().is_none());
        conn.set_data(String::from("session"));
        assert_eq!(conn.data::<String>().unwrap().as_str(), "session");
        assert!(conn.take_data().is_some());
        assert!(conn.data::<String>().is_none());
    }

    #[test]
    fn test_concurrent_close_single_winner() {
        use std::thread;
        for round in 0..50 {
            let (_client, conn) = detached(100 + round);
            let buffer = conn.begin_drain().unwrap();
            let closers: Vec<_> = (0..4)
                .map(|i| {
                    let conn = Arc::clone(&conn);
                    thread::spawn(move || {
                        let reason = if i % 2 == 0 {
                            CloseReason::ReadTimeout
                        } else {
                            CloseReason::ServerDown
                        };
                        conn.close_with(reason);
                    })
                })
                .collect();
            for c in closers {
                c.join().unwrap();
            }
            assert_eq!(conn.state(), ConnState::Closing);
            assert!(!conn.end_drain(buffer));
            assert_eq!(conn.state(), ConnState::Closed);
        }
    }

    #[test]
    fn test_full_socket_would_block_then_write_all_waits() {
        use std::io::Read;
        use std::thread;

        let (mut client, conn) = detached(7);
        let chunk = [0x5Au8; 64 * 1024];

        // the client is not reading yet, so the send buffer fills up
        let mut queued = 0usize;
        let mut blocked = false;
        for _ in 0..10_000 {
            match conn.write(&chunk) {
                Ok(n) => {
                    assert!(n > 0 && n <= chunk.len());
                    queued += n;
                }
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    blocked = true;
                    break;
                }
                Err(e) => panic!("unexpected {e:?}"),
            }
        }
        assert!(blocked, "socket never filled after {queued} bytes");

        // write_all has to wait for the reader to make room
        let tail = vec![0xA5u8; 1 << 20];
        let expected = queued + tail.len();
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut total = 0usize;
            let mut buf = vec![0u8; 64 * 1024];
            while total < expected {
                match client.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => total += n,
                    Err(e) => panic!("read failed: {e}"),
                }
            }
            total
        });

        conn.write_all(&tail).unwrap();
        assert_eq!(reader.join().unwrap(), expected);
    }

    #[test]
    fn test_write_with_encoder_without_server() {
        let (_client, conn) = detached(6);
        assert!(matches!(conn.write_with_encoder(b"x"), Err(Error::Stopped)));
    }
}
