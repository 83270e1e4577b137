//! Readiness multiplexer abstraction.
//!
//! A `Poller` watches registered non-blocking sockets and reports which are
//! ready. Reactor loops call `poll()`; acceptors call `register()`; the
//! close routine calls `deregister()`.
//!
//! # Implementors
//!
//! - `EpollPoller` (Linux): one epoll instance shared by every reactor
//!   loop. Registrations are one-shot, so a ready socket is handed to a
//!   single loop until `rearm()`.
//!
//! A completion-port style backend for platforms without epoll would satisfy
//! the same trait; none is provided.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Opaque value attached to a registration and echoed back in its events.
pub type Token = u64;

/// What a readiness notification means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Bytes (or EOF) are available; drain the socket.
    Readable,
    /// Peer hangup or socket error detected with nothing left to read.
    Closed,
}

/// One readiness notification. Lives for one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: Token,
    pub kind: EventKind,
}

/// Readiness multiplexer.
///
/// **Contract:**
/// - After an event for `token` is returned, that registration produces no
///   further events until `rearm()` is called for it.
/// - `poll()` appends at most `events.capacity()` events (at least one slot
///   is always used) and returns how many were appended. A timeout or
///   signal interruption yields `Ok(0)`.
/// - `wake()` makes every current and future `poll()` return promptly.
///   It is meant for shutdown and cannot be undone.
pub trait Poller: Send + Sync {
    /// Start watching `fd` for readability.
    fn register(&self, fd: RawFd, token: Token) -> io::Result<()>;

    /// Re-enable notifications after an event was delivered.
    fn rearm(&self, fd: RawFd, token: Token) -> io::Result<()>;

    /// Stop watching `fd`.
    fn deregister(&self, fd: RawFd) -> io::Result<()>;

    /// Block until at least one socket is ready, `timeout` elapses
    /// (`None` = forever) or the poller is woken.
    fn poll(&self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<usize>;

    /// Wake all blocked `poll()` calls.
    fn wake(&self) -> io::Result<()>;

    /// Backend name, for logs.
    fn name(&self) -> &'static str;
}
