//! `EpollPoller` — epoll `Poller` implementation.
//!
//! One epoll instance is shared by all reactor loops. Connection sockets are
//! registered level-triggered with `EPOLLONESHOT`: a readiness report
//! disables the registration until `rearm()`, so at most one loop drains a
//! given socket at a time.
//!
//! Event mapping:
//! - `EPOLLIN` set (with or without hangup bits): `Readable`. The drain
//!   delivers any remaining bytes and then observes EOF or the error.
//! - only `EPOLLRDHUP`/`EPOLLHUP`/`EPOLLERR`: `Closed`.
//!
//! The raw `epoll_event` array lives in a per-thread scratch buffer that
//! only ever grows, so a reactor loop allocates it once.

use netlane_core::poller::{Event, EventKind, Poller, Token};

use crate::eventfd_waker::EventFdWaker;
use crate::sys::{cvt, timeout_ms};

use std::cell::RefCell;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use tracing::{debug, trace};

/// Reserved token for the waker eventfd. Never handed to callers.
const WAKE_TOKEN: Token = u64::MAX;

const CONN_EVENTS: u32 = (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLONESHOT) as u32;
const WAKE_EVENTS: u32 = libc::EPOLLIN as u32;

thread_local! {
    static SCRATCH: RefCell<Vec<libc::epoll_event>> = const { RefCell::new(Vec::new()) };
}

pub struct EpollPoller {
    epfd: OwnedFd,
    waker: EventFdWaker,
}

impl EpollPoller {
    pub fn new() -> io::Result<Self> {
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        // Safety: epoll_create1 just returned a fresh descriptor we own.
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        let poller = Self {
            epfd,
            waker: EventFdWaker::create()?,
        };
        poller.ctl(libc::EPOLL_CTL_ADD, poller.waker.fd(), WAKE_EVENTS, WAKE_TOKEN)?;
        debug!(epfd = fd, waker = poller.waker.fd(), "epoll poller created");
        Ok(poller)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32, token: Token) -> io::Result<()> {
        let mut ev = libc::epoll_event { events, u64: token };
        cvt(unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev) }).map(drop)
    }

    #[inline]
    fn classify(bits: u32) -> EventKind {
        if bits & libc::EPOLLIN as u32 != 0 {
            EventKind::Readable
        } else {
            EventKind::Closed
        }
    }
}

impl Poller for EpollPoller {
    fn register(&self, fd: RawFd, token: Token) -> io::Result<()> {
        debug_assert_ne!(token, WAKE_TOKEN);
        self.ctl(libc::EPOLL_CTL_ADD, fd, CONN_EVENTS, token)
    }

    fn rearm(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, CONN_EVENTS, token)
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, 0, 0)
    }

    fn poll(&self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<usize> {
        let max = events
            .capacity()
            .saturating_sub(events.len())
            .clamp(1, libc::c_int::MAX as usize);

        SCRATCH.with(|scratch| {
            let mut raw = scratch.borrow_mut();
            if raw.len() < max {
                raw.resize(max, libc::epoll_event { events: 0, u64: 0 });
            }

            let ret = unsafe {
                libc::epoll_wait(
                    self.epfd.as_raw_fd(),
                    raw.as_mut_ptr(),
                    max as libc::c_int,
                    timeout_ms(timeout),
                )
            };
            let n = match cvt(ret) {
                Ok(n) => n as usize,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
                Err(e) => return Err(e),
            };

            let before = events.len();
            for ev in raw[..n].iter().copied() {
                let (bits, token) = (ev.events, ev.u64);
                if token == WAKE_TOKEN {
                    continue;
                }
                events.push(Event {
                    token,
                    kind: Self::classify(bits),
                });
            }
            Ok(events.len() - before)
        })
    }

    fn wake(&self) -> io::Result<()> {
        trace!(epfd = self.epfd.as_raw_fd(), "waking pollers");
        self.waker.wake()
    }

    fn name(&self) -> &'static str {
        "epoll"
    }
}
