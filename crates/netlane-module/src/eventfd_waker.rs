//! `EventFdWaker` — wakes threads blocked in `epoll_wait`.
//!
//! Registered level-triggered and never drained: once written, the eventfd
//! stays readable, so every reactor loop sharing the epoll instance returns
//! from its current and all later waits. That is exactly the shutdown
//! semantics `Poller::wake` promises.

use crate::sys::cvt;

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub(crate) struct EventFdWaker {
    fd: OwnedFd,
}

impl EventFdWaker {
    /// Create a new non-blocking, close-on-exec eventfd.
    pub(crate) fn create() -> io::Result<Self> {
        let fd = cvt(unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) })?;
        // Safety: eventfd just returned a fresh descriptor we own.
        Ok(Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // Counter saturated: a wake is already pending.
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}
