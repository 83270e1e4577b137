//! Thin libc wrappers.
//!
//! Every helper converts the C return convention (negative + errno) into
//! `io::Result` through `nix::errno::Errno`.

use nix::errno::Errno;

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Map a C return value to `io::Result`, reading errno on `-1`.
#[inline]
pub fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    Errno::result(ret).map_err(io::Error::from)
}

/// Clamp a duration to a poll-style millisecond timeout, rounding up so a
/// sub-millisecond wait does not become a busy spin.
#[inline]
pub fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

/// `shutdown(fd, SHUT_RDWR)`.
///
/// On a listening socket this fails every blocked and future `accept()`
/// with `EINVAL`, which acceptor loops take as their exit signal.
pub fn shutdown_both(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { libc::shutdown(fd, libc::SHUT_RDWR) }).map(drop)
}

/// Block until `fd` is writable or `timeout` elapses.
///
/// Returns `Ok(false)` on timeout.
pub fn wait_writable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let ms = timeout_ms(Some(timeout));
    loop {
        match cvt(unsafe { libc::poll(&mut pfd, 1, ms) }) {
            Ok(n) => return Ok(n > 0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Whether an `accept()` error means the listener itself is gone.
pub fn is_listener_closed(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error().map(Errno::from_raw),
        Some(Errno::EINVAL) | Some(Errno::EBADF) | Some(Errno::ENOTSOCK)
    )
}

/// Whether an `accept()` error is descriptor or memory exhaustion, worth a
/// short back-off before retrying.
pub fn is_resource_exhausted(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error().map(Errno::from_raw),
        Some(Errno::EMFILE) | Some(Errno::ENFILE) | Some(Errno::ENOBUFS) | Some(Errno::ENOMEM)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_ms_rounds_up() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_ms(Some(Duration::from_millis(250))), 250);
        assert_eq!(timeout_ms(Some(Duration::from_secs(u64::MAX))), libc::c_int::MAX);
    }

    #[test]
    fn test_cvt_reports_errno() {
        let err = cvt(unsafe { libc::close(-1) }).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn test_error_classification() {
        assert!(is_listener_closed(&io::Error::from_raw_os_error(libc::EINVAL)));
        assert!(!is_listener_closed(&io::Error::from_raw_os_error(libc::EMFILE)));
        assert!(is_resource_exhausted(&io::Error::from_raw_os_error(libc::EMFILE)));
        assert!(!is_resource_exhausted(&io::Error::from(io::ErrorKind::WouldBlock)));
    }

    #[test]
    fn test_shutdown_unblocks_accept() {
        use std::net::TcpListener;
        use std::os::unix::io::AsRawFd;
        use std::sync::Arc;

        let listener = Arc::new(TcpListener::bind("127.0.0.1:0").unwrap());
        let l2 = Arc::clone(&listener);
        let waiter = std::thread::spawn(move || l2.accept().map(|_| ()));
        std::thread::sleep(Duration::from_millis(50));
        shutdown_both(listener.as_raw_fd()).unwrap();
        let err = waiter.join().unwrap().unwrap_err();
        assert!(is_listener_closed(&err), "{err:?}");
    }
}
