//! Close reasons and framing errors.
//!
//! `WouldBlock` is absent on purpose: it ends a non-blocking drain and is
//! never surfaced. Every other read-path condition is terminal for the
//! connection and is delivered to the application as a `CloseReason`.

use std::io;

use thiserror::Error;

/// Errors raised by a codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// A frame header declared a payload larger than the configured maximum.
    #[error("declared frame length {len} exceeds maximum {max}")]
    LengthTooLarge { len: u64, max: u64 },
    /// An outgoing payload does not fit the configured maximum.
    #[error("payload length {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: u64 },
    /// Length prefix width outside `1..=8`.
    #[error("invalid length prefix width {0}, expected 1..=8")]
    InvalidHeaderLen(usize),
}

/// Why a connection was closed. Delivered exactly once to `on_close`.
#[derive(Error, Debug)]
pub enum CloseReason {
    /// Peer closed its side cleanly.
    #[error("remote closed the connection")]
    RemoteEof,
    /// Socket read failure other than would-block or EOF.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The decoder rejected the stream.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// No bytes arrived within the idle window.
    #[error("read timeout")]
    ReadTimeout,
    /// Server shutdown in progress.
    #[error("server down")]
    ServerDown,
    /// The application closed the connection.
    #[error("closed by application")]
    ExplicitClose,
}

impl CloseReason {
    /// Short stable label, for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteEof => "remote_eof",
            Self::Io(_) => "io_error",
            Self::Framing(_) => "framing_error",
            Self::ReadTimeout => "read_timeout",
            Self::ServerDown => "server_down",
            Self::ExplicitClose => "explicit_close",
        }
    }
}
