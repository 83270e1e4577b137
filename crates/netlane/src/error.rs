//! Server-level errors.

use std::io;

use netlane_core::error::FramingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("connection closed")]
    Closed,
    #[error("no encoder configured")]
    NoEncoder,
    #[error("server already running")]
    AlreadyRunning,
    #[error("server stopped")]
    Stopped,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
