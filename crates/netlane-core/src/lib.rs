//! # netlane-core — Types and trait boundaries for netlane
//!
//! This crate defines the seams of the server engine. Each trait models one
//! axis of variability; default implementations live in `netlane-module`.
//!
//! ```text
//!   socket bytes ──► Buffer ──► Decoder ──► message sink (Handler::on_message)
//!                      ▲                          │
//!          BufferProvider (pooled arrays)         ▼
//!                                          Encoder ──► wire bytes
//!
//!   Poller { register, rearm, deregister, poll, wake } ──► Event { token, kind }
//! ```
//!
//! - `buffer` - growable read buffer with read/write cursors, plus the
//!   `BufferProvider` that leases and reclaims its backing arrays
//! - `codec` - framing contract (`Decoder`, `Encoder`)
//! - `poller` - readiness multiplexer capability
//! - `error` - close reasons and framing errors
//! - `env` - environment variable helpers used by configuration layers

pub mod buffer;
pub mod codec;
pub mod env;
pub mod error;
pub mod poller;

pub use buffer::{Buffer, BufferProvider, PoolStats};
pub use codec::{Decoder, Encoder};
pub use error::{CloseReason, FramingError};
pub use poller::{Event, EventKind, Poller, Token};
