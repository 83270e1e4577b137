//! # netlane — multi-threaded epoll TCP server engine
//!
//! ```text
//!   acceptors ──accept──► Conn ──register──► Poller (epoll, one-shot)
//!                          │                    │
//!                      Registry            reactors: drain → Decoder → Handler::on_message
//!                          │
//!                  timeout supervisor ──► close(ReadTimeout)
//! ```
//!
//! Every connection ends through one close routine: the buffer returns to
//! the pool, the registry entry goes away, and `Handler::on_close` fires
//! exactly once with the reason that won.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use netlane::{Conn, Handler, LengthPrefixCodec, Server, ServerConfig};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn on_message(&self, conn: &Arc<Conn>, payload: &[u8]) {
//!         let _ = conn.write_with_encoder(payload);
//!     }
//! }
//!
//! let server = Server::builder(Echo)
//!     .config(ServerConfig::from_env().listen_addr("127.0.0.1:9000"))
//!     .codec(LengthPrefixCodec::new(2, 1024)?)
//!     .build()?;
//! server.run()?;
//! server.join();
//! ```

pub mod config;
pub mod conn;
pub mod error;
pub mod handler;
pub mod registry;
pub mod server;

mod acceptor;
mod reactor;
mod supervisor;

pub use config::ServerConfig;
pub use conn::{Conn, ConnId, ConnState};
pub use error::{Error, Result};
pub use handler::Handler;
pub use registry::Registry;
pub use server::{Server, ServerBuilder};
pub use supervisor::SupervisorStats;

pub use netlane_core::{
    Buffer, BufferProvider, CloseReason, Decoder, Encoder, Event, EventKind, FramingError,
    PoolStats, Poller, Token,
};
pub use netlane_module::{DefaultPoller, HeapBuffers, LengthPrefixCodec, PooledBuffers};
