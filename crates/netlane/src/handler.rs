//! Application callback contract.

use std::sync::Arc;

use netlane_core::error::CloseReason;

use crate::conn::Conn;

/// Callbacks the server invokes for each connection.
///
/// **Ordering per connection:**
/// - `on_connect` fires once, after registration, before anything else.
/// - `on_message` fires once per decoded frame, in stream order, from the
///   single reactor loop draining that connection.
/// - `on_close` fires exactly once, after the buffer has been released and
///   the registry entry removed. A close issued from inside `on_connect`
///   nests `on_close` within it.
///
/// Callbacks run on server threads; a slow callback stalls the loop that
/// invoked it.
pub trait Handler: Send + Sync + 'static {
    /// A connection was accepted and registered. It is not yet polled, so
    /// no `on_message` can race with this call.
    ///
    /// Calling `conn.close()` here rejects the connection: `on_close` runs
    /// synchronously inside that call with `ExplicitClose`, before
    /// `on_connect` returns, and the socket is never polled.
    fn on_connect(&self, conn: &Arc<Conn>) {
        let _ = conn;
    }

    fn on_message(&self, conn: &Arc<Conn>, payload: &[u8]);

    fn on_close(&self, conn: &Arc<Conn>, reason: CloseReason) {
        let _ = (conn, reason);
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn on_connect(&self, conn: &Arc<Conn>) {
        (**self).on_connect(conn)
    }

    fn on_message(&self, conn: &Arc<Conn>, payload: &[u8]) {
        (**self).on_message(conn, payload)
    }

    fn on_close(&self, conn: &Arc<Conn>, reason: CloseReason) {
        (**self).on_close(conn, reason)
    }
}
