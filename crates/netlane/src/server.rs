//! # Server — lifecycle and shared state
//!
//! ```text
//!   ServerBuilder::build()      bind listener, create poller + pool
//!          │
//!   Server::run()               spawn reactors, supervisor, acceptors
//!          │
//!   Server::stop()              1. raise stop flag
//!                               2. shut down listener   (acceptors exit)
//!                               3. wake poller          (reactors exit)
//!                               4. unpark supervisor
//!                               5. join acceptors
//!                               6. close live conns with ServerDown
//!                               7. join reactors + supervisor
//! ```
//!
//! Worker threads own an `Arc<Shared>`; connections hold a `Weak` to it so
//! the registry and the connections do not keep each other alive.

use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use netlane_core::buffer::{BufferProvider, PoolStats};
use netlane_core::codec::{Decoder, Encoder};
use netlane_core::error::CloseReason;
use netlane_core::poller::Poller;
use netlane_module::{sys, DefaultPoller, PooledBuffers};

use crate::acceptor::accept_loop;
use crate::config::ServerConfig;
use crate::conn::{Conn, ConnId};
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::reactor::reactor_loop;
use crate::registry::Registry;
use crate::supervisor::{supervisor_loop, SupervisorStats, TimeoutSupervisor};

/// State shared by every server thread and reachable from each `Conn`.
pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) listener: TcpListener,
    pub(crate) local_addr: SocketAddr,
    pub(crate) poller: Box<dyn Poller>,
    pub(crate) pool: Box<dyn BufferProvider>,
    pub(crate) registry: Registry,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) decoder: Option<Arc<dyn Decoder>>,
    pub(crate) encoder: Option<Arc<dyn Encoder>>,
    pub(crate) supervisor: Option<TimeoutSupervisor>,
    stopping: AtomicBool,
    next_id: AtomicU64,
    epoch: Instant,
}

impl Shared {
    #[inline]
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Milliseconds since the server was built.
    #[inline]
    pub(crate) fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    #[inline]
    pub(crate) fn epoch(&self) -> Instant {
        self.epoch
    }

    #[inline]
    pub(crate) fn next_conn_id(&self) -> ConnId {
        ConnId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
struct Workers {
    started: bool,
    acceptors: Vec<JoinHandle<()>>,
    reactors: Vec<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

/// Configures and builds a `Server`.
pub struct ServerBuilder {
    config: ServerConfig,
    handler: Arc<dyn Handler>,
    decoder: Option<Arc<dyn Decoder>>,
    encoder: Option<Arc<dyn Encoder>>,
    pool: Option<Box<dyn BufferProvider>>,
    poller: Option<Box<dyn Poller>>,
}

impl ServerBuilder {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            config: ServerConfig::from_env(),
            handler,
            decoder: None,
            encoder: None,
            pool: None,
            poller: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Frame inbound bytes. Without a decoder every drain is delivered as
    /// one raw message.
    pub fn decoder<D: Decoder + 'static>(mut self, decoder: D) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Used by `Conn::write_with_encoder`.
    pub fn encoder<E: Encoder + 'static>(mut self, encoder: E) -> Self {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    /// Install one value as both decoder and encoder.
    pub fn codec<C: Decoder + Encoder + 'static>(mut self, codec: C) -> Self {
        let codec = Arc::new(codec);
        self.decoder = Some(Arc::clone(&codec) as Arc<dyn Decoder>);
        self.encoder = Some(codec as Arc<dyn Encoder>);
        self
    }

    /// Replace the default `PooledBuffers` provider.
    pub fn buffer_provider<P: BufferProvider + 'static>(mut self, pool: P) -> Self {
        self.pool = Some(Box::new(pool));
        self
    }

    /// Replace the default poller backend.
    pub fn poller<P: Poller + 'static>(mut self, poller: P) -> Self {
        self.poller = Some(Box::new(poller));
        self
    }

    /// Validate the config, bind the listener and create the poller.
    pub fn build(self) -> Result<Server> {
        let config = self.config;
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr).map_err(|source| Error::Bind {
            addr: config.listen_addr.clone(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let poller: Box<dyn Poller> = match self.poller {
            Some(poller) => poller,
            None => Box::new(DefaultPoller::new()?),
        };
        let pool: Box<dyn BufferProvider> = match self.pool {
            Some(pool) => pool,
            None => Box::new(PooledBuffers::new(config.read_buffer_len, config.pool_max_idle)),
        };
        let supervisor = config
            .idle_timeout
            .map(|timeout| TimeoutSupervisor::new(timeout, config.timeout_tick));

        debug!(addr = %local_addr, backend = poller.name(), "listener bound");

        let shared = Shared {
            config,
            listener,
            local_addr,
            poller,
            pool,
            registry: Registry::new(),
            handler: self.handler,
            decoder: self.decoder,
            encoder: self.encoder,
            supervisor,
            stopping: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            epoch: Instant::now(),
        };

        Ok(Server {
            shared: Arc::new(shared),
            workers: Mutex::new(Workers::default()),
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
        })
    }
}

/// A bound TCP server.
///
/// `run()` returns once the worker threads are up; the server then serves
/// until `stop()` (or drop).
///
/// `stop()` joins the reactor threads, so it must not be called from inside
/// a `Handler` callback.
pub struct Server {
    shared: Arc<Shared>,
    workers: Mutex<Workers>,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl Server {
    /// Start building a server around `handler`. Config defaults to
    /// `ServerConfig::from_env()`.
    pub fn builder<H: Handler>(handler: H) -> ServerBuilder {
        ServerBuilder::new(Arc::new(handler))
    }

    /// Spawn reactors, the timeout supervisor and acceptors.
    pub fn run(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.started {
            return Err(Error::AlreadyRunning);
        }
        if self.shared.is_stopping() {
            return Err(Error::Stopped);
        }
        workers.started = true;

        let config = &self.shared.config;
        for index in 0..config.reactors {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("netlane-reactor-{index}"))
                .spawn(move || reactor_loop(shared, index))?;
            workers.reactors.push(handle);
        }

        if self.shared.supervisor.is_some() {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name("netlane-timeout".into())
                .spawn(move || supervisor_loop(shared))?;
            workers.supervisor = Some(handle);
        }

        for index in 0..config.acceptors {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("netlane-accept-{index}"))
                .spawn(move || accept_loop(shared, index))?;
            workers.acceptors.push(handle);
        }

        info!(
            addr = %self.shared.local_addr,
            acceptors = config.acceptors,
            reactors = config.reactors,
            idle_timeout = ?config.idle_timeout,
            backend = self.shared.poller.name(),
            "server running"
        );
        Ok(())
    }

    /// Stop accepting, close every live connection with `ServerDown` and
    /// join all server threads. Later calls wait for the first to finish.
    pub fn stop(&self) {
        if self.shared.stopping.swap(true, Ordering::AcqRel) {
            self.join();
            return;
        }
        info!(addr = %self.shared.local_addr, "server stopping");

        if let Err(e) = sys::shutdown_both(self.shared.listener.as_raw_fd()) {
            debug!(error = %e, "listener shutdown");
        }
        if let Err(e) = self.shared.poller.wake() {
            warn!(error = %e, "poller wake failed");
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        if let Some(handle) = &workers.supervisor {
            handle.thread().unpark();
        }

        for handle in workers.acceptors {
            if handle.join().is_err() {
                warn!("acceptor thread panicked");
            }
        }

        // no new connections past this point
        let live = self.shared.registry.snapshot();
        debug!(count = live.len(), "closing live connections");
        for conn in live {
            conn.close_with(CloseReason::ServerDown);
        }

        for handle in workers.reactors {
            if handle.join().is_err() {
                warn!("reactor thread panicked");
            }
        }
        if let Some(handle) = workers.supervisor {
            if handle.join().is_err() {
                warn!("timeout supervisor thread panicked");
            }
        }

        *self.stopped.lock() = true;
        self.stopped_cv.notify_all();
        info!(remaining = self.shared.registry.len(), "server stopped");
    }

    /// Block until `stop()` has completed.
    pub fn join(&self) {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.stopped_cv.wait(&mut stopped);
        }
    }

    pub fn is_running(&self) -> bool {
        self.workers.lock().started && !self.shared.is_stopping()
    }

    /// Bound address; useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn conn(&self, id: ConnId) -> Option<Arc<Conn>> {
        self.shared.registry.get(id)
    }

    pub fn conn_by_addr(&self, addr: &str) -> Option<Arc<Conn>> {
        self.shared.registry.get_by_addr(addr)
    }

    /// Live connections.
    pub fn conn_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    /// `None` when no idle timeout is configured.
    pub fn timeout_stats(&self) -> Option<SupervisorStats> {
        self.shared.supervisor.as_ref().map(TimeoutSupervisor::stats)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Handler for Nop {
        fn on_message(&self, _conn: &Arc<Conn>, _payload: &[u8]) {}
    }

    fn local() -> ServerConfig {
        ServerConfig::new().listen_addr("127.0.0.1:0")
    }

    #[test]
    fn test_build_binds_ephemeral_port() {
        let server = Server::builder(Nop).config(local()).build().unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.conn_count(), 0);
        assert!(!server.is_running());
        assert!(server.timeout_stats().is_none());
    }

    #[test]
    fn test_build_rejects_bad_address() {
        let result = Server::builder(Nop)
            .config(local().listen_addr("not-an-address"))
            .build();
        assert!(matches!(result, Err(Error::Bind { .. })));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = Server::builder(Nop).config(local().max_events(0)).build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_run_twice_fails() {
        let server = Server::builder(Nop).config(local()).build().unwrap();
        server.run().unwrap();
        assert!(server.is_running());
        assert!(matches!(server.run(), Err(Error::AlreadyRunning)));
        server.stop();
        assert!(!server.is_running());
        assert!(matches!(server.run(), Err(Error::Stopped)));
    }

    #[test]
    fn test_stop_without_run() {
        let server = Server::builder(Nop).config(local()).build().unwrap();
        server.stop();
        server.join();
        assert!(matches!(server.run(), Err(Error::Stopped)));
    }

    #[test]
    fn test_conn_ids_are_monotonic() {
        let server = Server::builder(Nop).config(local()).build().unwrap();
        let a = server.shared.next_conn_id();
        let b = server.shared.next_conn_id();
        assert!(b > a);
    }
}
