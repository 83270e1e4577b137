//! Server configuration
//!
//! Provides library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder setters (programmatic)
//! 2. Environment variables (`from_env()`)
//! 3. Library defaults (`config::defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use netlane::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::from_env()
//!     .listen_addr("127.0.0.1:9000")
//!     .acceptors(2)
//!     .idle_timeout(Duration::from_secs(5));
//! ```

pub mod defaults;

use std::time::Duration;

use netlane_core::env::{env_get, env_get_str};

use crate::error::{Error, Result};

/// Server configuration with builder pattern.
///
/// Decoder, encoder and handler are not part of it; they are passed to
/// `ServerBuilder`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, `host:port`.
    pub listen_addr: String,
    /// Parallel loops blocked in `accept()` on the shared listener.
    pub acceptors: usize,
    /// Reactor loops polling the shared epoll instance.
    pub reactors: usize,
    /// Initial per-connection buffer size in bytes.
    pub read_buffer_len: usize,
    /// Close connections with no read activity for this long. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on idle timeout detection latency.
    pub timeout_tick: Duration,
    /// Events fetched per poll call.
    pub max_events: usize,
    /// Idle buffers retained by the pool.
    pub pool_max_idle: usize,
    /// Reactor poll timeout; bounds how long a reactor takes to see `stop()`
    /// if the wakeup is lost.
    pub poll_timeout: Duration,
    /// Slice `write_all` waits for writability before rechecking the
    /// connection state.
    pub write_wait: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            listen_addr: defaults::LISTEN_ADDR.to_string(),
            acceptors: defaults::ACCEPTORS,
            reactors: defaults::REACTORS,
            read_buffer_len: defaults::READ_BUFFER_LEN,
            idle_timeout: idle_from_ms(defaults::IDLE_TIMEOUT_MS),
            timeout_tick: Duration::from_millis(defaults::TIMEOUT_TICK_MS),
            max_events: defaults::MAX_EVENTS,
            pool_max_idle: defaults::POOL_MAX_IDLE,
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            write_wait: Duration::from_millis(defaults::WRITE_WAIT_MS),
        }
    }

    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `NETLANE_LISTEN_ADDR` - Bind address
    /// - `NETLANE_ACCEPTORS` - Acceptor loops (at least 1)
    /// - `NETLANE_REACTORS` - Reactor loops (at least 1)
    /// - `NETLANE_READ_BUFFER_LEN` - Initial buffer size in bytes
    /// - `NETLANE_IDLE_TIMEOUT_MS` - Idle timeout; `<= 0` disables
    /// - `NETLANE_TIMEOUT_TICK_MS` - Timeout detection latency bound
    /// - `NETLANE_MAX_EVENTS` - Events per poll
    /// - `NETLANE_POOL_MAX_IDLE` - Idle buffers kept by the pool
    /// - `NETLANE_POLL_TIMEOUT_MS` - Reactor poll timeout
    /// - `NETLANE_WRITE_WAIT_MS` - `write_all` writability wait slice
    pub fn from_env() -> Self {
        Self {
            listen_addr: env_get_str("NETLANE_LISTEN_ADDR", defaults::LISTEN_ADDR),
            acceptors: env_get("NETLANE_ACCEPTORS", defaults::ACCEPTORS).max(1),
            reactors: env_get("NETLANE_REACTORS", defaults::REACTORS).max(1),
            read_buffer_len: env_get("NETLANE_READ_BUFFER_LEN", defaults::READ_BUFFER_LEN),
            idle_timeout: idle_from_ms(env_get(
                "NETLANE_IDLE_TIMEOUT_MS",
                defaults::IDLE_TIMEOUT_MS,
            )),
            timeout_tick: Duration::from_millis(env_get(
                "NETLANE_TIMEOUT_TICK_MS",
                defaults::TIMEOUT_TICK_MS,
            )),
            max_events: env_get("NETLANE_MAX_EVENTS", defaults::MAX_EVENTS),
            pool_max_idle: env_get("NETLANE_POOL_MAX_IDLE", defaults::POOL_MAX_IDLE),
            poll_timeout: Duration::from_millis(env_get(
                "NETLANE_POLL_TIMEOUT_MS",
                defaults::POLL_TIMEOUT_MS,
            )),
            write_wait: Duration::from_millis(env_get(
                "NETLANE_WRITE_WAIT_MS",
                defaults::WRITE_WAIT_MS,
            )),
        }
    }

    // Builder methods

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn acceptors(mut self, n: usize) -> Self {
        self.acceptors = n.max(1);
        self
    }

    pub fn reactors(mut self, n: usize) -> Self {
        self.reactors = n.max(1);
        self
    }

    pub fn read_buffer_len(mut self, len: usize) -> Self {
        self.read_buffer_len = len;
        self
    }

    /// Zero disables the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn timeout_tick(mut self, tick: Duration) -> Self {
        self.timeout_tick = tick;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn pool_max_idle(mut self, n: usize) -> Self {
        self.pool_max_idle = n;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = wait;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::InvalidConfig("listen_addr is empty".into()));
        }
        if self.acceptors == 0 || self.reactors == 0 {
            return Err(Error::InvalidConfig(
                "acceptors and reactors must be at least 1".into(),
            ));
        }
        if self.read_buffer_len == 0 {
            return Err(Error::InvalidConfig("read_buffer_len must be positive".into()));
        }
        if self.max_events == 0 {
            return Err(Error::InvalidConfig("max_events must be positive".into()));
        }
        if self.timeout_tick.is_zero() {
            return Err(Error::InvalidConfig("timeout_tick must be positive".into()));
        }
        Ok(())
    }
}

/// `<= 0` disables the timeout.
fn idle_from_ms(ms: i64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}
