//! Library defaults for `ServerConfig`.

pub const LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const ACCEPTORS: usize = 1;
pub const REACTORS: usize = 1;
pub const READ_BUFFER_LEN: usize = 1024;
/// 0 = idle timeout disabled.
pub const IDLE_TIMEOUT_MS: i64 = 0;
pub const TIMEOUT_TICK_MS: u64 = 100;
pub const MAX_EVENTS: usize = 256;
pub const POOL_MAX_IDLE: usize = 4096;
pub const POLL_TIMEOUT_MS: u64 = 1000;
pub const WRITE_WAIT_MS: u64 = 1000;
