//! Idle timeout supervisor
//!
//! Single thread that closes connections with no read activity for longer
//! than the configured timeout.
//!
//! # Design
//!
//! One deadline per connection sits in a min-heap. Reads never touch the
//! heap; they only bump the connection's `last_read`. When an entry comes
//! due the thread re-checks `last_read`:
//! - still idle: close with `ReadTimeout`
//! - active since: push a new entry at `last_read + timeout`
//! - gone from the registry: drop the entry
//!
//! The thread sleeps until the next deadline, capped at `timeout_tick`, so
//! a timeout is observed at most one tick late.
//!
//! Closing a connection leaves its entry behind. The close routine bumps a
//! dead counter instead, and once dead entries outnumber the rest the
//! thread rebuilds the heap from the live ones. The heap therefore stays
//! within about twice the open connection count under churn, whatever the
//! timeout.
//!
//! # Complexity
//!
//! - Watch: O(log n)
//! - Pop due: O(k log n) for k due entries
//! - Compact: O(n), amortized over the n/2 closes that trigger it

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use netlane_core::error::CloseReason;

use crate::conn::ConnId;
use crate::server::Shared;

/// Heap entry, ordered earliest deadline first.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at_ms: u64,
    conn: ConnId,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at_ms == other.at_ms && self.conn == other.conn
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // reversed: BinaryHeap is a max-heap
        match other.at_ms.cmp(&self.at_ms) {
            CmpOrdering::Equal => other.conn.cmp(&self.conn),
            ord => ord,
        }
    }
}

/// Counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub watched: usize,
    pub expired: u64,
    pub extended: u64,
}

pub(crate) struct TimeoutSupervisor {
    timeout_ms: u64,
    tick: Duration,
    heap: Mutex<BinaryHeap<Deadline>>,
    /// Closes since the last compaction; an upper bound on dead entries.
    dead: AtomicUsize,
    expired: AtomicU64,
    extended: AtomicU64,
}

impl TimeoutSupervisor {
    pub(crate) fn new(timeout: Duration, tick: Duration) -> Self {
        Self {
            timeout_ms: (timeout.as_millis() as u64).max(1),
            tick,
            heap: Mutex::new(BinaryHeap::new()),
            dead: AtomicUsize::new(0),
            expired: AtomicU64::new(0),
            extended: AtomicU64::new(0),
        }
    }

    /// Start tracking a connection whose last read was at `last_read_ms`.
    pub(crate) fn watch(&self, conn: ConnId, last_read_ms: u64) {
        self.push(conn, last_read_ms.saturating_add(self.timeout_ms));
    }

    /// Note that a watched connection has closed.
    #[inline]
    pub(crate) fn forget(&self) {
        self.dead.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop the entries of closed connections once they are at least half
    /// the heap. Returns how many were dropped.
    fn compact(&self, is_live: impl Fn(ConnId) -> bool) -> usize {
        let dead = self.dead.load(Ordering::Relaxed);
        let mut heap = self.heap.lock();
        if dead == 0 || dead * 2 < heap.len() {
            return 0;
        }
        self.dead.fetch_sub(dead, Ordering::Relaxed);
        let before = heap.len();
        heap.retain(|d| is_live(d.conn));
        before - heap.len()
    }

    fn push(&self, conn: ConnId, at_ms: u64) {
        self.heap.lock().push(Deadline { at_ms, conn });
    }

    /// Remove and return every entry due at `now_ms`.
    fn pop_due(&self, now_ms: u64) -> Vec<ConnId> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while let Some(top) = heap.peek() {
            if top.at_ms > now_ms {
                break;
            }
            if let Some(entry) = heap.pop() {
                due.push(entry.conn);
            }
        }
        due
    }

    fn next_deadline(&self) -> Option<u64> {
        self.heap.lock().peek().map(|d| d.at_ms)
    }

    /// How long to park when it is `now_ms`.
    fn sleep_for(&self, now_ms: u64) -> Duration {
        match self.next_deadline() {
            Some(at) => Duration::from_millis(at.saturating_sub(now_ms)).min(self.tick),
            None => self.tick,
        }
    }

    pub(crate) fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            watched: self.heap.lock().len(),
            expired: self.expired.load(Ordering::Relaxed),
            extended: self.extended.load(Ordering::Relaxed),
        }
    }
}

/// Thread body. Exits once the server is stopping; `stop()` unparks it.
pub(crate) fn supervisor_loop(server: Arc<Shared>) {
    let Some(supervisor) = server.supervisor.as_ref() else {
        return;
    };
    debug!(
        timeout_ms = supervisor.timeout_ms,
        tick = ?supervisor.tick,
        "timeout supervisor started"
    );

    while !server.is_stopping() {
        let dropped = supervisor.compact(|id| server.registry.get(id).is_some());
        if dropped > 0 {
            trace!(dropped, "compacted deadlines");
        }

        let now = server.now_ms();
        for id in supervisor.pop_due(now) {
            let Some(conn) = server.registry.get(id) else {
                continue;
            };
            let deadline = conn.last_read_ms().saturating_add(supervisor.timeout_ms);
            if deadline <= now {
                supervisor.expired.fetch_add(1, Ordering::Relaxed);
                debug!(conn = %id, idle = ?conn.idle_for(), "idle timeout");
                conn.close_with(CloseReason::ReadTimeout);
            } else if !conn.is_closed() {
                supervisor.extended.fetch_add(1, Ordering::Relaxed);
                trace!(conn = %id, deadline, "deadline extended");
                supervisor.push(id, deadline);
            }
        }

        let sleep = supervisor.sleep_for(server.now_ms());
        if !sleep.is_zero() {
            thread::park_timeout(sleep);
        }
    }

    debug!(stats = ?supervisor.stats(), "timeout supervisor stopped");
}
