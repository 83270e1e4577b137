//! `PooledBuffers` — default `BufferProvider` implementation.
//!
//! A lock-free free-list of arrays of the initial size. Connections lease an
//! array on accept and return it on close; under churn the same arrays cycle
//! instead of being reallocated.
//!
//! Only arrays of exactly the initial size are kept. Grown arrays and
//! arrays arriving while the idle set is full are dropped and counted as
//! discarded, so idle memory stays bounded by `max_idle * size`.
//!
//! There is a single size class. When a connection outgrows its first
//! array, that array goes back to the free-list at once, but the larger one
//! is freed on close. Workloads whose frames routinely exceed the initial
//! size therefore allocate a fresh large array per connection; raise
//! `read_buffer_len` to cover the common frame size instead.

use netlane_core::buffer::{BufferProvider, PoolStats};

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct PooledBuffers {
    /// Initial array size.
    size: usize,
    /// Idle arrays, all of length `size`.
    idle: ArrayQueue<Vec<u8>>,
    allocated: AtomicUsize,
    in_use: AtomicUsize,
    discarded: AtomicUsize,
}

impl PooledBuffers {
    /// Create a pool of `size`-byte arrays keeping at most `max_idle` idle.
    pub fn new(size: usize, max_idle: usize) -> Self {
        Self {
            size: size.max(1),
            idle: ArrayQueue::new(max_idle.max(1)),
            allocated: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        }
    }

    fn allocate(&self, len: usize) -> Vec<u8> {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        vec![0u8; len]
    }
}

impl BufferProvider for PooledBuffers {
    fn acquire(&self, min_size: usize) -> Vec<u8> {
        let buf = if min_size <= self.size {
            match self.idle.pop() {
                Some(buf) => buf,
                None => self.allocate(self.size),
            }
        } else {
            self.allocate(min_size)
        };
        self.in_use.fetch_add(1, Ordering::Relaxed);
        buf
    }

    fn release(&self, buf: Vec<u8>) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        if buf.len() != self.size || self.idle.push(buf).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn default_size(&self) -> usize {
        self.size
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            pooled: self.idle.len(),
            in_use: self.in_use.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlane_core::Buffer;

    fn conserved(s: PoolStats) -> bool {
        s.pooled + s.in_use == s.allocated - s.discarded
    }

    #[test]
    fn test_reuse_after_release() {
        let pool = PooledBuffers::new(64, 8);
        let a = pool.acquire(64);
        let addr = a.as_ptr();
        pool.release(a);

        let b = pool.acquire(10);
        assert_eq!(b.as_ptr(), addr);
        assert_eq!(b.len(), 64);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn test_no_two_leases_share_an_array() {
        let pool = PooledBuffers::new(32, 8);
        let a = pool.acquire(32);
        let b = pool.acquire(32);
        assert_ne!(a.as_ptr(), b.as_ptr());
        pool.release(a);
        pool.release(b);
    }

    #[test]
    fn test_oversized_request_bypasses_pool() {
        let pool = PooledBuffers::new(16, 8);
        let big = pool.acquire(100);
        assert_eq!(big.len(), 100);
        pool.release(big);
        let s = pool.stats();
        assert_eq!(s.pooled, 0);
        assert_eq!(s.discarded, 1);
        assert!(conserved(s));
    }

    #[test]
    fn test_idle_set_is_bounded() {
        let pool = PooledBuffers::new(8, 2);
        let leased: Vec<_> = (0..5).map(|_| pool.acquire(8)).collect();
        for buf in leased {
            pool.release(buf);
        }
        let s = pool.stats();
        assert_eq!(s.pooled, 2);
        assert_eq!(s.discarded, 3);
        assert_eq!(s.in_use, 0);
        assert!(conserved(s));
    }

    #[test]
    fn test_conservation_through_buffer_growth() {
        let pool = PooledBuffers::new(4, 16);
        let mut open = Vec::new();
        for round in 0..20 {
            let mut b = Buffer::with_provider(&pool);
            if round % 3 == 0 {
                // forces a grow: the initial array returns to the pool
                b.append(&[7u8; 9], &pool);
            }
            open.push(b);
            if round % 2 == 1 {
                let closed = open.remove(0);
                pool.release(closed.into_inner());
            }
            let s = pool.stats();
            assert_eq!(s.in_use, open.len());
            assert!(conserved(s), "round {round}: {s:?}");
        }
        for b in open.drain(..) {
            pool.release(b.into_inner());
        }
        let s = pool.stats();
        assert_eq!(s.in_use, 0);
        assert!(conserved(s));
    }

    #[test]
    fn test_grown_array_is_discarded_initial_one_reused() {
        let pool = PooledBuffers::new(8, 4);
        let mut b = Buffer::with_provider(&pool);
        let first = b.capacity();
        b.append(&[1u8; 20], &pool);
        assert!(b.capacity() > first);

        // the outgrown array went straight back
        let s = pool.stats();
        assert_eq!((s.allocated, s.pooled, s.in_use), (2, 1, 1));

        pool.release(b.into_inner());
        let s = pool.stats();
        assert_eq!((s.pooled, s.discarded, s.in_use), (1, 1, 0));

        // the next connection gets the recycled initial array
        let next = pool.acquire(pool.default_size());
        assert_eq!(next.len(), 8);
        assert_eq!(pool.stats().allocated, 2);
        pool.release(next);
        assert!(conserved(pool.stats()));
    }

    #[test]
    fn test_concurrent_lease_release() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(PooledBuffers::new(128, 64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let buf = pool.acquire(128);
                        pool.release(buf);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let s = pool.stats();
        assert_eq!(s.in_use, 0);
        assert!(conserved(s));
        assert!(s.allocated <= 8 + s.discarded);
    }
}
