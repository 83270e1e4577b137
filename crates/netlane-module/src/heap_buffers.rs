//! `HeapBuffers` — non-pooling `BufferProvider` implementation.
//!
//! Each lease is a fresh `Vec<u8>`; release lets it drop.
//! Simple and correct. Suited to clients and one-off decoding.

use netlane_core::buffer::{BufferProvider, PoolStats};

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct HeapBuffers {
    /// Default buffer size for allocations.
    default_size: usize,
    /// Number of buffers currently in use (for diagnostics).
    in_use: AtomicUsize,
    /// Total allocated (for diagnostics).
    total: AtomicUsize,
}

impl HeapBuffers {
    pub fn new(default_size: usize) -> Self {
        Self {
            default_size: default_size.max(1),
            in_use: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }
}

impl Default for HeapBuffers {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl BufferProvider for HeapBuffers {
    fn acquire(&self, min_size: usize) -> Vec<u8> {
        self.in_use.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        vec![0u8; min_size.max(self.default_size)]
    }

    fn release(&self, buf: Vec<u8>) {
        drop(buf);
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    fn default_size(&self) -> usize {
        self.default_size
    }

    fn stats(&self) -> PoolStats {
        let allocated = self.total.load(Ordering::Relaxed);
        let in_use = self.in_use.load(Ordering::Relaxed);
        PoolStats {
            allocated,
            pooled: 0,
            in_use,
            discarded: allocated - in_use,
        }
    }
}
