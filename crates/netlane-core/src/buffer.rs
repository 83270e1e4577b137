//! Read buffer management.
//!
//! A `Buffer` is a window `[r, w)` over a backing array leased from a
//! `BufferProvider`. Bytes read from the socket land at `w`; the codec
//! consumes frames from `r`.
//!
//! ```text
//!   0          r                 w                 C
//!   ├──────────┼─────────────────┼─────────────────┤
//!    consumed      unread bytes      free space
//! ```
//!
//! Invariant: `0 <= r <= w <= C`, where `C` is the backing array length.
//!
//! Growth policy on append:
//! 1. enough free space after `w`: write in place
//! 2. otherwise compact (shift `[r, w)` to offset 0)
//! 3. still not enough: lease an array of at least twice the required
//!    size, copy the unread bytes, then release the old array
//!
//! # Implementors of `BufferProvider`
//!
//! - `PooledBuffers` (default): concurrent free-list of arrays of the
//!   initial size. Bounded idle set; extras are dropped.
//! - `HeapBuffers`: fresh allocation per lease, dropped on release.
//!   Used by clients and tests.

use std::io::{self, Read};

/// Counters describing a provider's arrays.
///
/// For a pooling provider, `pooled + in_use == allocated - discarded` holds
/// whenever no lease or release is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Arrays ever allocated by the provider.
    pub allocated: usize,
    /// Arrays idle in the free-list.
    pub pooled: usize,
    /// Arrays currently leased out.
    pub in_use: usize,
    /// Arrays released but dropped instead of being kept.
    pub discarded: usize,
}

/// Leases and reclaims backing arrays for `Buffer`s.
///
/// **Contract:**
/// - `acquire()` returns an array with `len() >= min_size`; its whole
///   length is usable storage.
/// - `release()` takes ownership back. Each leased array is released at
///   most once; ownership makes double release impossible.
/// - Both must be safe to call concurrently from many threads.
pub trait BufferProvider: Send + Sync {
    /// Lease an array of at least `min_size` bytes.
    fn acquire(&self, min_size: usize) -> Vec<u8>;

    /// Return a previously leased array.
    fn release(&self, buf: Vec<u8>);

    /// Size of the arrays handed out for a fresh connection.
    fn default_size(&self) -> usize;

    /// Snapshot of the provider's counters.
    fn stats(&self) -> PoolStats;
}

/// Growable byte container with read/write cursors over a leased array.
pub struct Buffer {
    buf: Vec<u8>,
    r: usize,
    w: usize,
}

impl Buffer {
    /// Wrap a leased array. The whole length of `backing` is storage.
    pub fn new(mut backing: Vec<u8>) -> Self {
        if backing.len() < backing.capacity() {
            backing.resize(backing.capacity(), 0);
        }
        Self { buf: backing, r: 0, w: 0 }
    }

    /// Lease the initial array from `provider` and wrap it.
    pub fn with_provider(provider: &dyn BufferProvider) -> Self {
        Self::new(provider.acquire(provider.default_size()))
    }

    /// Backing array length `C`.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of unread bytes `w - r`.
    #[inline]
    pub fn len(&self) -> usize {
        self.w - self.r
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.r == self.w
    }

    /// Read cursor position.
    #[inline]
    pub fn read_pos(&self) -> usize {
        self.r
    }

    /// Write cursor position.
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.w
    }

    /// All unread bytes.
    #[inline]
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.r..self.w]
    }

    /// First `k` unread bytes, or `None` if fewer are buffered.
    #[inline]
    pub fn peek(&self, k: usize) -> Option<&[u8]> {
        if k > self.len() {
            return None;
        }
        Some(&self.buf[self.r..self.r + k])
    }

    /// Mark `k` unread bytes as consumed. Clamped to the unread length.
    #[inline]
    pub fn advance(&mut self, k: usize) {
        self.r += k.min(self.len());
        if self.r == self.w {
            self.r = 0;
            self.w = 0;
        }
    }

    /// Consume and return every unread byte.
    ///
    /// The returned slice stays valid until the next write to the buffer.
    pub fn read_all(&mut self) -> &[u8] {
        let (start, end) = (self.r, self.w);
        self.r = 0;
        self.w = 0;
        &self.buf[start..end]
    }

    /// Shift the unread bytes to offset 0.
    pub fn compact(&mut self) {
        if self.r == 0 {
            return;
        }
        self.buf.copy_within(self.r..self.w, 0);
        self.w -= self.r;
        self.r = 0;
    }

    /// Ensure at least `additional` free bytes after the write cursor.
    ///
    /// Compacts first; leases a larger array only when compaction is not
    /// enough. The old array goes back to `provider` after the copy.
    pub fn reserve(&mut self, additional: usize, provider: &dyn BufferProvider) {
        if self.capacity() - self.w >= additional {
            return;
        }
        self.compact();
        if self.capacity() - self.w >= additional {
            return;
        }

        let required = self.len() + additional;
        let mut grown = provider.acquire(required.saturating_mul(2));
        if grown.len() < grown.capacity() {
            grown.resize(grown.capacity(), 0);
        }
        let len = self.len();
        grown[..len].copy_from_slice(&self.buf[self.r..self.w]);
        let old = std::mem::replace(&mut self.buf, grown);
        self.r = 0;
        self.w = len;
        provider.release(old);
    }

    /// Append raw bytes, growing as needed.
    pub fn append(&mut self, bytes: &[u8], provider: &dyn BufferProvider) {
        self.reserve(bytes.len(), provider);
        self.buf[self.w..self.w + bytes.len()].copy_from_slice(bytes);
        self.w += bytes.len();
    }

    /// One `read` call from `reader` into the free space.
    ///
    /// Returns the byte count; `Ok(0)` means end of stream. `WouldBlock`
    /// and other errors are passed through untouched.
    pub fn read_from<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        provider: &dyn BufferProvider,
    ) -> io::Result<usize> {
        self.reserve(1, provider);
        let n = reader.read(&mut self.buf[self.w..])?;
        self.w += n;
        Ok(n)
    }

    /// Give up the backing array, typically to release it to its provider.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("r", &self.r)
            .field("w", &self.w)
            .finish()
    }
}
