//! Fixed capacity byte buffer with a position/limit cursor

use bytes::buf::UninitSlice;
use bytes::{Buf, BufMut};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A fixed capacity byte buffer.
///
/// Writes advance `position` up to `limit`; `flip` turns a written buffer into a
/// readable one. Buffers handed out by [`ByteBufferPool`](super::ByteBufferPool)
/// are direct (allocated by the pool, never resized). Buffers built with
/// [`ByteBuffer::wrap`] are heap buffers and the pool refuses to take them.
pub struct ByteBuffer {
    id: u64,
    data: Box<[u8]>,
    position: usize,
    limit: usize,
    /// Exclusive upper bound of bytes that may have been written
    dirty: usize,
    direct: bool,
}

impl ByteBuffer {
    /// Allocate a zeroed direct buffer
    pub fn allocate_direct(capacity: usize) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: capacity,
            dirty: 0,
            direct: true,
        }
    }

    /// Wrap existing bytes as a heap buffer, positioned at the start
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let capacity = bytes.len();
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data: bytes.into_boxed_slice(),
            position: 0,
            limit: capacity,
            dirty: capacity,
            direct: false,
        }
    }

    /// Process-unique allocation id; unchanged while the pool recycles the buffer
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_position(&mut self, position: usize) {
        assert!(position <= self.limit, "position {} > limit {}", position, self.limit);
        self.position = position;
    }

    pub fn set_limit(&mut self, limit: usize) {
        assert!(limit <= self.capacity(), "limit {} > capacity {}", limit, self.capacity());
        self.limit = limit;
        self.position = self.position.min(limit);
    }

    /// Reset the cursor to cover the whole buffer. Contents are untouched.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
    }

    /// Make the bytes written so far readable from the start
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Read the same bytes again
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Bytes between position and limit
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Raw mutable access to the whole backing store
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.dirty = self.capacity();
        &mut self.data
    }

    /// Overwrite every byte that may have been written with zero and reset the cursor
    pub fn zero(&mut self) {
        self.data[..self.dirty].fill(0);
        self.dirty = 0;
        self.clear();
    }

    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }
}

impl Buf for ByteBuffer {
    fn remaining(&self) -> usize {
        self.limit - self.position
    }

    fn chunk(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.remaining(),
            "cannot advance past limit: {} > {}",
            cnt,
            self.remaining()
        );
        self.position += cnt;
    }
}

// SAFETY: `chunk_mut` only exposes initialised bytes between position and limit,
// and `advance_mut` never moves position past limit.
unsafe impl BufMut for ByteBuffer {
    fn remaining_mut(&self) -> usize {
        self.limit - self.position
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        assert!(
            cnt <= self.remaining_mut(),
            "cannot advance past limit: {} > {}",
            cnt,
            self.remaining_mut()
        );
        self.position += cnt;
        self.dirty = self.dirty.max(self.position);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        let (start, end) = (self.position, self.limit);
        UninitSlice::new(&mut self.data[start..end])
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("direct", &self.direct)
            .finish()
    }
}
