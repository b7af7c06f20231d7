//! Borrow handles for pooled buffers

use super::buffer::ByteBuffer;
use super::pool::PoolInner;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Exclusive loan of one buffer from a [`ByteBufferPool`](super::ByteBufferPool).
///
/// The buffer goes back to the pool on [`release`](Self::release) or when the
/// handle is dropped. Any use of the handle after an explicit release fails with
/// [`Error::Usage`].
pub struct PooledBuffer {
    buffer: Option<ByteBuffer>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub(crate) fn new(buffer: ByteBuffer, pool: Arc<PoolInner>) -> Self {
        Self {
            buffer: Some(buffer),
            pool,
        }
    }

    pub fn buffer(&self) -> Result<&ByteBuffer> {
        self.buffer.as_ref().ok_or_else(released)
    }

    pub fn buffer_mut(&mut self) -> Result<&mut ByteBuffer> {
        self.buffer.as_mut().ok_or_else(released)
    }

    pub fn capacity(&self) -> Result<usize> {
        Ok(self.buffer()?.capacity())
    }

    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }

    /// Give the buffer back to the pool. A second release is a usage error.
    pub fn release(&mut self) -> Result<()> {
        let buffer = self.buffer.take().ok_or_else(released)?;
        self.pool.release(buffer)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            // Pool-issued buffers are always direct so this cannot fail
            let _ = self.pool.release(buffer);
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// A key buffer and a value buffer borrowed together. Each half can be
/// released on its own; whatever is still held is returned on drop.
#[derive(Debug)]
pub struct PooledBufferPair {
    key: PooledBuffer,
    value: PooledBuffer,
}

impl PooledBufferPair {
    pub(crate) fn new(key: PooledBuffer, value: PooledBuffer) -> Self {
        Self { key, value }
    }

    pub fn key_buffer(&self) -> Result<&ByteBuffer> {
        self.key.buffer()
    }

    pub fn key_buffer_mut(&mut self) -> Result<&mut ByteBuffer> {
        self.key.buffer_mut()
    }

    pub fn value_buffer(&self) -> Result<&ByteBuffer> {
        self.value.buffer()
    }

    pub fn value_buffer_mut(&mut self) -> Result<&mut ByteBuffer> {
        self.value.buffer_mut()
    }

    /// Both buffers at once
    pub fn buffers_mut(&mut self) -> Result<(&mut ByteBuffer, &mut ByteBuffer)> {
        Ok((self.key.buffer_mut()?, self.value.buffer_mut()?))
    }

    pub fn release_key(&mut self) -> Result<()> {
        self.key.release()
    }

    pub fn release_value(&mut self) -> Result<()> {
        self.value.release()
    }

    /// Release whichever halves are still held
    pub fn release(&mut self) -> Result<()> {
        if self.key.is_released() && self.value.is_released() {
            return Err(released());
        }
        if !self.key.is_released() {
            self.key.release()?;
        }
        if !self.value.is_released() {
            self.value.release()?;
        }
        Ok(())
    }
}

fn released() -> Error {
    Error::Usage("Pooled buffer has already been released".to_string())
}
