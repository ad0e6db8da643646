//! Frame buffers lent to the SDK capture queue.
//!
//! A [`FrameBuffer`] is owned either by the caller or by the backend. It
//! moves into the backend on enqueue and comes back with a fetched frame;
//! the consumer has to enqueue it again before the SDK can refill it.

use crate::backend::{CameraBackend, DeviceHandle};
use crate::error::{Result, TyError};

/// Default number of buffers kept in flight (double buffering).
pub const DEFAULT_BUFFER_COUNT: usize = 2;

/// Fixed-capacity heap slot with a stable address.
///
/// Backed by `u64` words so that 16-bit depth and `f32` point data at
/// aligned offsets can be viewed without copying.
#[derive(Debug)]
pub struct FrameBuffer {
    words: Box<[u64]>,
    len: usize,
    slot: usize,
}

impl FrameBuffer {
    pub fn new(slot: usize, len: usize) -> Self {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        Self { words, len, slot }
    }

    /// Index of this buffer in the pool that allocated it.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut(&mut self.words)[..len]
    }

    /// Start address handed to the SDK; it does not change while the
    /// buffer is alive, even when the `FrameBuffer` value moves.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr() as *mut u8
    }

    pub fn addr(&self) -> usize {
        self.words.as_ptr() as usize
    }
}

/// Freshly allocated set of buffers waiting to be enqueued.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    buffers: Vec<FrameBuffer>,
}

impl BufferPool {
    pub fn allocate(buffer_size: usize, count: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(TyError::InvalidConfiguration(
                "frame buffer size must be greater than zero".into(),
            ));
        }
        if count == 0 {
            return Err(TyError::InvalidConfiguration(
                "at least one frame buffer is required".into(),
            ));
        }
        let buffers = (0..count)
            .map(|slot| FrameBuffer::new(slot, buffer_size))
            .collect();
        Ok(Self {
            buffer_size,
            buffers,
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn into_buffers(self) -> Vec<FrameBuffer> {
        self.buffers
    }

    /// Hand every buffer to the backend's capture queue.
    pub fn enqueue_all(self, backend: &mut dyn CameraBackend, handle: DeviceHandle) -> Result<()> {
        for buffer in self.buffers {
            backend.enqueue_buffer(handle, buffer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_its_address_when_moved() {
        let mut buf = FrameBuffer::new(0, 13);
        let addr = buf.as_mut_ptr() as usize;
        let moved = vec![buf];
        assert_eq!(moved[0].addr(), addr);
        assert_eq!(moved[0].len(), 13);
        assert_eq!(moved[0].as_slice().len(), 13);
        assert_eq!(addr % 8, 0);
    }

    #[test]
    fn pool_defaults_to_two_slots() {
        let pool = BufferPool::allocate(640 * 480 * 2, DEFAULT_BUFFER_COUNT).unwrap();
        let buffers = pool.into_buffers();
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[1].slot(), 1);
    }

    #[test]
    fn pool_rejects_empty_configurations() {
        assert!(BufferPool::allocate(0, 2).is_err());
        assert!(BufferPool::allocate(16, 0).is_err());
    }
}
