use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::MessageBuffer;
use crate::errors::{NetError, Result};

// -----------------------------------------------------------------------------
// ----- BufferPool ------------------------------------------------------------

/// Fixed set of pre-allocated buffers shared by every connection of one
/// listener. Return order is unspecified.
#[derive(Debug)]
pub struct BufferPool {
    slots: Mutex<Vec<MessageBuffer>>,
    capacity: usize,
    buffer_size: usize,
}

// -----------------------------------------------------------------------------
// ----- BufferPool: Static ----------------------------------------------------

impl BufferPool {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| MessageBuffer::new(buffer_size))
            .collect();

        Self {
            slots: Mutex::new(slots),
            capacity,
            buffer_size,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- BufferPool: Public ----------------------------------------------------

impl BufferPool {
    /// Take one buffer. The caller owns it until `push`.
    pub fn pop(&self) -> Result<MessageBuffer> {
        self.slots.lock().pop().ok_or(NetError::PoolExhausted {
            capacity: self.capacity,
        })
    }

    /// Give a previously popped buffer back. Pushing more buffers than were
    /// popped is a caller bug.
    pub fn push(&self, mut buffer: MessageBuffer) {
        buffer.reset();

        let mut slots = self.slots.lock();
        if slots.len() >= self.capacity {
            debug_assert!(false, "buffer pool overfilled (capacity {})", self.capacity);
            warn!("buffer pool overfilled; dropping returned buffer");
            return;
        }

        slots.push(buffer);
    }

    /// Pop a buffer wrapped in a guard that pushes it back on drop. When the
    /// pool is empty a one-off buffer is allocated instead and freed on drop.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        match self.pop() {
            Ok(buffer) => PooledBuffer {
                buffer: Some(buffer),
                pool: Some(self.clone()),
            },
            Err(_) => {
                trace!("buffer pool exhausted; allocating fallback buffer");
                PooledBuffer {
                    buffer: Some(MessageBuffer::new(self.buffer_size)),
                    pool: None,
                }
            }
        }
    }

    pub fn available(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

// -----------------------------------------------------------------------------
// ----- PooledBuffer ----------------------------------------------------------

/// A buffer on loan to the holder. Dropping it hands the buffer back.
pub struct PooledBuffer {
    buffer: Option<MessageBuffer>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuffer {
    /// False for fallback buffers allocated while the pool was empty.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = MessageBuffer;

    fn deref(&self) -> &MessageBuffer {
        self.buffer
            .as_ref()
            .expect("pooled buffer accessed after release")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut MessageBuffer {
        self.buffer
            .as_mut()
            .expect("pooled buffer accessed after release")
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("buffer", &self.buffer)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        let Some(pool) = self.pool.take() else {
            return;
        };

        pool.push(buffer);
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
