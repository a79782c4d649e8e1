//! buffer/message_buffer.rs
//!
//! Bounded byte container with a write cursor (the end of the written
//! bytes) and a read cursor. `read <= write <= capacity` always holds.

use bytes::{Bytes, BytesMut};

use super::codec::{Decode, Encode};
use crate::errors::{NetError, Result};

// -----------------------------------------------------------------------------
// ----- MessageBuffer ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MessageBuffer {
    // write cursor == storage.len()
    storage: BytesMut,
    read_pos: usize,
    capacity: usize,
}

// -----------------------------------------------------------------------------
// ----- MessageBuffer: Static -------------------------------------------------

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: BytesMut::with_capacity(capacity),
            read_pos: 0,
            capacity,
        }
    }

    /// Wrap a copy of `bytes`; capacity is exactly `bytes.len()`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            storage: BytesMut::from(bytes),
            read_pos: 0,
            capacity: bytes.len(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- MessageBuffer: Public -------------------------------------------------

impl MessageBuffer {
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.ensure_writable(value.encoded_len())?;
        value.encode(&mut self.storage);
        Ok(())
    }

    /// Decode the next value. A failed read leaves the read cursor untouched.
    pub fn read<T: Decode>(&mut self) -> Result<T> {
        let mut unread = &self.storage[self.read_pos..];
        let before = unread.len();

        let value = T::decode(&mut unread)?;

        self.read_pos += before - unread.len();
        Ok(value)
    }

    /// Append bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable(bytes.len())?;
        self.storage.extend_from_slice(bytes);
        Ok(())
    }

    /// Borrow the next `len` unread bytes and advance past them.
    pub fn read_raw(&mut self, len: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if available < len {
            return Err(NetError::BufferUnderflow {
                needed: len,
                available,
            });
        }

        let start = self.read_pos;
        self.read_pos += len;
        Ok(&self.storage[start..start + len])
    }

    /// Copy of everything written so far. Does not move either cursor.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.storage)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    /// Zero both cursors, keeping the allocation.
    pub fn reset(&mut self) {
        self.storage.clear();
        self.read_pos = 0;
    }

    /// Bytes written (the write cursor).
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Bytes written but not yet read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.read_pos
    }

    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// -----------------------------------------------------------------------------
// ----- MessageBuffer: Crate --------------------------------------------------

impl MessageBuffer {
    /// Replace the contents with `bytes`, used by receive loops.
    pub(crate) fn load(&mut self, bytes: &[u8]) -> Result<()> {
        self.reset();
        self.write_raw(bytes)
    }
}

// -----------------------------------------------------------------------------
// ----- MessageBuffer: Private ------------------------------------------------

impl MessageBuffer {
    #[inline]
    fn ensure_writable(&self, needed: usize) -> Result<()> {
        let available = self.capacity - self.storage.len();
        if needed > available {
            return Err(NetError::BufferOverflow {
                needed,
                available,
                capacity: self.capacity,
            });
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
