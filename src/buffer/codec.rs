//! buffer/codec.rs
//!
//! Typed encodings used by `MessageBuffer::write` / `MessageBuffer::read`.
//! Fixed-width values are little-endian; strings and byte blobs carry a
//! `u32` little-endian length prefix.

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::{NetError, Result};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const LEN_PREFIX: usize = 4;

// -----------------------------------------------------------------------------
// ----- Traits ----------------------------------------------------------------

pub trait Encode {
    /// Exact number of bytes `encode` appends.
    fn encoded_len(&self) -> usize;

    /// Append the encoding. Callers check capacity with `encoded_len` first.
    fn encode(&self, dst: &mut BytesMut);
}

pub trait Decode: Sized {
    /// Decode from the front of `src`, advancing it past the consumed bytes.
    /// On error `src` may be partially advanced; callers discard it.
    fn decode(src: &mut &[u8]) -> Result<Self>;
}

// -----------------------------------------------------------------------------
// ----- Fixed-width -----------------------------------------------------------

macro_rules! fixed_width {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Encode for $ty {
            #[inline]
            fn encoded_len(&self) -> usize {
                size_of::<$ty>()
            }

            #[inline]
            fn encode(&self, dst: &mut BytesMut) {
                dst.$put(*self);
            }
        }

        impl Decode for $ty {
            #[inline]
            fn decode(src: &mut &[u8]) -> Result<Self> {
                ensure_remaining(*src, size_of::<$ty>())?;
                Ok(src.$get())
            }
        }
    };
}

fixed_width!(u8, put_u8, get_u8);
fixed_width!(i8, put_i8, get_i8);
fixed_width!(u16, put_u16_le, get_u16_le);
fixed_width!(i16, put_i16_le, get_i16_le);
fixed_width!(u32, put_u32_le, get_u32_le);
fixed_width!(i32, put_i32_le, get_i32_le);
fixed_width!(u64, put_u64_le, get_u64_le);
fixed_width!(i64, put_i64_le, get_i64_le);
fixed_width!(f32, put_f32_le, get_f32_le);
fixed_width!(f64, put_f64_le, get_f64_le);

impl Encode for bool {
    #[inline]
    fn encoded_len(&self) -> usize {
        1
    }

    #[inline]
    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(*self));
    }
}

impl Decode for bool {
    #[inline]
    fn decode(src: &mut &[u8]) -> Result<Self> {
        // any non-zero byte reads as true
        Ok(u8::decode(src)? != 0)
    }
}

// -----------------------------------------------------------------------------
// ----- Length-prefixed -------------------------------------------------------

impl Encode for [u8] {
    fn encoded_len(&self) -> usize {
        LEN_PREFIX + self.len()
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.len() as u32);
        dst.extend_from_slice(self);
    }
}

impl Encode for Vec<u8> {
    fn encoded_len(&self) -> usize {
        self.as_slice().encoded_len()
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.as_slice().encode(dst);
    }
}

impl Decode for Vec<u8> {
    fn decode(src: &mut &[u8]) -> Result<Self> {
        let len = u32::decode(src)? as usize;
        ensure_remaining(*src, len)?;

        let unread = *src;
        let (body, rest) = unread.split_at(len);
        *src = rest;

        Ok(body.to_vec())
    }
}

impl Encode for str {
    fn encoded_len(&self) -> usize {
        self.as_bytes().encoded_len()
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.as_bytes().encode(dst);
    }
}

impl Encode for String {
    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.as_str().encode(dst);
    }
}

impl Decode for String {
    fn decode(src: &mut &[u8]) -> Result<Self> {
        let raw = Vec::<u8>::decode(src)?;
        Ok(String::from_utf8(raw)?)
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn ensure_remaining(src: &[u8], needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(NetError::BufferUnderflow {
            needed,
            available: src.len(),
        });
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
