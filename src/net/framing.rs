//! net/framing.rs
//!
//! Optional length-prefixed framing for stream transports:
//! `[u32 big-endian payload length][payload]`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{NetError, Result};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const LEN_PREFIX: usize = 4;

// -----------------------------------------------------------------------------
// ----- Encode ----------------------------------------------------------------

pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.freeze()
}

// -----------------------------------------------------------------------------
// ----- Decode ----------------------------------------------------------------

/// Look at the front of `buf`; returns the payload length once the whole
/// frame is present.
pub fn peek_frame(buf: &[u8], limit: usize) -> Result<Option<usize>> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > limit {
        return Err(NetError::MessageTooLarge { len, limit });
    }

    if buf.len() < LEN_PREFIX + len {
        return Ok(None);
    }

    Ok(Some(len))
}

/// Split the next complete frame's payload off the front of `inbox`.
pub fn split_frame(inbox: &mut BytesMut, limit: usize) -> Result<Option<BytesMut>> {
    let Some(len) = peek_frame(&inbox[..], limit)? else {
        return Ok(None);
    };

    let mut frame = inbox.split_to(LEN_PREFIX + len);
    Ok(Some(frame.split_off(LEN_PREFIX)))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
