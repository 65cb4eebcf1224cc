//! Length-prefixed wire framing.
//!
//! Every handshake message and every encrypted record travels as one frame:
//!
//! ```text
//! [length: u16 big-endian][payload: `length` bytes]
//! ```
//!
//! The prefix covers the payload only. Receivers must validate the claimed
//! length against their configured maximum *before* allocating, so a peer
//! cannot force an unbounded allocation with a forged prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::MAX_FRAME_LEN;

/// Width of the frame length prefix.
pub const LEN_PREFIX: usize = 2;

/// Framing errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// Input ended before a whole frame was available.
    #[error("frame truncated: {0} bytes available")]
    Truncated(usize),
    /// The claimed payload length exceeds the configured maximum.
    #[error("frame length {len} exceeds maximum {max}")]
    Oversize { len: usize, max: usize },
}

/// Check a claimed payload length against a configured maximum.
pub fn check_len(len: usize, max: usize) -> Result<(), FrameError> {
    let max = max.min(MAX_FRAME_LEN);
    if len > max {
        return Err(FrameError::Oversize { len, max });
    }
    Ok(())
}

/// Parse a length prefix.
pub fn claimed_len(prefix: [u8; LEN_PREFIX]) -> usize {
    u16::from_be_bytes(prefix) as usize
}

/// Encode one frame: length prefix followed by the payload.
pub fn encode(payload: &[u8], max: usize) -> Result<Bytes, FrameError> {
    check_len(payload.len(), max)?;
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + payload.len());
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Decode one complete frame from `bytes`, advancing past it.
///
/// Returns `Truncated` if the buffer does not yet hold a whole frame.
pub fn decode(bytes: &mut Bytes, max: usize) -> Result<Bytes, FrameError> {
    if bytes.len() < LEN_PREFIX {
        return Err(FrameError::Truncated(bytes.len()));
    }
    let len = claimed_len([bytes[0], bytes[1]]);
    check_len(len, max)?;
    if bytes.len() < LEN_PREFIX + len {
        return Err(FrameError::Truncated(bytes.len()));
    }
    bytes.advance(LEN_PREFIX);
    Ok(bytes.split_to(len))
}
