//! Async length-prefixed frame I/O.
//!
//! Thin tokio wrappers over [`skerry_core::frame`]: the length claim is
//! validated against the caller's maximum before the payload is allocated
//! or read.

use skerry_core::frame::{self, FrameError, LEN_PREFIX};
use skerry_core::MAX_FRAME_LEN;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HandshakeError, SessionError};

/// Failure while reading one frame from a stream.
#[derive(Debug)]
pub(crate) enum ReadFrameError {
    Frame(FrameError),
    Io(std::io::Error),
}

impl From<ReadFrameError> for HandshakeError {
    fn from(err: ReadFrameError) -> Self {
        match err {
            ReadFrameError::Frame(e) => HandshakeError::Frame(e),
            ReadFrameError::Io(e) => HandshakeError::Io(e),
        }
    }
}

impl From<ReadFrameError> for SessionError {
    fn from(err: ReadFrameError) -> Self {
        match err {
            ReadFrameError::Frame(FrameError::Oversize { len, max }) => {
                SessionError::RecordTooLarge { len, max }
            }
            // Truncation cannot occur when reading exact lengths; a short
            // stream surfaces as UnexpectedEof instead.
            ReadFrameError::Frame(FrameError::Truncated(_)) => SessionError::Decryption,
            ReadFrameError::Io(e) => SessionError::Io(e),
        }
    }
}

/// Read one frame, rejecting oversize claims before allocation.
pub(crate) async fn read_frame<R>(io: &mut R, max: usize) -> Result<Vec<u8>, ReadFrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_PREFIX];
    io.read_exact(&mut prefix).await.map_err(ReadFrameError::Io)?;

    let len = frame::claimed_len(prefix);
    frame::check_len(len, max).map_err(ReadFrameError::Frame)?;

    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await.map_err(ReadFrameError::Io)?;
    Ok(payload)
}

/// Write one frame without flushing. Payload sizes are bounded by the
/// callers (handshake messages and record chunks both fit a u16 prefix).
pub(crate) async fn write_frame<W>(io: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = frame::encode(payload, MAX_FRAME_LEN)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    io.write_all(&frame).await
}
