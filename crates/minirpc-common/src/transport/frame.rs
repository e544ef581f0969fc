//! Length-prefixed frame reading and writing.
//!
//! A frame is one complete encoded message. Its first eight bytes are the
//! header and body lengths, which is all the reader needs to know where the
//! frame ends; the rest of the preamble is left to the message codec.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{MinirpcError, Result};
use crate::protocol::PREAMBLE_LEN;

/// Number of leading bytes holding the two length fields.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Maximum frame size (100 MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Reads one complete frame from `reader`.
///
/// Returns the whole frame, length prefix included, ready for
/// [`Request::decode`](crate::protocol::Request::decode) or
/// [`Response::decode`](crate::protocol::Response::decode).
///
/// `read_exact` keeps reading until the buffer is full, so frames that arrive
/// in many small segments are reassembled rather than truncated.
///
/// # Errors
///
/// - `ConnectionClosed` if the stream ends before a frame starts
/// - `Transport` if the stream fails or ends mid-frame
/// - `MalformedMessage` if the lengths are below the preamble size or above
///   [`MAX_FRAME_SIZE`]
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut prefix).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => MinirpcError::ConnectionClosed,
        _ => map_io_error(e, "reading length prefix"),
    })?;

    let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let body_len = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
    if header_len < PREAMBLE_LEN {
        return Err(MinirpcError::MalformedMessage(format!(
            "header length {} is shorter than the preamble",
            header_len
        )));
    }

    // Validate length to prevent allocation of excessively large buffers
    let total = match header_len.checked_add(body_len) {
        Some(total) if total <= MAX_FRAME_SIZE => total,
        _ => {
            return Err(MinirpcError::MalformedMessage(format!(
                "Frame too large: {} + {} bytes (max {} bytes)",
                header_len, body_len, MAX_FRAME_SIZE
            )))
        }
    };

    let mut frame = vec![0u8; total];
    frame[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
    reader
        .read_exact(&mut frame[LENGTH_PREFIX_LEN..])
        .await
        .map_err(|e| map_io_error(e, "reading frame body"))?;

    Ok(frame)
}

/// Writes one complete frame to `writer` and flushes it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer
        .write_all(frame)
        .await
        .map_err(|e| map_io_error(e, "writing frame"))?;

    // Flush to ensure data is sent
    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Map IO errors to transport errors, keeping the operation in the message.
fn map_io_error(err: std::io::Error, context: &str) -> MinirpcError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            MinirpcError::Transport(format!("{}: connection closed mid-frame", context))
        }
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => {
            MinirpcError::Transport(format!("{}: connection lost", context))
        }
        _ => MinirpcError::Transport(format!("{}: {}", context, err)),
    }
}
