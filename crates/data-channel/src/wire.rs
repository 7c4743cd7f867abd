//! Framing of structured messages on a control connection.
//!
//! # Wire format
//!
//! ```text
//! MESSAGE: [n bytes: UTF-8 JSON object][1 byte: 0x00]
//! ```
//!
//! `n` is at most [`MAX_MESSAGE_SIZE`]. The JSON encoder never emits a raw
//! NUL byte, so the terminator is unambiguous.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sendfile_protocol::constants::{MAX_MESSAGE_SIZE, MESSAGE_TERMINATOR};

use crate::error::ChannelError;

/// Writes one message followed by the terminator and flushes.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ChannelError::MessageTooLarge(MAX_MESSAGE_SIZE));
    }
    buf.push(MESSAGE_TERMINATOR);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one message up to its terminator.
///
/// Returns `None` if the stream ends cleanly before the first byte of a
/// message. Bytes after the terminator stay in the reader's buffer.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, ChannelError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let mut limited = (&mut *reader).take(MAX_MESSAGE_SIZE as u64 + 1);
    let n = limited.read_until(MESSAGE_TERMINATOR, &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&MESSAGE_TERMINATOR) {
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(ChannelError::MessageTooLarge(MAX_MESSAGE_SIZE));
        }
        return Err(ChannelError::ConnectionClosed);
    }
    buf.pop();

    Ok(Some(serde_json::from_slice(&buf)?))
}
