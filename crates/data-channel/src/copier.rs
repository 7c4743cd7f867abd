//! Bounded-length chunked copy across an upgraded connection.
//!
//! Receiver: reads exactly `length` bytes from the channel into a sink in
//! chunks of at most [`CHUNK_SIZE`], flushes the sink, and only then is the
//! caller allowed to [`write_ack`]. Any error, or the channel ending before
//! `length` bytes arrived, fails the transfer; cleaning up the sink is the
//! caller's job since only it knows where the bytes went.
//!
//! Sender: reads the local source in chunks, writes them to the channel and
//! waits for exactly one acknowledgement byte with [`read_ack`].

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use sendfile_protocol::constants::{ACK_BYTE, CHUNK_SIZE};

use crate::error::ChannelError;

/// Copies exactly `length` bytes from `channel` into `sink`.
///
/// Returns the number of bytes written, which always equals `length`.
pub async fn receive<R, W>(channel: &mut R, sink: &mut W, length: u64) -> Result<u64, ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_len(length)];
    let mut remaining = length;

    while remaining > 0 {
        let to_read = chunk_len(remaining);
        let n = channel.read(&mut buf[..to_read]).await.map_err(|e| {
            ChannelError::TransferFailed(format!(
                "read failed with {remaining} of {length} bytes outstanding: {e}"
            ))
        })?;
        if n == 0 {
            return Err(ChannelError::TransferFailed(format!(
                "channel closed with {remaining} of {length} bytes outstanding"
            )));
        }

        sink.write_all(&buf[..n]).await.map_err(|e| {
            ChannelError::TransferFailed(format!("write to backing store failed: {e}"))
        })?;
        remaining -= n as u64;
    }

    sink.flush()
        .await
        .map_err(|e| ChannelError::TransferFailed(format!("flush of backing store failed: {e}")))?;

    debug!(length, "payload received");
    Ok(length)
}

/// Copies exactly `length` bytes from `source` onto `channel` and flushes.
///
/// A source that ends early fails the transfer: the receiver would
/// otherwise wait for bytes that never come.
pub async fn send<R, W>(source: &mut R, channel: &mut W, length: u64) -> Result<u64, ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_len(length)];
    let mut remaining = length;

    while remaining > 0 {
        let to_read = chunk_len(remaining);
        let n = source.read(&mut buf[..to_read]).await?;
        if n == 0 {
            return Err(ChannelError::TransferFailed(format!(
                "source ended with {remaining} of {length} bytes unsent"
            )));
        }

        channel.write_all(&buf[..n]).await.map_err(|e| {
            ChannelError::TransferFailed(format!("write to channel failed: {e}"))
        })?;
        remaining -= n as u64;
    }

    channel
        .flush()
        .await
        .map_err(|e| ChannelError::TransferFailed(format!("flush of channel failed: {e}")))?;

    debug!(length, "payload sent");
    Ok(length)
}

/// Receiver side: signals that every byte is on durable storage.
pub async fn write_ack<W: AsyncWrite + Unpin>(channel: &mut W) -> Result<(), ChannelError> {
    channel.write_u8(ACK_BYTE).await?;
    channel.flush().await?;
    Ok(())
}

/// Sender side: one blocking read of the acknowledgement byte. Not retried.
pub async fn read_ack<R: AsyncRead + Unpin>(channel: &mut R) -> Result<(), ChannelError> {
    let byte = match channel.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(ChannelError::TransferFailed(
                "connection closed before acknowledgement".into(),
            ));
        }
        Err(e) => {
            return Err(ChannelError::TransferFailed(format!(
                "reading acknowledgement failed: {e}"
            )));
        }
    };

    if byte != ACK_BYTE {
        return Err(ChannelError::ProtocolViolation(format!(
            "unexpected acknowledgement byte {byte:#04x}"
        )));
    }
    Ok(())
}

fn chunk_len(remaining: u64) -> usize {
    remaining.min(CHUNK_SIZE as u64) as usize
}
