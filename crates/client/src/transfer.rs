//! The initiator's half of an upgraded connection.

use tokio::io::{AsyncRead, BufReader};
use tracing::info;

use sendfile_data_channel::{BoxStream, Connection, copier};

use crate::error::ClientError;

/// A handle plus the raw pipe it was allocated on.
///
/// Dropping a `Transfer` before [`finish`](Self::finish) closes the
/// connection; the responder then discards the partial blob.
pub struct Transfer {
    handle: String,
    length: u64,
    conn: Connection<BoxStream>,
}

impl Transfer {
    pub(crate) fn new(handle: String, length: u64, conn: Connection<BoxStream>) -> Self {
        Self {
            handle,
            length,
            conn,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Direct access to the raw pipe.
    pub fn channel(&mut self) -> Result<&mut BufReader<BoxStream>, ClientError> {
        Ok(self.conn.raw()?)
    }

    /// Streams the declared length from `source`, then blocks for the
    /// single acknowledgement byte. The connection is closed afterwards.
    pub async fn finish<R>(mut self, source: &mut R) -> Result<String, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let raw = self.conn.raw()?;
        copier::send(source, raw, self.length).await?;
        copier::read_ack(raw).await?;

        info!(handle = %self.handle, length = self.length, "transfer acknowledged");
        Ok(self.handle)
    }
}
