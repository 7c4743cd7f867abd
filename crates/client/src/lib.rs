//! Initiator side of the sendfile service.
//!
//! A transfer always runs on its own connection: [`Client::initiate_transfer`]
//! opens one, asks for the upgrade, and hands back a [`Transfer`] bound to
//! the now raw connection. Control operations run on a [`ControlSession`],
//! which is never upgraded and can carry any number of calls.

mod error;
mod session;
mod transfer;

pub use error::ClientError;
pub use session::ControlSession;
pub use transfer::Transfer;

use std::path::Path;

use tokio::io::{AsyncRead, BufReader};
use tracing::info;

use sendfile_data_channel::{Address, Connection};
use sendfile_protocol::messages::{SendFileReply, SendFileRequest};
use sendfile_protocol::{Call, FileAttributes, Method, ServiceInfo};

use crate::error::into_result;

/// Transfer kind announced for files sent from disk.
pub const FILE_KIND: &str = "file";

/// Entry point for talking to a sendfile responder.
#[derive(Debug, Clone)]
pub struct Client {
    address: Address,
}

impl Client {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Opens a fresh control connection.
    pub async fn control(&self) -> Result<ControlSession, ClientError> {
        let stream = self.address.connect().await?;
        Ok(ControlSession::new(Connection::new(stream)))
    }

    /// Asks for a new handle on a dedicated connection and upgrades it.
    pub async fn initiate_transfer(
        &self,
        kind: &str,
        length: u64,
    ) -> Result<Transfer, ClientError> {
        let stream = self.address.connect().await?;
        let mut conn = Connection::new(stream);

        let call = Call::new(
            Method::SendFile,
            &SendFileRequest {
                kind: kind.to_string(),
                length,
            },
        )?
        .with_upgrade();

        let reply: SendFileReply = into_result(conn.call(&call).await?)?;
        info!(handle = %reply.file_handle, length, "transfer initiated");
        Ok(Transfer::new(reply.file_handle, length, conn))
    }

    /// Streams `length` bytes from `source` and waits for the acknowledgement.
    ///
    /// Returns the handle of the stored blob.
    pub async fn send<R>(&self, kind: &str, source: &mut R, length: u64) -> Result<String, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let transfer = self.initiate_transfer(kind, length).await?;
        transfer.finish(source).await
    }

    /// Sends the file at `path`.
    pub async fn send_file(&self, path: &Path) -> Result<String, ClientError> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        self.send(FILE_KIND, &mut reader, length).await
    }

    /// Removes `handle` over a fresh control connection.
    pub async fn remove(&self, handle: &str) -> Result<(), ClientError> {
        self.control().await?.remove(handle).await
    }

    /// Stats `handle` over a fresh control connection.
    pub async fn stat(&self, handle: &str) -> Result<FileAttributes, ClientError> {
        self.control().await?.stat(handle).await
    }

    /// Queries service information over a fresh control connection.
    pub async fn info(&self) -> Result<ServiceInfo, ClientError> {
        self.control().await?.info().await
    }
}
