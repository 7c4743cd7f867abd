//! Control operations over one non-upgraded connection.

use tracing::debug;

use sendfile_data_channel::{BoxStream, Connection};
use sendfile_protocol::messages::{DeleteFileReply, DeleteFileRequest, LsFileReply, LsFileRequest};
use sendfile_protocol::{Call, FileAttributes, Method, ServiceInfo};

use crate::error::{ClientError, into_result};

/// A control connection. Never upgraded, so calls can be chained.
pub struct ControlSession {
    conn: Connection<BoxStream>,
}

impl ControlSession {
    pub(crate) fn new(conn: Connection<BoxStream>) -> Self {
        Self { conn }
    }

    /// Remove. A handle that is malformed or already gone fails with
    /// `ErrorKind::InvalidFileHandle`.
    pub async fn remove(&mut self, handle: &str) -> Result<(), ClientError> {
        let call = Call::new(
            Method::DeleteFile,
            &DeleteFileRequest {
                file_handle: handle.to_string(),
            },
        )?;
        let _: DeleteFileReply = into_result(self.conn.call(&call).await?)?;
        debug!(handle, "removed");
        Ok(())
    }

    /// Stat.
    pub async fn stat(&mut self, handle: &str) -> Result<FileAttributes, ClientError> {
        let call = Call::new(
            Method::LsFile,
            &LsFileRequest {
                file_handle: handle.to_string(),
            },
        )?;
        let reply: LsFileReply = into_result(self.conn.call(&call).await?)?;
        Ok(reply.attributes)
    }

    pub async fn info(&mut self) -> Result<ServiceInfo, ClientError> {
        into_result(self.conn.call(&Call::bare(Method::GetInfo)).await?)
    }
}
