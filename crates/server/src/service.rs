//! Per-connection session loop and call dispatch.

use tokio::io::{AsyncRead, AsyncWrite, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sendfile_data_channel::{ChannelError, Connection, copier};
use sendfile_handle_store::{HandleStore, StoreError};
use sendfile_protocol::constants::{INTERFACE, SERVICE_INTERFACE};
use sendfile_protocol::messages::{
    DeleteFileReply, DeleteFileRequest, LsFileReply, LsFileRequest, SendFileReply,
    SendFileRequest,
};
use sendfile_protocol::{Call, ErrorKind, FileAttributes, Method, Reply, ServiceInfo};

use crate::ServerError;
use crate::config::ServerConfig;

/// What the session loop does after a call was handled.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// The connection is still in control mode.
    Continue,
    /// The connection was upgraded and consumed.
    Close,
}

/// The sendfile operations over one handle store.
#[derive(Debug)]
pub struct Service {
    store: HandleStore,
    config: ServerConfig,
}

impl Service {
    pub fn new(store: HandleStore, config: ServerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &HandleStore {
        &self.store
    }

    /// Serves calls on `conn` until the peer hangs up, the connection goes
    /// idle, `cancel` fires, or an upgraded transfer finishes.
    pub async fn serve_connection<S>(
        &self,
        mut conn: Connection<S>,
        cancel: CancellationToken,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("session cancelled");
                    return Ok(());
                }
                result = tokio::time::timeout(self.config.idle_timeout, conn.read_call()) => result,
            };

            let call = match next {
                Ok(Ok(Some(call))) => call,
                Ok(Ok(None)) => {
                    debug!("peer closed control connection");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!(timeout = ?self.config.idle_timeout, "control connection idle");
                    return Ok(());
                }
            };

            if self.handle_call(&mut conn, call, &cancel).await? == Outcome::Close {
                return Ok(());
            }
        }
    }

    async fn handle_call<S>(
        &self,
        conn: &mut Connection<S>,
        call: Call,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(method) = call.method() else {
            warn!(method = %call.method, "unknown method");
            let reply = Reply::error(ErrorKind::MethodNotFound, call.method.clone());
            conn.send_reply(&reply).await?;
            return Ok(Outcome::Continue);
        };
        debug!(%method, upgrade = call.upgrade, "call received");

        let reply = match method {
            Method::SendFile => return self.send_file(conn, &call, cancel).await,
            _ if call.upgrade => Reply::error(
                ErrorKind::InvalidParameter,
                format!("{method} does not support upgrade"),
            ),
            Method::DeleteFile => self.delete_file(&call).await?,
            Method::LsFile => self.ls_file(&call).await?,
            Method::GetInfo => Reply::ok(&self.info())?,
        };
        conn.send_reply(&reply).await?;
        Ok(Outcome::Continue)
    }

    /// InitiateTransfer: validate, allocate, reply, upgrade, receive, ack.
    async fn send_file<S>(
        &self,
        conn: &mut Connection<S>,
        call: &Call,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !call.upgrade {
            warn!("SendFile without upgrade flag");
            let reply = Reply::error(
                ErrorKind::UpgradeRequired,
                "SendFile must be called with the upgrade flag",
            );
            conn.send_reply(&reply).await?;
            return Ok(Outcome::Continue);
        }

        let request: SendFileRequest = match call.parse_parameters() {
            Ok(r) => r,
            Err(e) => {
                conn.send_reply(&Reply::error(ErrorKind::InvalidParameter, e.to_string()))
                    .await?;
                return Ok(Outcome::Continue);
            }
        };

        if request.length > self.config.max_file_size {
            warn!(
                length = request.length,
                max = self.config.max_file_size,
                "declared length too big"
            );
            conn.send_reply(&Reply::error(ErrorKind::FileTooBig, "")).await?;
            return Ok(Outcome::Continue);
        }

        // Removes the handle on every path that does not reach the ack.
        let pending = match self.store.reserve().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "handle allocation failed");
                conn.send_reply(&store_error_reply(&e)).await?;
                return Ok(Outcome::Continue);
            }
        };

        let handle = pending.handle().to_string();

        let file = match self.store.create_blob(&handle).await {
            Ok(f) => f,
            Err(e) => {
                warn!(handle = %handle, error = %e, "backing file creation failed");
                pending.discard().await?;
                conn.send_reply(&store_error_reply(&e)).await?;
                return Ok(Outcome::Continue);
            }
        };

        // Last structured message on this connection.
        let reply = Reply::ok(&SendFileReply {
            file_handle: handle.clone(),
        })?;
        if let Err(e) = conn.send_upgrade_reply(&reply).await {
            pending.discard().await?;
            return Err(e.into());
        }

        info!(handle = %handle, kind = %request.kind, length = request.length, "receiving");

        let received = tokio::select! {
            result = receive_blob(conn, file, request.length) => result,
            _ = cancel.cancelled() => {
                warn!(handle = %handle, "transfer interrupted by shutdown");
                pending.discard().await?;
                return Ok(Outcome::Close);
            }
        };

        match received {
            Ok(()) => {
                pending.commit();
                info!(handle = %handle, length = request.length, "transfer complete");
                Ok(Outcome::Close)
            }
            Err(e) => {
                pending.discard().await?;
                Err(e.into())
            }
        }
    }

    /// Remove.
    async fn delete_file(&self, call: &Call) -> Result<Reply, ServerError> {
        let request: DeleteFileRequest = match call.parse_parameters() {
            Ok(r) => r,
            Err(e) => return Ok(Reply::error(ErrorKind::InvalidParameter, e.to_string())),
        };

        match self.store.remove(&request.file_handle).await {
            Ok(()) => Ok(Reply::ok(&DeleteFileReply {})?),
            Err(e) => {
                debug!(handle = %request.file_handle, error = %e, "delete rejected");
                Ok(store_error_reply(&e))
            }
        }
    }

    /// Stat.
    async fn ls_file(&self, call: &Call) -> Result<Reply, ServerError> {
        let request: LsFileRequest = match call.parse_parameters() {
            Ok(r) => r,
            Err(e) => return Ok(Reply::error(ErrorKind::InvalidParameter, e.to_string())),
        };

        match self.store.stat(&request.file_handle).await {
            Ok(size) => Ok(Reply::ok(&LsFileReply {
                attributes: FileAttributes { size },
            })?),
            Err(e) => {
                debug!(handle = %request.file_handle, error = %e, "stat rejected");
                Ok(store_error_reply(&e))
            }
        }
    }

    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            vendor: "sendfile".into(),
            product: "Send File Service".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            url: env!("CARGO_PKG_REPOSITORY").into(),
            interfaces: vec![INTERFACE.into(), SERVICE_INTERFACE.into()],
        }
    }
}

/// Streams the payload into `file`, syncs it, then acknowledges.
async fn receive_blob<S>(
    conn: &mut Connection<S>,
    file: tokio::fs::File,
    length: u64,
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw = conn.raw()?;
    let mut writer = BufWriter::new(file);
    copier::receive(raw, &mut writer, length).await?;

    let file = writer.into_inner();
    file.sync_all()
        .await
        .map_err(|e| ChannelError::TransferFailed(format!("sync of backing store failed: {e}")))?;
    drop(file);

    copier::write_ack(raw).await
}

fn store_error_reply(error: &StoreError) -> Reply {
    match error {
        StoreError::InvalidHandle(msg) => Reply::error(ErrorKind::InvalidFileHandle, msg.clone()),
        StoreError::CreateFailed(e) => Reply::error(ErrorKind::FileCreate, e.to_string()),
        StoreError::Io(e) => Reply::error(ErrorKind::IoError, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::task::JoinHandle;

    struct Harness {
        _dir: tempfile::TempDir,
        service: std::sync::Arc<Service>,
    }

    impl Harness {
        async fn new(config: ServerConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = HandleStore::open(dir.path().join("cache")).await.unwrap();
            Self {
                _dir: dir,
                service: std::sync::Arc::new(Service::new(store, config)),
            }
        }

        fn connect(&self) -> (Connection<DuplexStream>, JoinHandle<Result<(), ServerError>>) {
            let (client, server) = duplex(64 * 1024);
            let service = std::sync::Arc::clone(&self.service);
            let task = tokio::spawn(async move {
                service
                    .serve_connection(Connection::new(server), CancellationToken::new())
                    .await
            });
            (Connection::new(client), task)
        }

        fn entries(&self) -> usize {
            std::fs::read_dir(self.service.store().root()).unwrap().count()
        }
    }

    fn send_file_call(length: u64) -> Call {
        Call::new(
            Method::SendFile,
            &SendFileRequest {
                kind: "file".into(),
                length,
            },
        )
        .unwrap()
        .with_upgrade()
    }

    fn handle_call(method: Method, handle: &str) -> Call {
        Call::new(
            method,
            &DeleteFileRequest {
                file_handle: handle.into(),
            },
        )
        .unwrap()
    }

    async fn transfer(conn: &mut Connection<DuplexStream>, payload: &[u8]) -> String {
        let reply = conn.call(&send_file_call(payload.len() as u64)).await.unwrap();
        assert!(!reply.is_error(), "unexpected error reply: {reply:?}");
        let handle = reply.parse_parameters::<SendFileReply>().unwrap().file_handle;

        let raw = conn.raw().unwrap();
        let mut source = payload;
        copier::send(&mut source, raw, payload.len() as u64)
            .await
            .unwrap();
        copier::read_ack(raw).await.unwrap();
        handle
    }

    #[tokio::test]
    async fn transfer_then_stat_and_read_back() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let handle = transfer(&mut conn, b"hello").await;
        drop(conn);
        task.await.unwrap().unwrap();

        assert_eq!(h.service.store().stat(&handle).await.unwrap(), 5);
        let stored = std::fs::read(h.service.store().root().join(&handle).join("file")).unwrap();
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn zero_length_transfer_acks_immediately() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let handle = transfer(&mut conn, b"").await;
        task.await.unwrap().unwrap();
        assert_eq!(h.service.store().stat(&handle).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn multi_chunk_transfer() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
        let handle = transfer(&mut conn, &payload).await;
        task.await.unwrap().unwrap();

        let stored = std::fs::read(h.service.store().root().join(&handle).join("file")).unwrap();
        assert_eq!(stored, payload);
    }

    #[tokio::test]
    async fn too_big_is_rejected_before_allocation() {
        let h = Harness::new(ServerConfig {
            max_file_size: 10,
            ..ServerConfig::default()
        })
        .await;
        let (mut conn, task) = h.connect();

        let reply = conn.call(&send_file_call(11)).await.unwrap();
        assert_eq!(reply.error, Some(ErrorKind::FileTooBig));
        assert!(!conn.is_upgraded());
        assert_eq!(h.entries(), 0);

        // The connection is still usable for control calls.
        let reply = conn.call(&Call::bare(Method::GetInfo)).await.unwrap();
        assert!(!reply.is_error());

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn limit_is_inclusive() {
        let h = Harness::new(ServerConfig {
            max_file_size: 5,
            ..ServerConfig::default()
        })
        .await;
        let (mut conn, task) = h.connect();
        let handle = transfer(&mut conn, b"12345").await;
        task.await.unwrap().unwrap();
        assert_eq!(h.service.store().stat(&handle).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn send_file_requires_upgrade() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let call = Call::new(
            Method::SendFile,
            &SendFileRequest {
                kind: "file".into(),
                length: 5,
            },
        )
        .unwrap();
        let reply = conn.call(&call).await.unwrap();
        assert_eq!(reply.error, Some(ErrorKind::UpgradeRequired));
        assert_eq!(h.entries(), 0);

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn aborted_transfer_leaves_no_blob() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let reply = conn.call(&send_file_call(5)).await.unwrap();
        let handle = reply.parse_parameters::<SendFileReply>().unwrap().file_handle;
        let raw = conn.raw().unwrap();
        raw.write_all(b"hel").await.unwrap();
        raw.flush().await.unwrap();
        drop(conn);

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Channel(ChannelError::TransferFailed(_)))
        ));
        assert!(matches!(
            h.service.store().stat(&handle).await,
            Err(StoreError::InvalidHandle(_))
        ));
        assert_eq!(h.entries(), 0);
    }

    #[tokio::test]
    async fn no_ack_without_full_payload() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let _ = conn.call(&send_file_call(5)).await.unwrap();
        let raw = conn.raw().unwrap();
        raw.write_all(b"hel").await.unwrap();
        raw.shutdown().await.unwrap();

        // The responder closes without writing the acknowledgement.
        let mut rest = Vec::new();
        raw.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn aborted_session_task_rolls_back() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let reply = conn.call(&send_file_call(10)).await.unwrap();
        let handle = reply.parse_parameters::<SendFileReply>().unwrap().file_handle;
        let raw = conn.raw().unwrap();
        raw.write_all(b"abc").await.unwrap();
        raw.flush().await.unwrap();

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(matches!(
            h.service.store().stat(&handle).await,
            Err(StoreError::InvalidHandle(_))
        ));
        assert_eq!(h.entries(), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_transfer() {
        let h = Harness::new(ServerConfig::default()).await;
        let (client, server) = duplex(64 * 1024);
        let cancel = CancellationToken::new();
        let service = std::sync::Arc::clone(&h.service);
        let session = cancel.clone();
        let task = tokio::spawn(async move {
            service
                .serve_connection(Connection::new(server), session)
                .await
        });

        let mut conn = Connection::new(client);
        let reply = conn.call(&send_file_call(10)).await.unwrap();
        assert!(!reply.is_error());
        let raw = conn.raw().unwrap();
        raw.write_all(b"abc").await.unwrap();
        raw.flush().await.unwrap();

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(h.entries(), 0);

        // Closed without an acknowledgement.
        let mut rest = Vec::new();
        raw.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn delete_twice() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();
        let handle = transfer(&mut conn, b"hello").await;
        task.await.unwrap().unwrap();

        // A fresh connection for control calls after the upgrade.
        let (mut conn, task) = h.connect();
        let first = conn
            .call(&handle_call(Method::DeleteFile, &handle))
            .await
            .unwrap();
        assert!(!first.is_error());

        let second = conn
            .call(&handle_call(Method::DeleteFile, &handle))
            .await
            .unwrap();
        assert_eq!(second.error, Some(ErrorKind::InvalidFileHandle));

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn separator_handles_are_invalid() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        for method in [Method::DeleteFile, Method::LsFile] {
            let reply = conn.call(&handle_call(method, "../cache")).await.unwrap();
            assert_eq!(reply.error, Some(ErrorKind::InvalidFileHandle));
        }
        assert!(h.service.store().root().is_dir());

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stat_without_backing_file_surfaces_io_error() {
        let h = Harness::new(ServerConfig::default()).await;
        let handle = h.service.store().allocate().await.unwrap();
        let (mut conn, task) = h.connect();

        let reply = conn.call(&handle_call(Method::LsFile, &handle)).await.unwrap();
        let (kind, detail) = reply.error_detail().unwrap();
        assert_eq!(kind, ErrorKind::IoError);
        assert!(!detail.message.is_empty());

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_method() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let call: Call = serde_json::from_str(r#"{"method":"org.example.sendfile.Nope"}"#).unwrap();
        let reply = conn.call(&call).await.unwrap();
        let (kind, detail) = reply.error_detail().unwrap();
        assert_eq!(kind, ErrorKind::MethodNotFound);
        assert_eq!(detail.message, "org.example.sendfile.Nope");

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_parameters() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let call: Call = serde_json::from_str(
            r#"{"method":"org.example.sendfile.SendFile","parameters":{"type":"file","length":-5},"upgrade":true}"#,
        )
        .unwrap();
        let reply = conn.call(&call).await.unwrap();
        assert_eq!(reply.error, Some(ErrorKind::InvalidParameter));
        assert!(!conn.is_upgraded());
        assert_eq!(h.entries(), 0);

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn upgrade_flag_rejected_on_other_methods() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let reply = conn
            .call(&Call::bare(Method::GetInfo).with_upgrade())
            .await
            .unwrap();
        assert_eq!(reply.error, Some(ErrorKind::InvalidParameter));
        assert!(!conn.is_upgraded());

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn get_info_lists_interfaces() {
        let h = Harness::new(ServerConfig::default()).await;
        let (mut conn, task) = h.connect();

        let reply = conn.call(&Call::bare(Method::GetInfo)).await.unwrap();
        let info: ServiceInfo = reply.parse_parameters().unwrap();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.interfaces.iter().any(|i| i == INTERFACE));

        drop(conn);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_is_closed() {
        let h = Harness::new(ServerConfig {
            idle_timeout: std::time::Duration::from_secs(5),
            ..ServerConfig::default()
        })
        .await;
        let (_conn, task) = h.connect();

        tokio::time::advance(std::time::Duration::from_secs(6)).await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_ends_session() {
        let h = Harness::new(ServerConfig::default()).await;
        let (_client, server) = duplex(1024);
        let cancel = CancellationToken::new();
        cancel.cancel();

        h.service
            .serve_connection(Connection::new(server), cancel)
            .await
            .unwrap();
    }
}
