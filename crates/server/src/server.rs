//! Listener loop: one task per accepted connection.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use sendfile_data_channel::{Connection, Listener};

use crate::ServerError;
use crate::service::Service;

/// The sendfile responder.
pub struct Server {
    service: Arc<Service>,
    cancel: CancellationToken,
    sessions: TaskTracker,
}

impl Server {
    pub fn new(service: Service) -> Self {
        Self {
            service: Arc::new(service),
            cancel: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Token that stops the accept loop and every idle session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Accepts connections on `listener` until cancellation, then waits for
    /// every session to finish.
    ///
    /// Sessions run independently; a failing session is logged and never
    /// affects the accept loop.
    pub async fn run(&self, listener: Listener) -> Result<(), ServerError> {
        tracing::info!(address = %listener.local_address()?, "sendfile server listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(sessions = self.sessions.len(), "server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "connection accepted");
                            let service = Arc::clone(&self.service);
                            let cancel = self.cancel.child_token();
                            self.sessions.spawn(async move {
                                let conn = Connection::new(stream);
                                if let Err(e) = service.serve_connection(conn, cancel).await {
                                    tracing::error!(%peer, "session failed: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        // In-flight transfers observe the cancellation and roll back.
        drop(listener);
        self.sessions.close();
        self.sessions.wait().await;
        Ok(())
    }
}
