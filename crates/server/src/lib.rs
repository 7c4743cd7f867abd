//! Responder side of the sendfile service.
//!
//! Accepts connections on a [`Listener`](sendfile_data_channel::Listener),
//! runs one task per connection, and dispatches the control calls to a
//! [`Service`]. A `SendFile` call upgrades its connection, the payload is
//! streamed into the [`HandleStore`](sendfile_handle_store::HandleStore),
//! and the connection is closed after the acknowledgement byte.

mod config;
mod server;
mod service;

pub use config::ServerConfig;
pub use server::Server;
pub use service::Service;

use sendfile_data_channel::ChannelError;
use sendfile_handle_store::StoreError;

/// Errors produced by the responder.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
