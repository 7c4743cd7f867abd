//! Client error type.

use serde::de::DeserializeOwned;

use sendfile_data_channel::ChannelError;
use sendfile_protocol::{ErrorKind, Reply};

/// Errors produced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The responder answered with an error reply.
    #[error("service error ({kind}): {message}")]
    Service { kind: ErrorKind, message: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// The responder's error kind, if this is a service error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Service { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// `true` for the error a second removal of the same handle produces.
    pub fn is_invalid_handle(&self) -> bool {
        self.kind() == Some(ErrorKind::InvalidFileHandle)
    }

    /// `true` if the raw phase failed: short transfer or missing acknowledgement.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, ClientError::Channel(ChannelError::TransferFailed(_)))
    }
}

/// Turns a reply into its typed parameters or a [`ClientError::Service`].
pub(crate) fn into_result<T: DeserializeOwned>(reply: Reply) -> Result<T, ClientError> {
    if let Some((kind, detail)) = reply.error_detail() {
        return Err(ClientError::Service {
            kind,
            message: detail.message,
        });
    }
    Ok(reply.parse_parameters()?)
}
