//! Handle store: opaque file handles mapped to blobs under a cache root.
//!
//! Every handle names a directory `<root>/<handle>` holding one backing
//! file `<root>/<handle>/file`. Handles are allocated here, never chosen by
//! callers, so concurrent transfers always write distinct files.

mod handle;
mod pending;
mod store;

pub use handle::{HANDLE_PREFIX, generate_handle, validate_handle_syntax};
pub use pending::PendingBlob;
pub use store::HandleStore;

/// Name of the backing file inside a handle directory.
pub const BLOB_FILE_NAME: &str = "file";

/// Errors produced by the handle store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed handle, or no directory exists for it.
    #[error("invalid file handle: {0}")]
    InvalidHandle(String),

    /// The handle directory or its backing file could not be created.
    #[error("failed to create blob: {0}")]
    CreateFailed(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
