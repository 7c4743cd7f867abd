//! Filesystem-backed handle store.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tracing::{debug, info};

use crate::handle::{generate_handle, validate_handle_syntax};
use crate::pending::PendingBlob;
use crate::{BLOB_FILE_NAME, StoreError};

/// Attempts at finding an unused handle name before giving up.
const ALLOCATE_ATTEMPTS: usize = 8;

/// Blobs under a single cache root.
///
/// The root is injected at construction, so independent stores (e.g. one
/// per test) never share state.
#[derive(Debug, Clone)]
pub struct HandleStore {
    root: PathBuf,
}

impl HandleStore {
    /// Creates a store over an existing `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates `root` (and parents) if needed, then returns a store over it.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "handle store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a uniquely named directory under the root and returns its
    /// name as the new handle.
    pub async fn allocate(&self) -> Result<String, StoreError> {
        for _ in 0..ALLOCATE_ATTEMPTS {
            let handle = generate_handle();
            let dir = self.root.join(&handle);

            let mut builder = fs::DirBuilder::new();
            #[cfg(unix)]
            builder.mode(0o700);

            match builder.create(&dir).await {
                Ok(()) => {
                    debug!(handle = %handle, "handle allocated");
                    return Ok(handle);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::CreateFailed(e)),
            }
        }

        Err(StoreError::CreateFailed(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no unused handle name found",
        )))
    }

    /// Allocates a handle guarded by a [`PendingBlob`], which removes it
    /// again unless committed.
    pub async fn reserve(&self) -> Result<PendingBlob, StoreError> {
        let handle = self.allocate().await?;
        let dir = self.root.join(&handle);
        Ok(PendingBlob::new(handle, dir))
    }

    /// Creates the (empty) backing file of an allocated handle.
    pub async fn create_blob(&self, handle: &str) -> Result<File, StoreError> {
        let dir = self.validate(handle).await?;
        File::create(dir.join(BLOB_FILE_NAME))
            .await
            .map_err(StoreError::CreateFailed)
    }

    /// Checks `handle` syntax and that its directory exists.
    ///
    /// Returns the handle directory. Must run before any filesystem access
    /// derived from caller input.
    pub async fn validate(&self, handle: &str) -> Result<PathBuf, StoreError> {
        validate_handle_syntax(handle).map_err(StoreError::InvalidHandle)?;

        let dir = self.root.join(handle);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::InvalidHandle(format!("not a handle: {handle}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::InvalidHandle(format!("no such handle: {handle}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the handle directory tree.
    pub async fn remove(&self, handle: &str) -> Result<(), StoreError> {
        let dir = self.validate(handle).await?;
        fs::remove_dir_all(&dir).await?;
        info!(handle = %handle, "blob removed");
        Ok(())
    }

    /// Size in bytes of the blob stored under `handle`.
    ///
    /// Opening or statting the backing file fails with the OS error as-is.
    pub async fn stat(&self, handle: &str) -> Result<u64, StoreError> {
        let dir = self.validate(handle).await?;
        let file = File::open(dir.join(BLOB_FILE_NAME)).await?;
        let meta = file.metadata().await?;
        Ok(meta.len())
    }
}
