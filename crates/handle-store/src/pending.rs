//! Rollback guard for a blob that is still being written.

use std::io;
use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

use crate::StoreError;

/// A freshly allocated handle whose directory is removed when the guard is
/// dropped, unless the blob was [committed](Self::commit).
///
/// Dropping covers every way a receive can end early: an error return, a
/// cancelled session, or an aborted task. The drop path removes the tree
/// synchronously since no runtime may be left to spawn on.
#[derive(Debug)]
pub struct PendingBlob {
    handle: String,
    dir: PathBuf,
    armed: bool,
}

impl PendingBlob {
    pub(crate) fn new(handle: String, dir: PathBuf) -> Self {
        Self {
            handle,
            dir,
            armed: true,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Keeps the blob and returns its handle.
    pub fn commit(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.handle)
    }

    /// Removes the partial blob now, reporting failures to the caller.
    pub async fn discard(mut self) -> Result<(), StoreError> {
        self.armed = false;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!(handle = %self.handle, "partial blob discarded");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => warn!(handle = %self.handle, "abandoned partial blob removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(handle = %self.handle, error = %e, "failed to remove abandoned partial blob")
            }
        }
    }
}
