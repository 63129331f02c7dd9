//! Disposable per-execution workspaces
//!
//! Each execution gets a fresh temporary directory that holds the submitted
//! source and any build artifacts, and is removed when the execution ends.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

use crate::types::SessionId;

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("failed to create scratch directory: {0}")]
    Create(#[source] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One execution's scratch directory.
///
/// Removed from disk when dropped; prefer [`dispose()`](Self::dispose) at
/// the end of an execution so removal happens off the async runtime.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create a fresh scratch directory for a session's execution.
    pub fn create(session: &SessionId) -> Result<Self, ScratchError> {
        let prefix = format!("exec_{}_", sanitize(session.as_str()));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir()
            .map_err(ScratchError::Create)?;

        debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    /// Path of the scratch directory (used as the child's working directory)
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Host path of a file inside the scratch directory.
    ///
    /// Returns an error if the name contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, ScratchError> {
        if name.contains("..") || name.starts_with('/') {
            return Err(ScratchError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.dir.path().join(name))
    }

    /// Write a file into the scratch directory
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), ScratchError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), len = content.len(), "wrote file to scratch");
        Ok(())
    }

    /// Schedule removal of the workspace without blocking the caller.
    pub fn dispose(self) {
        let dir = self.dir;
        tokio::task::spawn_blocking(move || {
            let path = dir.path().to_path_buf();
            drop(dir);
            debug!(path = %path.display(), "removed scratch directory");
        });
    }
}

/// Session ids are opaque transport strings; keep only filename-safe chars
/// for the directory prefix.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
