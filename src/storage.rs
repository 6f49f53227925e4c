//! Batch-scoped artifact storage on the local filesystem.
//!
//! Rendered PDFs land under `{root}/print_batches/{batch_id}.pdf`. Deletion
//! is idempotent: cleanup runs repeatedly over the same rows and must never
//! fail on an already-missing file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn batch_pdf_path(&self, batch_id: Uuid) -> PathBuf {
        self.root.join("print_batches").join(format!("{batch_id}.pdf"))
    }

    pub fn write_batch_pdf(&self, batch_id: Uuid, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.batch_pdf_path(batch_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, bytes).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Remove a file if present. Returns whether a file was actually
    /// deleted; a missing file is not an error.
    pub fn delete(&self, path: &Path) -> Result<bool, StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
