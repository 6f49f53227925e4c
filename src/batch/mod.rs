//! Print-batch pipeline: credential selection, the batch state machine and
//! the background worker.

pub mod orchestrator;
pub mod selector;
pub mod worker;

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::model::BatchStatus;

#[derive(Debug, Error)]
pub enum BatchError {
    /// Bad or empty filters; surfaced synchronously, no batch row created.
    #[error("validation: {0}")]
    Validation(String),
    #[error("batch not found: {0}")]
    NotFound(Uuid),
    #[error("retry not allowed: batch is {0}")]
    RetryNotAllowed(BatchStatus),
    #[error("batch is not ready for download: {0}")]
    NotReady(BatchStatus),
    /// Batch row says ready but the PDF is gone from storage.
    #[error("pdf missing from storage: {}", .0.display())]
    StorageDrift(PathBuf),
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error("print queue is closed")]
    QueueClosed,
}
