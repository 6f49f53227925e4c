//! Print-batch state machine.
//!
//! `queued -> processing -> {ready | failed}`; `ready|failed -> archived`.
//! `failed -> queued` only through an explicit retry. Queuing returns as
//! soon as the row is persisted and the job is on the queue; all rendering
//! happens in the worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::batch::selector::credentials_for_printing;
use crate::batch::worker::BatchJob;
use crate::batch::BatchError;
use crate::model::{BatchStatus, PrintBatch, PrintFilters};
use crate::storage::Storage;
use crate::store::Store;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub batches_archived: usize,
}

pub struct Orchestrator {
    store: Arc<Store>,
    storage: Storage,
    queue: mpsc::UnboundedSender<BatchJob>,
}

impl Orchestrator {
    /// Returns the orchestrator plus the receiving end of the batch queue,
    /// to be handed to [`crate::batch::worker::spawn_worker`].
    pub fn new(
        store: Arc<Store>,
        storage: Storage,
    ) -> (Self, mpsc::UnboundedReceiver<BatchJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                storage,
                queue: tx,
            },
            rx,
        )
    }

    /// Validate filters, select credentials, persist a queued batch with
    /// its filter snapshot and enqueue the job. An empty selection is a
    /// validation failure and leaves no batch row behind.
    pub fn queue_batch(&self, filters: PrintFilters, user: Uuid) -> Result<PrintBatch, BatchError> {
        self.validate_filters(&filters)?;

        let credentials = credentials_for_printing(&self.store, &filters);
        if credentials.is_empty() {
            return Err(BatchError::Validation(
                "no credentials match the given filters".into(),
            ));
        }

        let batch = PrintBatch::new(filters.event_id, user, filters, credentials.len() as u32);
        let credential_ids: Vec<Uuid> = credentials.iter().map(|c| c.id).collect();

        self.store.insert_batch(batch.clone());
        self.store.set_batch_members(batch.id, credential_ids.clone());
        self.enqueue(batch.id, credential_ids)?;

        tracing::info!(batch_id = %batch.id, total = batch.total_credentials, "print batch queued");
        Ok(batch)
    }

    /// Re-queue a failed batch. The credential set is re-derived from the
    /// stored snapshot, so the retry is reproducible even if the original
    /// request is long gone.
    pub fn retry_batch(&self, batch_id: Uuid) -> Result<PrintBatch, BatchError> {
        let batch = self
            .store
            .batch(batch_id)
            .ok_or(BatchError::NotFound(batch_id))?;
        if batch.status != BatchStatus::Failed {
            return Err(BatchError::RetryNotAllowed(batch.status));
        }

        let credentials = credentials_for_printing(&self.store, &batch.filters_snapshot);
        if credentials.is_empty() {
            return Err(BatchError::Validation(
                "snapshot filters no longer match any credentials".into(),
            ));
        }
        let credential_ids: Vec<Uuid> = credentials.iter().map(|c| c.id).collect();

        let batch = self
            .store
            .update_batch(batch_id, |b| {
                b.status = BatchStatus::Queued;
                b.retry_count += 1;
                b.total_credentials = credential_ids.len() as u32;
                b.processed_credentials = 0;
                b.error_message = None;
                b.started_at = None;
                b.finished_at = None;
            })
            .ok_or(BatchError::NotFound(batch_id))?;

        self.store.set_batch_members(batch_id, credential_ids.clone());
        self.enqueue(batch_id, credential_ids)?;

        tracing::info!(batch_id = %batch_id, retry = batch.retry_count, "print batch re-queued");
        Ok(batch)
    }

    /// Archive every non-archived batch older than `days_old`: delete the
    /// PDF when it still exists and flip the row to `archived`. A missing
    /// file is counted as already cleaned, never as an error.
    pub fn cleanup_old_batches(&self, days_old: i64) -> Result<CleanupReport, BatchError> {
        let threshold = Utc::now() - chrono::Duration::days(days_old);
        let mut report = CleanupReport::default();

        for batch in self.store.batches() {
            if batch.status == BatchStatus::Archived || batch.created_at >= threshold {
                continue;
            }
            if let Some(path) = &batch.pdf_path {
                if self.storage.delete(path)? {
                    report.files_removed += 1;
                }
            }
            self.store.update_batch(batch.id, |b| {
                b.status = BatchStatus::Archived;
                b.pdf_path = None;
            });
            report.batches_archived += 1;
        }

        tracing::info!(
            files_removed = report.files_removed,
            batches_archived = report.batches_archived,
            "batch cleanup finished"
        );
        Ok(report)
    }

    /// Path of the finished PDF. A ready batch whose file is gone is
    /// storage drift, surfaced here rather than silently recovered.
    pub fn download_batch(&self, batch_id: Uuid) -> Result<PathBuf, BatchError> {
        let batch = self
            .store
            .batch(batch_id)
            .ok_or(BatchError::NotFound(batch_id))?;
        if batch.status != BatchStatus::Ready {
            return Err(BatchError::NotReady(batch.status));
        }
        let path = batch
            .pdf_path
            .ok_or_else(|| BatchError::StorageDrift(self.storage.batch_pdf_path(batch_id)))?;
        if !self.storage.exists(&path) {
            return Err(BatchError::StorageDrift(path));
        }
        Ok(path)
    }

    fn validate_filters(&self, filters: &PrintFilters) -> Result<(), BatchError> {
        if self.store.event(filters.event_id).is_none() {
            return Err(BatchError::Validation(format!(
                "event {} does not exist",
                filters.event_id
            )));
        }
        for id in &filters.area_ids {
            if self.store.area(*id).is_none() {
                return Err(BatchError::Validation(format!("area {id} does not exist")));
            }
        }
        for id in &filters.provider_ids {
            if self.store.provider(*id).is_none() {
                return Err(BatchError::Validation(format!(
                    "provider {id} does not exist"
                )));
            }
        }
        Ok(())
    }

    fn enqueue(&self, batch_id: Uuid, credential_ids: Vec<Uuid>) -> Result<(), BatchError> {
        self.queue
            .send(BatchJob {
                batch_id,
                credential_ids,
            })
            .map_err(|_| {
                self.store.update_batch(batch_id, |b| {
                    b.status = BatchStatus::Failed;
                    b.error_message = Some("print queue unavailable".into());
                    b.finished_at = Some(Utc::now());
                });
                BatchError::QueueClosed
            })
    }
}

/// Recurring cleanup, e.g. weekly. The task runs until the orchestrator is
/// dropped by the host application at shutdown.
pub fn spawn_cleanup(
    orchestrator: Arc<Orchestrator>,
    period: Duration,
    days_old: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // consume the immediate first tick
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = orchestrator.cleanup_old_batches(days_old) {
                tracing::warn!(error = %e, "batch cleanup failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::Utc;

    fn seeded_store() -> (Arc<Store>, Uuid, Vec<Uuid>) {
        let store = Arc::new(Store::default());
        let event_id = Uuid::new_v4();
        store.insert_event(Event {
            id: event_id,
            name: "expo".into(),
        });
        let area = Area {
            id: Uuid::new_v4(),
            event_id,
            name: "north".into(),
        };
        let provider = Provider {
            id: Uuid::new_v4(),
            area_id: area.id,
            name: "catering".into(),
        };
        let employee = Employee {
            id: Uuid::new_v4(),
            provider_id: provider.id,
            full_name: "Sam Vale".into(),
            position: "crew".into(),
        };
        store.insert_area(area);
        store.insert_provider(provider.clone());
        store.insert_employee(employee.clone());

        let mut cred_ids = Vec::new();
        for _ in 0..3 {
            let request = AccreditationRequest {
                id: Uuid::new_v4(),
                event_id,
                employee_id: employee.id,
                zone_ids: vec![],
                status: RequestStatus::Approved,
            };
            let cred = Credential {
                id: Uuid::new_v4(),
                request_id: request.id,
                status: CredentialStatus::Pending,
                qr_code: "qr".into(),
                is_active: true,
                expires_at: None,
                created_at: Utc::now(),
            };
            cred_ids.push(cred.id);
            store.insert_request(request);
            store.insert_credential(cred);
        }
        (store, event_id, cred_ids)
    }

    fn orchestrator(store: Arc<Store>, dir: &std::path::Path) -> Orchestrator {
        let (orch, _rx) = Orchestrator::new(store, Storage::new(dir));
        orch
    }

    #[test]
    fn empty_selection_is_a_validation_error_with_no_batch_row() {
        let store = Arc::new(Store::default());
        let event_id = Uuid::new_v4();
        store.insert_event(Event {
            id: event_id,
            name: "empty".into(),
        });

        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(store.clone(), dir.path());

        let err = orch
            .queue_batch(PrintFilters::for_event(event_id), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, BatchError::Validation(_)));
        assert!(store.batches().is_empty());
    }

    #[test]
    fn unknown_event_area_or_provider_is_rejected() {
        let (store, event_id, _) = seeded_store();
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(store, dir.path());

        let err = orch
            .queue_batch(PrintFilters::for_event(Uuid::new_v4()), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, BatchError::Validation(_)));

        let mut filters = PrintFilters::for_event(event_id);
        filters.area_ids = vec![Uuid::new_v4()];
        assert!(matches!(
            orch.queue_batch(filters, Uuid::new_v4()),
            Err(BatchError::Validation(_))
        ));

        let mut filters = PrintFilters::for_event(event_id);
        filters.provider_ids = vec![Uuid::new_v4()];
        assert!(matches!(
            orch.queue_batch(filters, Uuid::new_v4()),
            Err(BatchError::Validation(_))
        ));
    }

    #[test]
    fn queue_batch_persists_snapshot_and_members() {
        let (store, event_id, cred_ids) = seeded_store();
        let dir = tempfile::tempdir().unwrap();
        let (orch, mut rx) = Orchestrator::new(store.clone(), Storage::new(dir.path()));

        let user = Uuid::new_v4();
        let filters = PrintFilters::for_event(event_id);
        let batch = orch.queue_batch(filters.clone(), user).unwrap();

        assert_eq!(batch.status, BatchStatus::Queued);
        assert_eq!(batch.total_credentials, 3);
        assert_eq!(batch.generated_by, user);
        assert_eq!(batch.filters_snapshot, filters);
        assert_eq!(store.batch_members(batch.id).len(), 3);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.batch_id, batch.id);
        assert_eq!(job.credential_ids.len(), 3);
        for id in &job.credential_ids {
            assert!(cred_ids.contains(id));
        }
    }

    #[test]
    fn retry_is_rejected_unless_failed() {
        let (store, event_id, _) = seeded_store();
        let dir = tempfile::tempdir().unwrap();
        let (orch, _rx) = Orchestrator::new(store.clone(), Storage::new(dir.path()));

        let batch = orch
            .queue_batch(PrintFilters::for_event(event_id), Uuid::new_v4())
            .unwrap();

        // queued is not retryable
        assert!(matches!(
            orch.retry_batch(batch.id),
            Err(BatchError::RetryNotAllowed(BatchStatus::Queued))
        ));

        store.update_batch(batch.id, |b| b.status = BatchStatus::Ready);
        assert!(matches!(
            orch.retry_batch(batch.id),
            Err(BatchError::RetryNotAllowed(BatchStatus::Ready))
        ));
    }

    #[test]
    fn retry_resets_counters_and_reuses_the_snapshot() {
        let (store, event_id, _) = seeded_store();
        let dir = tempfile::tempdir().unwrap();
        let (orch, mut rx) = Orchestrator::new(store.clone(), Storage::new(dir.path()));

        let filters = PrintFilters::for_event(event_id);
        let batch = orch.queue_batch(filters.clone(), Uuid::new_v4()).unwrap();
        let _ = rx.try_recv().unwrap();

        store.update_batch(batch.id, |b| {
            b.status = BatchStatus::Failed;
            b.processed_credentials = 3;
            b.error_message = Some("render exploded".into());
            b.started_at = Some(Utc::now());
            b.finished_at = Some(Utc::now());
        });

        let retried = orch.retry_batch(batch.id).unwrap();
        assert_eq!(retried.status, BatchStatus::Queued);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.processed_credentials, 0);
        assert!(retried.error_message.is_none());
        assert!(retried.started_at.is_none());
        assert!(retried.finished_at.is_none());
        assert_eq!(retried.filters_snapshot, filters);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.batch_id, batch.id);
    }

    #[test]
    fn cleanup_archives_old_batches_and_tolerates_missing_files() {
        let (store, event_id, _) = seeded_store();
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let (orch, _rx) = Orchestrator::new(store.clone(), storage.clone());

        // 120 days old, ready, PDF already gone from disk
        let mut stale = PrintBatch::new(
            event_id,
            Uuid::new_v4(),
            PrintFilters::for_event(event_id),
            1,
        );
        stale.status = BatchStatus::Ready;
        stale.created_at = Utc::now() - chrono::Duration::days(120);
        stale.pdf_path = Some(storage.batch_pdf_path(stale.id));
        let stale_id = stale.id;
        store.insert_batch(stale);

        // 120 days old with a PDF that still exists
        let mut with_file = PrintBatch::new(
            event_id,
            Uuid::new_v4(),
            PrintFilters::for_event(event_id),
            1,
        );
        with_file.status = BatchStatus::Ready;
        with_file.created_at = Utc::now() - chrono::Duration::days(120);
        with_file.pdf_path = Some(storage.write_batch_pdf(with_file.id, b"%PDF-1.3").unwrap());
        let with_file_id = with_file.id;
        store.insert_batch(with_file);

        // recent batch stays untouched
        let mut fresh = PrintBatch::new(
            event_id,
            Uuid::new_v4(),
            PrintFilters::for_event(event_id),
            1,
        );
        fresh.status = BatchStatus::Ready;
        let fresh_id = fresh.id;
        store.insert_batch(fresh);

        let report = orch.cleanup_old_batches(90).unwrap();
        assert_eq!(report.batches_archived, 2);
        assert_eq!(report.files_removed, 1); // the missing file is not counted

        let stale = store.batch(stale_id).unwrap();
        assert_eq!(stale.status, BatchStatus::Archived);
        assert!(stale.pdf_path.is_none());
        assert_eq!(store.batch(with_file_id).unwrap().status, BatchStatus::Archived);
        assert_eq!(store.batch(fresh_id).unwrap().status, BatchStatus::Ready);

        // idempotent: nothing left to archive
        let report = orch.cleanup_old_batches(90).unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    #[test]
    fn download_requires_ready_and_a_present_file() {
        let (store, event_id, _) = seeded_store();
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let (orch, _rx) = Orchestrator::new(store.clone(), storage.clone());

        let batch = orch
            .queue_batch(PrintFilters::for_event(event_id), Uuid::new_v4())
            .unwrap();

        assert!(matches!(
            orch.download_batch(batch.id),
            Err(BatchError::NotReady(BatchStatus::Queued))
        ));

        // ready but the file never landed: drift
        store.update_batch(batch.id, |b| {
            b.status = BatchStatus::Ready;
            b.pdf_path = Some(storage.batch_pdf_path(b.id));
        });
        assert!(matches!(
            orch.download_batch(batch.id),
            Err(BatchError::StorageDrift(_))
        ));

        let path = storage.write_batch_pdf(batch.id, b"%PDF-1.3").unwrap();
        assert_eq!(orch.download_batch(batch.id).unwrap(), path);
    }
}
