//! Background batch worker.
//!
//! Consumes [`BatchJob`]s from the orchestrator's queue and drives each
//! batch through `processing` to `ready` or `failed`. Rendering is CPU
//! bound, so each credential runs on the blocking pool with a semaphore
//! capping parallelism; results are awaited in submission order to keep
//! the PDF page order stable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::attach::{AttachmentKind, AttachmentRegistry};
use crate::model::{BatchStatus, CredentialStatus, RenderInput};
use crate::pdf::assemble_pdf;
pub use crate::render::RenderCredential;
use crate::render::RenderError;
use crate::storage::Storage;
use crate::store::Store;

/// One queued unit of work: a batch and its member credentials, in the
/// page order the selector produced.
#[derive(Clone, Debug)]
pub struct BatchJob {
    pub batch_id: Uuid,
    pub credential_ids: Vec<Uuid>,
}

/// Run the worker loop until the queue closes. A single worker task is
/// enough: parallelism lives inside each batch, not across batches, which
/// keeps PDF assembly and progress accounting simple.
pub fn spawn_worker(
    store: Arc<Store>,
    storage: Storage,
    renderer: Arc<dyn RenderCredential>,
    attachments: AttachmentRegistry,
    mut rx: mpsc::UnboundedReceiver<BatchJob>,
    parallelism: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let limit = Arc::new(Semaphore::new(parallelism.max(1)));
        while let Some(job) = rx.recv().await {
            process_batch(&store, &storage, &renderer, &attachments, &limit, job).await;
        }
        tracing::debug!("batch queue closed, worker exiting");
    })
}

async fn process_batch(
    store: &Arc<Store>,
    storage: &Storage,
    renderer: &Arc<dyn RenderCredential>,
    attachments: &AttachmentRegistry,
    limit: &Arc<Semaphore>,
    job: BatchJob,
) {
    let batch_id = job.batch_id;
    let Some(batch) = store.update_batch(batch_id, |b| {
        b.status = BatchStatus::Processing;
        b.started_at = Some(Utc::now());
    }) else {
        tracing::warn!(batch_id = %batch_id, "queued batch no longer exists");
        return;
    };
    tracing::info!(batch_id = %batch_id, total = job.credential_ids.len(), "processing print batch");

    let Some(template) = store.default_template(batch.event_id) else {
        fail_batch(store, batch_id, "event has no default credential template");
        return;
    };
    let template = Arc::new(template);

    let mut handles = Vec::with_capacity(job.credential_ids.len());
    for credential_id in job.credential_ids {
        store.set_credential_status(credential_id, CredentialStatus::Generating);

        let input = build_render_input(store, attachments, credential_id);
        let renderer = Arc::clone(renderer);
        let template = Arc::clone(&template);
        let limit = Arc::clone(limit);

        let handle = tokio::spawn(async move {
            // closed only at shutdown, after the worker itself is gone
            let Ok(_permit) = limit.acquire().await else {
                return (credential_id, Err("render pool shut down".to_string()));
            };
            let result = tokio::task::spawn_blocking(move || {
                let input = input?;
                renderer.render(&template, &input)
            })
            .await;
            let result = match result {
                Ok(r) => r.map_err(|e| e.to_string()),
                Err(e) => Err(format!("render task panicked: {e}")),
            };
            (credential_id, result)
        });
        handles.push(handle);
    }

    // await in submission order so pages match selection order
    let mut pages = Vec::new();
    let mut rendered_ids = Vec::new();
    let mut failures = Vec::new();
    for handle in handles {
        let (credential_id, result) = match handle.await {
            Ok(out) => out,
            Err(e) => {
                failures.push(format!("internal: {e}"));
                continue;
            }
        };
        store.increment_processed(batch_id);
        match result {
            Ok(image) => {
                store.set_credential_status(credential_id, CredentialStatus::Ready);
                rendered_ids.push(credential_id);
                pages.push(image);
            }
            Err(message) => {
                tracing::warn!(batch_id = %batch_id, credential_id = %credential_id, error = %message, "credential render failed");
                store.set_credential_status(credential_id, CredentialStatus::Failed);
                failures.push(format!("{credential_id}: {message}"));
            }
        }
    }

    if pages.is_empty() {
        let message = if failures.is_empty() {
            "batch contained no credentials".to_string()
        } else {
            failures.join("; ")
        };
        fail_batch(store, batch_id, &message);
        return;
    }

    let title = format!("print-batch-{batch_id}");
    let bytes = match assemble_pdf(&title, &pages) {
        Ok(b) => b,
        Err(e) => {
            fail_batch(store, batch_id, &format!("pdf assembly: {e}"));
            return;
        }
    };
    let path = match storage.write_batch_pdf(batch_id, &bytes) {
        Ok(p) => p,
        Err(e) => {
            fail_batch(store, batch_id, &e.to_string());
            return;
        }
    };

    let error_message = if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    };
    // membership now means "in the PDF": skipped credentials stay eligible
    // for the next batch under only_unprinted
    store.set_batch_members(batch_id, rendered_ids);
    store.update_batch(batch_id, |b| {
        b.status = BatchStatus::Ready;
        b.pdf_path = Some(path.clone());
        b.error_message = error_message.clone();
        b.finished_at = Some(Utc::now());
    });
    tracing::info!(batch_id = %batch_id, pages = pages.len(), skipped = failures.len(), "print batch ready");
}

fn fail_batch(store: &Store, batch_id: Uuid, message: &str) {
    tracing::warn!(batch_id = %batch_id, error = %message, "print batch failed");
    store.update_batch(batch_id, |b| {
        b.status = BatchStatus::Failed;
        b.error_message = Some(message.to_string());
        b.finished_at = Some(Utc::now());
    });
}

/// Resolve everything the renderer needs for one credential. Missing
/// collaborator records fail the credential, not the batch; zone ids with
/// no catalog entry are silently skipped.
fn build_render_input(
    store: &Store,
    attachments: &AttachmentRegistry,
    credential_id: Uuid,
) -> Result<RenderInput, RenderError> {
    let credential = store
        .credential(credential_id)
        .ok_or_else(|| RenderError::Data(format!("credential {credential_id} not found")))?;
    let request = store
        .request(credential.request_id)
        .ok_or_else(|| RenderError::Data(format!("request {} not found", credential.request_id)))?;
    let employee = store
        .employee(request.employee_id)
        .ok_or_else(|| RenderError::Data(format!("employee {} not found", request.employee_id)))?;
    let provider = store
        .provider(employee.provider_id)
        .ok_or_else(|| RenderError::Data(format!("provider {} not found", employee.provider_id)))?;

    let mut fields = BTreeMap::new();
    fields.insert("full_name".to_string(), employee.full_name.clone());
    fields.insert("position".to_string(), employee.position.clone());
    fields.insert("provider".to_string(), provider.name.clone());

    let mut zone_codes: Vec<u16> = request
        .zone_ids
        .iter()
        .filter_map(|id| store.zone(*id))
        .map(|z| z.code)
        .collect();
    zone_codes.sort_unstable();

    let photo = attachments.resolve(AttachmentKind::EmployeePhoto, employee.id);

    Ok(RenderInput {
        credential_id,
        qr_code: credential.qr_code,
        photo,
        fields,
        zone_codes,
    })
}
