//! Eligible-credential selection for a print batch.

use crate::model::{Credential, PrintFilters, RequestStatus};
use crate::store::Store;

/// Credentials matching the filter, in stable creation order. An empty
/// result is a perfectly valid answer; the orchestrator decides whether it
/// is a validation failure.
pub fn credentials_for_printing(store: &Store, filters: &PrintFilters) -> Vec<Credential> {
    let printed = if filters.only_unprinted {
        store.printed_credential_ids()
    } else {
        Default::default()
    };

    store
        .credentials()
        .into_iter()
        .filter(|c| {
            if !c.is_active {
                return false;
            }
            if filters.only_unprinted && printed.contains(&c.id) {
                return false;
            }
            let Some(request) = store.request(c.request_id) else {
                return false;
            };
            if request.event_id != filters.event_id || request.status != RequestStatus::Approved {
                return false;
            }
            let Some(employee) = store.employee(request.employee_id) else {
                return false;
            };
            if !filters.provider_ids.is_empty()
                && !filters.provider_ids.contains(&employee.provider_id)
            {
                return false;
            }
            let Some(provider) = store.provider(employee.provider_id) else {
                return false;
            };
            if !filters.area_ids.is_empty() && !filters.area_ids.contains(&provider.area_id) {
                return false;
            }
            true
        })
        .collect()
}
