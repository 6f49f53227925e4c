//! In-memory repository standing in for the collaborator's persistence.
//!
//! The surrounding CRUD application owns these records; the pipeline reads
//! them and mutates only what it owns (credential render status, print
//! batch rows). Template writes enforce the single-default invariant and
//! version bumps here, at write time.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::model::{
    AccreditationRequest, Area, BatchStatus, Credential, CredentialStatus, Employee, Event,
    PrintBatch, Provider, Template, TemplateError, Zone,
};
use crate::notify::{CredentialSignal, NotificationHub};

#[derive(Default)]
struct Inner {
    events: HashMap<Uuid, Event>,
    areas: HashMap<Uuid, Area>,
    providers: HashMap<Uuid, Provider>,
    employees: HashMap<Uuid, Employee>,
    zones: HashMap<Uuid, Zone>,
    requests: HashMap<Uuid, AccreditationRequest>,
    credentials: HashMap<Uuid, Credential>,
    templates: HashMap<Uuid, Template>,
    batches: HashMap<Uuid, PrintBatch>,
    batch_members: HashMap<Uuid, Vec<Uuid>>,
}

pub struct Store {
    inner: RwLock<Inner>,
    template_cache: TtlCache<Uuid, Template>,
    hub: NotificationHub,
}

impl Store {
    pub fn new(hub: NotificationHub, template_cache_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            template_cache: TtlCache::new(template_cache_ttl),
            hub,
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    // catalog writes (collaborator-owned records)

    pub fn insert_event(&self, e: Event) {
        self.inner.write().events.insert(e.id, e);
    }

    pub fn insert_area(&self, a: Area) {
        self.inner.write().areas.insert(a.id, a);
    }

    pub fn insert_provider(&self, p: Provider) {
        self.inner.write().providers.insert(p.id, p);
    }

    pub fn insert_employee(&self, e: Employee) {
        self.inner.write().employees.insert(e.id, e);
    }

    pub fn insert_zone(&self, z: Zone) {
        self.inner.write().zones.insert(z.id, z);
    }

    pub fn insert_request(&self, r: AccreditationRequest) {
        self.inner.write().requests.insert(r.id, r);
    }

    pub fn insert_credential(&self, c: Credential) {
        self.inner.write().credentials.insert(c.id, c);
    }

    // catalog reads

    pub fn event(&self, id: Uuid) -> Option<Event> {
        self.inner.read().events.get(&id).cloned()
    }

    pub fn area(&self, id: Uuid) -> Option<Area> {
        self.inner.read().areas.get(&id).cloned()
    }

    pub fn provider(&self, id: Uuid) -> Option<Provider> {
        self.inner.read().providers.get(&id).cloned()
    }

    pub fn employee(&self, id: Uuid) -> Option<Employee> {
        self.inner.read().employees.get(&id).cloned()
    }

    pub fn zone(&self, id: Uuid) -> Option<Zone> {
        self.inner.read().zones.get(&id).cloned()
    }

    pub fn request(&self, id: Uuid) -> Option<AccreditationRequest> {
        self.inner.read().requests.get(&id).cloned()
    }

    pub fn credential(&self, id: Uuid) -> Option<Credential> {
        self.inner.read().credentials.get(&id).cloned()
    }

    pub fn credentials(&self) -> Vec<Credential> {
        let mut v: Vec<_> = self.inner.read().credentials.values().cloned().collect();
        // stable selection order regardless of map iteration
        v.sort_by_key(|c| (c.created_at, c.id));
        v
    }

    // templates

    /// Persist a template revision. Rejects invalid layout geometry, bumps
    /// `version` on an existing id and enforces the one-default-per-event
    /// invariant inside the same write.
    pub fn save_template(&self, mut t: Template) -> Result<Template, TemplateError> {
        t.validate()?;
        let mut inner = self.inner.write();
        if let Some(existing) = inner.templates.get(&t.id) {
            t.version = existing.version + 1;
        } else {
            t.version = t.version.max(1);
        }
        if t.is_default {
            for other in inner.templates.values_mut() {
                if other.event_id == t.event_id && other.id != t.id {
                    other.is_default = false;
                }
            }
        }
        inner.templates.insert(t.id, t.clone());
        drop(inner);

        self.template_cache.invalidate(&t.event_id);
        Ok(t)
    }

    pub fn template(&self, id: Uuid) -> Option<Template> {
        self.inner.read().templates.get(&id).cloned()
    }

    /// The event's default template, memoized with a TTL and invalidated by
    /// `save_template`.
    pub fn default_template(&self, event_id: Uuid) -> Option<Template> {
        if let Some(t) = self.template_cache.get(&event_id) {
            return Some(t);
        }
        let found = self
            .inner
            .read()
            .templates
            .values()
            .find(|t| t.event_id == event_id && t.is_default)
            .cloned();
        if let Some(t) = &found {
            self.template_cache.insert(event_id, t.clone());
        }
        found
    }

    // credentials (pipeline-owned state)

    pub fn set_credential_status(&self, id: Uuid, status: CredentialStatus) {
        let changed = {
            let mut inner = self.inner.write();
            match inner.credentials.get_mut(&id) {
                Some(c) => {
                    c.status = status;
                    true
                }
                None => false,
            }
        };
        if changed {
            match status {
                CredentialStatus::Ready => self.hub.raise(id, CredentialSignal::RenderReady),
                CredentialStatus::Failed => self.hub.raise(id, CredentialSignal::RenderFailed),
                _ => {}
            }
        }
    }

    /// Mass invalidation when an event's credentials are revoked: flips
    /// `is_active`, stamps `expires_at` and raises a suspension signal per
    /// credential.
    pub fn invalidate_event_credentials(&self, event_id: Uuid, expires_at: DateTime<Utc>) -> usize {
        let mut suspended = Vec::new();
        {
            let mut inner = self.inner.write();
            let request_ids: HashSet<Uuid> = inner
                .requests
                .values()
                .filter(|r| r.event_id == event_id)
                .map(|r| r.id)
                .collect();
            for c in inner.credentials.values_mut() {
                if request_ids.contains(&c.request_id) && c.is_active {
                    c.is_active = false;
                    c.expires_at = Some(expires_at);
                    suspended.push(c.id);
                }
            }
        }
        for id in &suspended {
            self.hub.raise(*id, CredentialSignal::Suspended);
        }
        suspended.len()
    }

    // print batches

    pub fn insert_batch(&self, b: PrintBatch) {
        self.inner.write().batches.insert(b.id, b);
    }

    pub fn batch(&self, id: Uuid) -> Option<PrintBatch> {
        self.inner.read().batches.get(&id).cloned()
    }

    pub fn batches(&self) -> Vec<PrintBatch> {
        self.inner.read().batches.values().cloned().collect()
    }

    pub fn update_batch<F: FnOnce(&mut PrintBatch)>(&self, id: Uuid, f: F) -> Option<PrintBatch> {
        let mut inner = self.inner.write();
        let b = inner.batches.get_mut(&id)?;
        f(b);
        Some(b.clone())
    }

    /// Single owned progress counter for a batch run; clamped so readers
    /// never observe `processed > total`.
    pub fn increment_processed(&self, id: Uuid) -> Option<u32> {
        let mut inner = self.inner.write();
        let b = inner.batches.get_mut(&id)?;
        b.processed_credentials = (b.processed_credentials + 1).min(b.total_credentials);
        Some(b.processed_credentials)
    }

    pub fn set_batch_members(&self, id: Uuid, members: Vec<Uuid>) {
        self.inner.write().batch_members.insert(id, members);
    }

    pub fn batch_members(&self, id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .batch_members
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Credentials already covered by a `ready` batch, for the
    /// `only_unprinted` filter.
    pub fn printed_credential_ids(&self) -> HashSet<Uuid> {
        let inner = self.inner.read();
        inner
            .batches
            .values()
            .filter(|b| b.status == BatchStatus::Ready)
            .flat_map(|b| {
                inner
                    .batch_members
                    .get(&b.id)
                    .into_iter()
                    .flatten()
                    .copied()
            })
            .collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(NotificationHub::default(), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayoutMeta, Rect, RequestStatus};
    use std::path::PathBuf;

    fn template(event_id: Uuid, is_default: bool) -> Template {
        Template {
            id: Uuid::new_v4(),
            event_id,
            name: "t".into(),
            width: 600,
            height: 900,
            background_path: PathBuf::from("bg.png"),
            layout_meta: LayoutMeta {
                fold_mm: 105.0,
                rect_photo: Rect::new(0, 0, 100, 100),
                rect_qr: Rect::new(200, 0, 100, 100),
                text_blocks: vec![],
            },
            is_default,
            version: 1,
        }
    }

    #[test]
    fn only_one_default_template_per_event() {
        let store = Store::default();
        let event_id = Uuid::new_v4();

        let a = store.save_template(template(event_id, true)).unwrap();
        let b = store.save_template(template(event_id, true)).unwrap();

        assert!(!store.template(a.id).unwrap().is_default);
        assert!(store.template(b.id).unwrap().is_default);
        assert_eq!(store.default_template(event_id).unwrap().id, b.id);
    }

    #[test]
    fn saving_an_existing_template_bumps_version() {
        let store = Store::default();
        let event_id = Uuid::new_v4();

        let t = store.save_template(template(event_id, true)).unwrap();
        assert_eq!(t.version, 1);
        let t2 = store.save_template(t.clone()).unwrap();
        assert_eq!(t2.version, 2);
        let t3 = store.save_template(t2).unwrap();
        assert_eq!(t3.version, 3);
    }

    #[test]
    fn default_template_cache_is_invalidated_on_write() {
        let store = Store::default();
        let event_id = Uuid::new_v4();

        let a = store.save_template(template(event_id, true)).unwrap();
        assert_eq!(store.default_template(event_id).unwrap().id, a.id);

        // a second default replaces the cached one immediately
        let b = store.save_template(template(event_id, true)).unwrap();
        assert_eq!(store.default_template(event_id).unwrap().id, b.id);
    }

    #[test]
    fn invalid_layout_geometry_is_rejected_at_write_time() {
        let store = Store::default();
        let event_id = Uuid::new_v4();

        let mut t = template(event_id, true);
        t.layout_meta.rect_qr = Rect::new(550, 0, 100, 100); // past the 600px canvas
        let id = t.id;

        assert!(store.save_template(t).is_err());
        assert!(store.template(id).is_none());
        assert!(store.default_template(event_id).is_none());
    }

    #[test]
    fn processed_counter_is_clamped_at_total() {
        let store = Store::default();
        let b = PrintBatch::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            crate::model::PrintFilters::for_event(Uuid::new_v4()),
            2,
        );
        let id = b.id;
        store.insert_batch(b);

        assert_eq!(store.increment_processed(id), Some(1));
        assert_eq!(store.increment_processed(id), Some(2));
        assert_eq!(store.increment_processed(id), Some(2));
    }

    #[tokio::test]
    async fn mass_invalidation_flips_and_signals() {
        let store = Store::default();
        let mut rx = store.hub().subscribe();

        let event_id = Uuid::new_v4();
        let req = AccreditationRequest {
            id: Uuid::new_v4(),
            event_id,
            employee_id: Uuid::new_v4(),
            zone_ids: vec![],
            status: RequestStatus::Approved,
        };
        let cred = Credential {
            id: Uuid::new_v4(),
            request_id: req.id,
            status: CredentialStatus::Ready,
            qr_code: "qr".into(),
            is_active: true,
            expires_at: None,
            created_at: Utc::now(),
        };
        let cred_id = cred.id;
        store.insert_request(req);
        store.insert_credential(cred);

        let when = Utc::now();
        assert_eq!(store.invalidate_event_credentials(event_id, when), 1);

        let c = store.credential(cred_id).unwrap();
        assert!(!c.is_active);
        assert_eq!(c.expires_at, Some(when));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.credential_id, cred_id);
        assert_eq!(change.signal, CredentialSignal::Suspended);

        // second pass is a no-op
        assert_eq!(store.invalidate_event_credentials(event_id, when), 0);
    }
}
