//! Capability-typed attachment resolution.
//!
//! The surrounding application owns photos and documents; the pipeline only
//! needs to resolve "the photo for employee X" to bytes. Handlers are
//! registered per attachment kind at startup, replacing the source's
//! runtime string-to-class mapping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    EmployeePhoto,
    ProviderLogo,
    Document,
}

pub trait AttachmentSource: Send + Sync {
    /// Resolve the attachment owned by `owner`, if one exists.
    fn resolve(&self, owner: Uuid) -> Option<Vec<u8>>;
}

/// Directory-backed source: `{root}/{owner}.{ext}`.
pub struct DirSource {
    root: PathBuf,
    ext: &'static str,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>, ext: &'static str) -> Self {
        Self {
            root: root.into(),
            ext,
        }
    }
}

impl AttachmentSource for DirSource {
    fn resolve(&self, owner: Uuid) -> Option<Vec<u8>> {
        std::fs::read(self.root.join(format!("{owner}.{}", self.ext))).ok()
    }
}

/// In-memory source for attachments uploaded as base64 or `data:` URIs,
/// decoded lazily on resolve.
#[derive(Default)]
pub struct InlineSource {
    entries: parking_lot::RwLock<HashMap<Uuid, String>>,
}

impl InlineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, owner: Uuid, encoded: impl Into<String>) {
        self.entries.write().insert(owner, encoded.into());
    }

    pub fn remove(&self, owner: Uuid) {
        self.entries.write().remove(&owner);
    }
}

impl AttachmentSource for InlineSource {
    fn resolve(&self, owner: Uuid) -> Option<Vec<u8>> {
        let encoded = self.entries.read().get(&owner).cloned()?;
        crate::util::b64_decode(&encoded)
    }
}

#[derive(Clone, Default)]
pub struct AttachmentRegistry {
    sources: HashMap<AttachmentKind, Arc<dyn AttachmentSource>>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: AttachmentKind, source: Arc<dyn AttachmentSource>) {
        self.sources.insert(kind, source);
    }

    pub fn resolve(&self, kind: AttachmentKind, owner: Uuid) -> Option<Vec<u8>> {
        self.sources.get(&kind)?.resolve(owner)
    }
}
