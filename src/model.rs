//! Data model shared by the renderer and the batch pipeline.
//!
//! The interesting part is `TextBlock`: a serde tagged union where generic
//! text blocks structurally require `font_size` and `alignment` while zone
//! blocks compute both dynamically and therefore omit them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenericTextBlock {
    pub id: String,
    pub rect: Rect,
    /// Field of the credential data rendered into this block.
    pub field: String,
    pub font_size: u32,
    pub alignment: Alignment,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default = "default_text_color")]
    pub color: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneBlock {
    pub id: String,
    pub rect: Rect,
    #[serde(default = "default_zone_gap")]
    pub gap: u32,
    #[serde(default)]
    pub corner_radius: Option<u32>,
    #[serde(default)]
    pub stroke_width: Option<u32>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default = "default_zone_fill")]
    pub fill: String,
    #[serde(default = "default_text_color")]
    pub border: String,
}

fn default_text_color() -> String {
    "#000000".to_string()
}

fn default_zone_fill() -> String {
    "#FFFFFF".to_string()
}

fn default_zone_gap() -> u32 {
    12
}

/// Template text block. Tag-dispatched so each variant carries its own
/// required-field set instead of conditionally-required fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TextBlock {
    Text(GenericTextBlock),
    Zones(ZoneBlock),
}

impl TextBlock {
    pub fn id(&self) -> &str {
        match self {
            TextBlock::Text(b) => &b.id,
            TextBlock::Zones(b) => &b.id,
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            TextBlock::Text(b) => b.rect,
            TextBlock::Zones(b) => b.rect,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayoutMeta {
    /// Fold line position in millimeters, for duplex print templates.
    pub fold_mm: f32,
    pub rect_photo: Rect,
    pub rect_qr: Rect,
    #[serde(default)]
    pub text_blocks: Vec<TextBlock>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    /// Canvas size of the background image, in pixels.
    pub width: u32,
    pub height: u32,
    pub background_path: PathBuf,
    pub layout_meta: LayoutMeta,
    pub is_default: bool,
    pub version: u32,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template canvas must be non-zero, got {0}x{1}")]
    EmptyCanvas(u32, u32),
    #[error("block '{0}' has a zero-sized rect")]
    EmptyBlock(String),
    #[error("block '{id}' exceeds the canvas ({x},{y} {w}x{h})")]
    OutOfBounds { id: String, x: u32, y: u32, w: u32, h: u32 },
    #[error("duplicate block id '{0}'")]
    DuplicateBlock(String),
    #[error("layout meta: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Template {
    /// Schema pass over the layout: every block variant already carries its
    /// own required fields (serde rejects a generic block without
    /// `font_size`/`alignment`), so only geometry is left to check here.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.width == 0 || self.height == 0 {
            return Err(TemplateError::EmptyCanvas(self.width, self.height));
        }

        let mut seen = std::collections::HashSet::new();
        let mut rects: Vec<(&str, Rect)> = vec![
            ("rect_photo", self.layout_meta.rect_photo),
            ("rect_qr", self.layout_meta.rect_qr),
        ];
        for block in &self.layout_meta.text_blocks {
            if !seen.insert(block.id().to_string()) {
                return Err(TemplateError::DuplicateBlock(block.id().to_string()));
            }
            rects.push((block.id(), block.rect()));
        }

        for (id, r) in rects {
            if r.w == 0 || r.h == 0 {
                return Err(TemplateError::EmptyBlock(id.to_string()));
            }
            // checked: a corner near u32::MAX must not wrap past the canvas
            let past_right = r.x.checked_add(r.w).map_or(true, |end| end > self.width);
            let past_bottom = r.y.checked_add(r.h).map_or(true, |end| end > self.height);
            if past_right || past_bottom {
                return Err(TemplateError::OutOfBounds {
                    id: id.to_string(),
                    x: r.x,
                    y: r.y,
                    w: r.w,
                    h: r.h,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Area {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub area_id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub full_name: String,
    pub position: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// A named access area with a numeric code printed on the credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub code: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccreditationRequest {
    pub id: Uuid,
    pub event_id: Uuid,
    pub employee_id: Uuid,
    pub zone_ids: Vec<Uuid>,
    pub status: RequestStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Pending,
    Generating,
    Ready,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub request_id: Uuid,
    pub status: CredentialStatus,
    pub qr_code: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Processing,
    Ready,
    Failed,
    Archived,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Processing => "processing",
            BatchStatus::Ready => "ready",
            BatchStatus::Failed => "failed",
            BatchStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// Filter a batch is built from. Persisted verbatim as the snapshot so a
/// retry re-derives its credential set reproducibly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintFilters {
    pub event_id: Uuid,
    #[serde(default)]
    pub area_ids: Vec<Uuid>,
    #[serde(default)]
    pub provider_ids: Vec<Uuid>,
    #[serde(default = "default_only_unprinted")]
    pub only_unprinted: bool,
}

fn default_only_unprinted() -> bool {
    true
}

impl PrintFilters {
    pub fn for_event(event_id: Uuid) -> Self {
        Self {
            event_id,
            area_ids: Vec::new(),
            provider_ids: Vec::new(),
            only_unprinted: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrintBatch {
    pub id: Uuid,
    pub event_id: Uuid,
    pub generated_by: Uuid,
    pub status: BatchStatus,
    pub filters_snapshot: PrintFilters,
    pub total_credentials: u32,
    pub processed_credentials: u32,
    pub pdf_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PrintBatch {
    pub fn new(event_id: Uuid, generated_by: Uuid, filters: PrintFilters, total: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            generated_by,
            status: BatchStatus::Queued,
            filters_snapshot: filters,
            total_credentials: total,
            processed_credentials: 0,
            pdf_path: None,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn progress_percent(&self) -> u8 {
        if self.total_credentials == 0 {
            return 0;
        }
        (self.processed_credentials * 100 / self.total_credentials) as u8
    }
}

/// Everything the renderer needs for one credential, resolved from the
/// store by the worker before rendering starts.
#[derive(Clone, Debug)]
pub struct RenderInput {
    pub credential_id: Uuid,
    pub qr_code: String,
    /// PNG/JPEG bytes of the subject photo.
    pub photo: Option<Vec<u8>>,
    /// Field name -> literal value for generic text blocks.
    pub fields: BTreeMap<String, String>,
    /// Access-zone codes, in catalog order.
    pub zone_codes: Vec<u16>,
}
