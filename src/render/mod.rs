//! Credential raster rendering: font fitting, rounded-box layers, zone-grid
//! layout and the final composition of photo + QR + text blocks.

pub mod box_layer;
pub mod credential;
pub mod font;
pub mod qr;
pub mod zones;

use image::RgbaImage;
use thiserror::Error;

use crate::model::{RenderInput, Template};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("background: {0}")]
    Background(String),
    #[error("photo: {0}")]
    Photo(String),
    #[error("qr: {0}")]
    Qr(String),
    #[error("font: {0}")]
    Font(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid color: {0}")]
    Color(String),
    #[error("data: {0}")]
    Data(String),
}

/// Seam between the batch worker and the raster pipeline. The production
/// implementation is [`credential::CredentialRenderer`]; tests inject stubs.
pub trait RenderCredential: Send + Sync {
    fn render(&self, template: &Template, input: &RenderInput) -> Result<RgbaImage, RenderError>;
}
