//! Final credential composition: background, photo, QR and text/zone blocks.

use std::path::PathBuf;

use image::{imageops, ImageBuffer, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use crate::config::Config;
use crate::model::{Alignment, RenderInput, Template, TextBlock};
use crate::render::box_layer::{make_rounded_rect_layer, overlay_alpha};
use crate::render::font::{load_font_cached, TextMeasurer};
use crate::render::zones::layout_zone_block;
use crate::render::{qr, RenderCredential, RenderError};

pub const DEFAULT_FONT: &str = "Inter-SemiBold.ttf";

pub struct CredentialRenderer {
    fonts_dir: PathBuf,
    verify_base: String,
    default_stroke_width: u32,
}

impl CredentialRenderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            fonts_dir: cfg.fonts_dir.clone(),
            verify_base: cfg.verify_base.trim_end_matches('/').to_string(),
            default_stroke_width: cfg.default_stroke_width,
        }
    }

    /// Compose one credential. Any failing step aborts this credential with
    /// a message; the caller decides what that means for the batch.
    pub fn render(&self, template: &Template, input: &RenderInput) -> Result<RgbaImage, RenderError> {
        let mut canvas = self.load_background(template)?;

        // photo, cover-fit into rect_photo
        let rect = template.layout_meta.rect_photo;
        let photo_bytes = input
            .photo
            .as_deref()
            .ok_or_else(|| RenderError::Photo("no photo attached".into()))?;
        let photo = image::load_from_memory(photo_bytes)
            .map_err(|e| RenderError::Photo(format!("invalid photo: {e}")))?;
        let mut photo = photo.to_rgba8();
        let cropped = crop_to_aspect_center(&mut photo, rect.w, rect.h);
        let fitted = imageops::resize(&cropped, rect.w, rect.h, imageops::FilterType::Lanczos3);
        overlay_alpha(&mut canvas, &fitted, rect.x, rect.y);

        // QR with the verification URL, centered in rect_qr
        let rect = template.layout_meta.rect_qr;
        let url = format!("{}/{}", self.verify_base, input.qr_code);
        let side = rect.w.min(rect.h);
        let qr_img = qr::render_qr(&url, side)?;
        let qx = rect.x + rect.w.saturating_sub(qr_img.width()) / 2;
        let qy = rect.y + rect.h.saturating_sub(qr_img.height()) / 2;
        overlay_alpha(&mut canvas, &qr_img, qx, qy);

        for block in &template.layout_meta.text_blocks {
            match block {
                TextBlock::Text(b) => {
                    let value = input
                        .fields
                        .get(&b.field)
                        .ok_or_else(|| RenderError::MissingField(b.field.clone()))?;
                    let font =
                        load_font_cached(&self.fonts_dir, b.font.as_deref().unwrap_or(DEFAULT_FONT))?;
                    let color = hex_color(&b.color)?;
                    let px = b.font_size as f32;
                    let (text_w, _) = font.as_ref().measure(value, px);
                    let x = match b.alignment {
                        Alignment::Left => b.rect.x as f32,
                        Alignment::Center => b.rect.x as f32 + (b.rect.w as f32 - text_w) / 2.0,
                        Alignment::Right => b.rect.x as f32 + b.rect.w as f32 - text_w,
                    };
                    draw_text(&mut canvas, &font, px, x.round() as i32, b.rect.y as i32, color, value);
                }
                TextBlock::Zones(b) => {
                    if input.zone_codes.is_empty() {
                        continue;
                    }
                    let font =
                        load_font_cached(&self.fonts_dir, b.font.as_deref().unwrap_or(DEFAULT_FONT))?;
                    let fill = hex_color(&b.fill)?;
                    let border = hex_color(&b.border)?;

                    let labels: Vec<String> =
                        input.zone_codes.iter().map(|c| c.to_string()).collect();
                    let layout = layout_zone_block(
                        b.rect.w,
                        b.rect.h,
                        b.gap,
                        &labels,
                        font.as_ref(),
                        b.corner_radius,
                        b.stroke_width.unwrap_or(self.default_stroke_width),
                    );

                    for (label, zbox) in labels.iter().zip(&layout.boxes) {
                        // zone boxes are flat: fill + stroke, never a shadow
                        let layer = make_rounded_rect_layer(
                            zbox.w,
                            zbox.h,
                            layout.corner_radius,
                            fill,
                            border,
                            layout.stroke_width,
                            None,
                        );
                        overlay_alpha(&mut canvas, &layer, b.rect.x + zbox.x, b.rect.y + zbox.y);

                        let px = layout.font_size as f32;
                        let (tw, th) = font.as_ref().measure(label, px);
                        let tx = b.rect.x as f32 + zbox.x as f32 + (zbox.w as f32 - tw) / 2.0;
                        let ty = b.rect.y as f32 + zbox.y as f32 + (zbox.h as f32 - th) / 2.0;
                        draw_text(
                            &mut canvas,
                            &font,
                            px,
                            tx.round() as i32,
                            ty.round() as i32,
                            border,
                            label,
                        );
                    }
                }
            }
        }

        Ok(canvas)
    }

    fn load_background(&self, template: &Template) -> Result<RgbaImage, RenderError> {
        let img = image::open(&template.background_path).map_err(|e| {
            RenderError::Background(format!(
                "failed to load {}: {e}",
                template.background_path.display()
            ))
        })?;
        let mut bg = img.to_rgba8();
        if bg.width() != template.width || bg.height() != template.height {
            bg = imageops::resize(
                &bg,
                template.width,
                template.height,
                imageops::FilterType::Lanczos3,
            );
        }
        Ok(bg)
    }
}

impl RenderCredential for CredentialRenderer {
    fn render(&self, template: &Template, input: &RenderInput) -> Result<RgbaImage, RenderError> {
        CredentialRenderer::render(self, template, input)
    }
}

pub fn hex_color(s: &str) -> Result<Rgba<u8>, RenderError> {
    let s = s.trim().trim_start_matches('#');
    if s.len() != 6 {
        return Err(RenderError::Color(s.to_string()));
    }
    let b = hex::decode(s).map_err(|_| RenderError::Color(s.to_string()))?;
    Ok(Rgba([b[0], b[1], b[2], 255]))
}

/// Center-crop to the target aspect ratio, ImageOps.fit style.
pub fn crop_to_aspect_center(img: &mut RgbaImage, target_w: u32, target_h: u32) -> RgbaImage {
    let iw = img.width();
    let ih = img.height();
    if iw == 0 || ih == 0 {
        return ImageBuffer::from_pixel(target_w.max(1), target_h.max(1), Rgba([0, 0, 0, 0]));
    }

    let target_aspect = target_w as f32 / target_h as f32;
    let in_aspect = iw as f32 / ih as f32;

    let (crop_w, crop_h) = if in_aspect > target_aspect {
        // too wide
        let ch = ih;
        let cw = (ch as f32 * target_aspect).round().max(1.0) as u32;
        (cw.min(iw), ch)
    } else {
        // too tall
        let cw = iw;
        let ch = (cw as f32 / target_aspect).round().max(1.0) as u32;
        (cw, ch.min(ih))
    };

    let left = (iw - crop_w) / 2;
    let top = (ih - crop_h) / 2;
    imageops::crop(img, left, top, crop_w, crop_h).to_image()
}

/// Glyph-by-glyph alpha-blended text draw. `y` is the top of the text box;
/// rusttype positions from the baseline, so the ascent is added here.
pub fn draw_text(
    img: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    x: i32,
    y: i32,
    color: Rgba<u8>,
    text: &str,
) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let mut caret_x = x as f32;
    let baseline_y = y as f32 + v_metrics.ascent;

    for ch in text.chars() {
        let glyph = font.glyph(ch).scaled(scale).positioned(point(caret_x, baseline_y));
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                let px_i = gx as i32 + bb.min.x;
                let py_i = gy as i32 + bb.min.y;
                if px_i < 0 || py_i < 0 {
                    return;
                }
                let (px_u, py_u) = (px_i as u32, py_i as u32);
                if px_u >= img.width() || py_u >= img.height() {
                    return;
                }
                let a = (v * 255.0) as u8;
                if a == 0 {
                    return;
                }
                let dst = img.get_pixel_mut(px_u, py_u);
                let sa = a as f32 / 255.0;
                let inv = 1.0 - sa;
                dst.0[0] = (color.0[0] as f32 * sa + dst.0[0] as f32 * inv) as u8;
                dst.0[1] = (color.0[1] as f32 * sa + dst.0[1] as f32 * inv) as u8;
                dst.0[2] = (color.0[2] as f32 * sa + dst.0[2] as f32 * inv) as u8;
                dst.0[3] = 255;
            });
        }
        caret_x += glyph.unpositioned().h_metrics().advance_width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_color_parses_and_rejects() {
        assert_eq!(hex_color("#FF0000").unwrap().0, [255, 0, 0, 255]);
        assert_eq!(hex_color("00ff00").unwrap().0, [0, 255, 0, 255]);
        assert!(hex_color("#123").is_err());
        assert!(hex_color("zzzzzz").is_err());
    }

    #[test]
    fn crop_keeps_target_aspect_for_wide_input() {
        let mut img: RgbaImage = ImageBuffer::from_pixel(400, 100, Rgba([9, 9, 9, 255]));
        let out = crop_to_aspect_center(&mut img, 100, 100);
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn crop_keeps_target_aspect_for_tall_input() {
        let mut img: RgbaImage = ImageBuffer::from_pixel(100, 400, Rgba([9, 9, 9, 255]));
        let out = crop_to_aspect_center(&mut img, 200, 100);
        // 100 wide input, 2:1 target -> 100x50 crop
        assert_eq!((out.width(), out.height()), (100, 50));
    }

    #[test]
    fn missing_photo_aborts_with_photo_error() {
        let cfg = Config {
            storage_dir: "unused".into(),
            fonts_dir: "unused".into(),
            verify_base: "https://v.local".into(),
            render_parallelism: 1,
            default_stroke_width: 3,
            template_cache_ttl: std::time::Duration::from_secs(1),
        };
        let renderer = CredentialRenderer::new(&cfg);

        // background missing is hit first unless the file exists; use a real
        // background so the photo step is the one under test
        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("bg.png");
        let bg: RgbaImage = ImageBuffer::from_pixel(200, 300, Rgba([255, 255, 255, 255]));
        bg.save(&bg_path).unwrap();

        let template = crate::model::Template {
            id: uuid::Uuid::new_v4(),
            event_id: uuid::Uuid::new_v4(),
            name: "t".into(),
            width: 200,
            height: 300,
            background_path: bg_path,
            layout_meta: crate::model::LayoutMeta {
                fold_mm: 0.0,
                rect_photo: crate::model::Rect::new(10, 10, 60, 80),
                rect_qr: crate::model::Rect::new(120, 10, 60, 60),
                text_blocks: vec![],
            },
            is_default: true,
            version: 1,
        };
        let input = RenderInput {
            credential_id: uuid::Uuid::new_v4(),
            qr_code: "abc".into(),
            photo: None,
            fields: Default::default(),
            zone_codes: vec![],
        };

        match CredentialRenderer::render(&renderer, &template, &input) {
            Err(RenderError::Photo(_)) => {}
            other => panic!("expected photo error, got {other:?}"),
        }
    }

    #[test]
    fn photo_and_qr_compose_without_text_blocks() {
        let cfg = Config {
            storage_dir: "unused".into(),
            fonts_dir: "unused".into(),
            verify_base: "https://v.local/".into(),
            render_parallelism: 1,
            default_stroke_width: 3,
            template_cache_ttl: std::time::Duration::from_secs(1),
        };
        let renderer = CredentialRenderer::new(&cfg);

        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("bg.png");
        let bg: RgbaImage = ImageBuffer::from_pixel(200, 300, Rgba([250, 250, 250, 255]));
        bg.save(&bg_path).unwrap();

        let mut photo_png = Vec::new();
        let photo: RgbaImage = ImageBuffer::from_pixel(90, 90, Rgba([40, 90, 160, 255]));
        photo
            .write_to(
                &mut std::io::Cursor::new(&mut photo_png),
                image::ImageFormat::Png,
            )
            .unwrap();

        let template = crate::model::Template {
            id: uuid::Uuid::new_v4(),
            event_id: uuid::Uuid::new_v4(),
            name: "t".into(),
            width: 200,
            height: 300,
            background_path: bg_path,
            layout_meta: crate::model::LayoutMeta {
                fold_mm: 0.0,
                rect_photo: crate::model::Rect::new(10, 10, 60, 80),
                rect_qr: crate::model::Rect::new(120, 200, 64, 64),
                text_blocks: vec![],
            },
            is_default: true,
            version: 1,
        };
        let input = RenderInput {
            credential_id: uuid::Uuid::new_v4(),
            qr_code: "abc".into(),
            photo: Some(photo_png),
            fields: Default::default(),
            zone_codes: vec![],
        };

        let out = CredentialRenderer::render(&renderer, &template, &input).unwrap();
        assert_eq!((out.width(), out.height()), (200, 300));
        // photo region took the photo color
        let p = out.get_pixel(40, 50);
        assert!(p.0[2] > p.0[0], "photo pixel should be blue-ish: {:?}", p.0);
    }
}
