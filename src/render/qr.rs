//! QR raster for the credential verification URL.

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgba, RgbaImage};
use qrcode::{EcLevel, QrCode};

use super::RenderError;

const QUIET_ZONE_MODULES: u32 = 2;
const DARK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const LIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Encode `text` at the highest error-correction level and render it as a
/// square RGBA image of exactly `size` pixels, so the raster never spills
/// past the template's QR rect.
pub fn render_qr(text: &str, size: u32) -> Result<RgbaImage, RenderError> {
    let size = size.max(1);
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::H)
        .map_err(|e| RenderError::Qr(format!("encode failed: {e}")))?;

    let width_modules = code.width() as u32;
    let total_modules = width_modules + 2 * QUIET_ZONE_MODULES;
    let module_px = (size / total_modules).max(1);
    let actual_size = total_modules * module_px;

    let mut img: RgbaImage = ImageBuffer::from_pixel(actual_size, actual_size, LIGHT);

    for y in 0..width_modules {
        for x in 0..width_modules {
            if matches!(code[(x as usize, y as usize)], qrcode::Color::Dark) {
                let px0 = (x + QUIET_ZONE_MODULES) * module_px;
                let py0 = (y + QUIET_ZONE_MODULES) * module_px;
                for py in py0..(py0 + module_px) {
                    for px in px0..(px0 + module_px) {
                        img.put_pixel(px, py, DARK);
                    }
                }
            }
        }
    }

    if actual_size != size {
        let dyn_img = DynamicImage::ImageRgba8(img);
        Ok(dyn_img.resize_exact(size, size, FilterType::Lanczos3).to_rgba8())
    } else {
        Ok(img)
    }
}
