//! Anti-aliased rounded-rectangle layers.
//!
//! Rendering happens at a fixed supersampling factor and is downsampled
//! with Lanczos3, which smooths corner arcs and strokes at the final
//! resolution without an analytic rasterizer.

use image::{imageops, ImageBuffer, Rgba, RgbaImage};

const SUPERSAMPLE: u32 = 4;

#[derive(Clone, Copy, Debug)]
pub struct Shadow {
    pub offset: (i32, i32),
    pub blur: f32,
    pub color: Rgba<u8>,
}

/// Render a rounded rectangle layer: fill, border stroke and an optional
/// offset+blur shadow. The layer is transparent outside the shape and is
/// composited onto the credential canvas by the caller.
pub fn make_rounded_rect_layer(
    width: u32,
    height: u32,
    corner_radius: u32,
    fill: Rgba<u8>,
    border: Rgba<u8>,
    stroke_width: u32,
    shadow: Option<Shadow>,
) -> RgbaImage {
    let width = width.max(1);
    let height = height.max(1);

    let ss = SUPERSAMPLE;
    let (w_ss, h_ss) = (width * ss, height * ss);
    let r_ss = (corner_radius * ss).min(w_ss.min(h_ss) / 2);

    let mut layer: RgbaImage = ImageBuffer::from_pixel(w_ss, h_ss, Rgba([0, 0, 0, 0]));

    if let Some(sh) = shadow {
        let mut shadow_layer: RgbaImage = ImageBuffer::from_pixel(w_ss, h_ss, Rgba([0, 0, 0, 0]));
        let ox = sh.offset.0 * ss as i32;
        let oy = sh.offset.1 * ss as i32;
        fill_rounded_rect_clipped(&mut shadow_layer, ox, oy, w_ss, h_ss, r_ss, sh.color);
        let blurred = imageops::blur(&shadow_layer, sh.blur * ss as f32);
        overlay_alpha(&mut layer, &blurred, 0, 0);
    }

    if stroke_width > 0 {
        fill_rounded_rect(&mut layer, 0, 0, w_ss, h_ss, r_ss, border);
        let sw = stroke_width * ss;
        if w_ss > 2 * sw && h_ss > 2 * sw {
            fill_rounded_rect(
                &mut layer,
                sw,
                sw,
                w_ss - 2 * sw,
                h_ss - 2 * sw,
                r_ss.saturating_sub(sw),
                fill,
            );
        }
    } else {
        fill_rounded_rect(&mut layer, 0, 0, w_ss, h_ss, r_ss, fill);
    }

    imageops::resize(&layer, width, height, imageops::FilterType::Lanczos3)
}

/// Fill a rounded rectangle, corner membership decided per pixel against a
/// quarter-circle of the given radius.
pub fn fill_rounded_rect(
    img: &mut RgbaImage,
    x0: u32,
    y0: u32,
    w: u32,
    h: u32,
    r: u32,
    color: Rgba<u8>,
) {
    if r == 0 {
        for y in y0..(y0 + h).min(img.height()) {
            for x in x0..(x0 + w).min(img.width()) {
                img.put_pixel(x, y, color);
            }
        }
        return;
    }

    let (w_i, h_i) = (w as i32, h as i32);
    let r_i = r.min(w.min(h) / 2) as i32;
    for yy in 0..h_i {
        for xx in 0..w_i {
            let mut inside = true;
            if xx < r_i && yy < r_i {
                let dx = xx - (r_i - 1);
                let dy = yy - (r_i - 1);
                inside = dx * dx + dy * dy <= r_i * r_i;
            } else if xx >= w_i - r_i && yy < r_i {
                let dx = xx - (w_i - r_i);
                let dy = yy - (r_i - 1);
                inside = dx * dx + dy * dy <= r_i * r_i;
            } else if xx < r_i && yy >= h_i - r_i {
                let dx = xx - (r_i - 1);
                let dy = yy - (h_i - r_i);
                inside = dx * dx + dy * dy <= r_i * r_i;
            } else if xx >= w_i - r_i && yy >= h_i - r_i {
                let dx = xx - (w_i - r_i);
                let dy = yy - (h_i - r_i);
                inside = dx * dx + dy * dy <= r_i * r_i;
            }

            if inside {
                let px = x0 + xx as u32;
                let py = y0 + yy as u32;
                if px < img.width() && py < img.height() {
                    img.put_pixel(px, py, color);
                }
            }
        }
    }
}

/// Same fill, but with a signed origin so shadow offsets can push the shape
/// partially outside the layer.
fn fill_rounded_rect_clipped(
    img: &mut RgbaImage,
    x0: i32,
    y0: i32,
    w: u32,
    h: u32,
    r: u32,
    color: Rgba<u8>,
) {
    let (w_i, h_i) = (w as i32, h as i32);
    let r_i = r.min(w.min(h) / 2) as i32;
    for yy in 0..h_i {
        for xx in 0..w_i {
            let mut inside = true;
            if r_i > 0 {
                let near_left = xx < r_i;
                let near_right = xx >= w_i - r_i;
                let near_top = yy < r_i;
                let near_bottom = yy >= h_i - r_i;
                if (near_left || near_right) && (near_top || near_bottom) {
                    let cx = if near_left { r_i - 1 } else { w_i - r_i };
                    let cy = if near_top { r_i - 1 } else { h_i - r_i };
                    let dx = xx - cx;
                    let dy = yy - cy;
                    inside = dx * dx + dy * dy <= r_i * r_i;
                }
            }
            if !inside {
                continue;
            }
            let px = x0 + xx;
            let py = y0 + yy;
            if px >= 0 && py >= 0 && (px as u32) < img.width() && (py as u32) < img.height() {
                img.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// src-over composite of `over` onto `base` at (x, y).
pub fn overlay_alpha(base: &mut RgbaImage, over: &RgbaImage, x: u32, y: u32) {
    for oy in 0..over.height() {
        for ox in 0..over.width() {
            let p = over.get_pixel(ox, oy);
            let a = p.0[3] as f32 / 255.0;
            if a <= 0.0 {
                continue;
            }
            let bx = x + ox;
            let by = y + oy;
            if bx >= base.width() || by >= base.height() {
                continue;
            }
            let dst = base.get_pixel_mut(bx, by);
            let inv = 1.0 - a;
            dst.0[0] = (p.0[0] as f32 * a + dst.0[0] as f32 * inv) as u8;
            dst.0[1] = (p.0[1] as f32 * a + dst.0[1] as f32 * inv) as u8;
            dst.0[2] = (p.0[2] as f32 * a + dst.0[2] as f32 * inv) as u8;
            dst.0[3] = dst.0[3].max(p.0[3]);
        }
    }
}
