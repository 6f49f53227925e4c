//! Font loading and size fitting.
//!
//! `find_max_font_size` returns the largest integer point size whose
//! rendered bounding box fits the given box. The probe is a binary search
//! over a monotone predicate: if a size overflows, every larger size does
//! too. Measurement goes through the `TextMeasurer` seam so the fitting
//! logic is independent of any particular font backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rusttype::{point, Font, Scale};

use super::RenderError;

static FONT_CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<Font<'static>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn load_font_cached(dir: &Path, name: &str) -> Result<Arc<Font<'static>>, RenderError> {
    let path = dir.join(name);
    if let Some(f) = FONT_CACHE.lock().get(&path) {
        return Ok(Arc::clone(f));
    }

    let bytes = std::fs::read(&path)
        .map_err(|e| RenderError::Font(format!("failed to read font {name}: {e}")))?;
    let f = Font::try_from_vec(bytes)
        .ok_or_else(|| RenderError::Font(format!("failed to parse font {name}")))?;

    let f = Arc::new(f);
    FONT_CACHE.lock().insert(path, Arc::clone(&f));
    Ok(f)
}

/// Width/height of a rendered string at a given pixel size.
pub trait TextMeasurer {
    fn measure(&self, text: &str, px: f32) -> (f32, f32);
}

impl TextMeasurer for Font<'static> {
    fn measure(&self, text: &str, px: f32) -> (f32, f32) {
        if text.is_empty() {
            return (0.0, 0.0);
        }
        let scale = Scale::uniform(px);
        let v_metrics = self.v_metrics(scale);
        let glyphs: Vec<_> = self.layout(text, scale, point(0.0, v_metrics.ascent)).collect();

        let mut max_x = 0.0f32;
        let mut min_y = f32::MAX;
        let mut max_y = f32::MIN;
        for g in &glyphs {
            if let Some(bb) = g.pixel_bounding_box() {
                max_x = max_x.max(bb.max.x as f32);
                min_y = min_y.min(bb.min.y as f32);
                max_y = max_y.max(bb.max.y as f32);
            }
        }
        if min_y > max_y {
            return (0.0, 0.0);
        }
        (max_x, max_y - min_y)
    }
}

/// Largest integer size at which `text` fits `max_w x max_h`. Degenerate
/// box dimensions are coerced to 1, and the result is floored at 1.
pub fn find_max_font_size(
    measurer: &dyn TextMeasurer,
    text: &str,
    max_w: i32,
    max_h: i32,
) -> u32 {
    let max_w = max_w.max(1) as f32;
    let max_h = max_h.max(1) as f32;

    let fits = |size: u32| -> bool {
        let (w, h) = measurer.measure(text, size as f32);
        w <= max_w && h <= max_h
    };

    // A glyph never renders taller than a few times its point size, so
    // 3x the box ceiling bounds the search space.
    let upper = ((max_w.max(max_h)) as u32).saturating_mul(3).max(1);

    let (mut lo, mut hi) = (1u32, upper);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo.max(1)
}

/// Uniform size for a set of labels: the minimum of the per-label fits, so
/// a three-digit code never renders larger than its neighbours.
pub fn fit_uniform<S: AsRef<str>>(
    measurer: &dyn TextMeasurer,
    labels: &[S],
    max_w: i32,
    max_h: i32,
) -> u32 {
    labels
        .iter()
        .map(|l| find_max_font_size(measurer, l.as_ref(), max_w, max_h))
        .min()
        .unwrap_or(1)
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeMeasurer;
    use super::*;

    #[test]
    fn result_is_always_positive() {
        let m = FakeMeasurer;
        assert!(find_max_font_size(&m, "12", 100, 40) >= 1);
        assert_eq!(find_max_font_size(&m, "a very long label indeed", 1, 1), 1);
    }

    #[test]
    fn degenerate_boxes_are_coerced_to_one() {
        let m = FakeMeasurer;
        let a = find_max_font_size(&m, "7", 0, -5);
        let b = find_max_font_size(&m, "7", 1, 1);
        assert_eq!(a, b);
        assert!(a >= 1);
    }

    #[test]
    fn size_is_monotone_non_increasing_in_label_length() {
        let m = FakeMeasurer;
        let mut prev = u32::MAX;
        for label in ["1", "12", "123", "1234", "12345"] {
            let s = find_max_font_size(&m, label, 200, 80);
            assert!(s <= prev, "{label}: {s} > {prev}");
            assert!(s >= 1);
            prev = s;
        }
    }

    #[test]
    fn fitted_size_fits_and_next_size_does_not() {
        let m = FakeMeasurer;
        let s = find_max_font_size(&m, "123", 90, 400);
        let (w, _) = m.measure("123", s as f32);
        assert!(w <= 90.0);
        let (w_next, _) = m.measure("123", (s + 1) as f32);
        assert!(w_next > 90.0);
    }

    #[test]
    fn uniform_fit_is_the_minimum_over_labels() {
        let m = FakeMeasurer;
        let labels = ["1", "42", "100"];
        let uniform = fit_uniform(&m, &labels, 120, 60);
        let worst = find_max_font_size(&m, "100", 120, 60);
        assert_eq!(uniform, worst);
    }
}
