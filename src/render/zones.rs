//! Zone-box grid layout inside a template text-block rectangle.
//!
//! The single-zone case is a first-class contract, not a tuning detail: a
//! lone zone number gets a tighter margin and padding, a 6% font boost and
//! a heavier stroke so it visually fills the block. The constants below are
//! fixed values carried over from the original product.

use crate::model::Rect;
use crate::render::font::{fit_uniform, TextMeasurer};

const SINGLE_BOX_MARGIN: u32 = 8;
const SINGLE_NUM_PADDING: u32 = 2;
const SINGLE_FONT_BOOST: f32 = 1.06;
const SINGLE_RADIUS_FLOOR: u32 = 16;
const SINGLE_RADIUS_RATIO: f32 = 0.16;
const SINGLE_STROKE: u32 = 5;

const MULTI_BOX_MARGIN_FLOOR: u32 = 4;
const MULTI_NUM_PADDING: u32 = 6;
const MULTI_RADIUS_RATIO: f32 = 0.18;

#[derive(Clone, Debug)]
pub struct ZoneBoxLayout {
    /// Zone box rectangles, relative to the block rect, in label order.
    pub boxes: Vec<Rect>,
    pub box_margin: u32,
    pub num_padding: u32,
    /// Uniform size applied to every label.
    pub font_size: u32,
    pub corner_radius: u32,
    pub stroke_width: u32,
    pub allowed_text_w: u32,
    pub allowed_text_h: u32,
}

/// Lay out `labels.len()` zone boxes on a uniform grid inside a
/// `block_w x block_h` rectangle and fit a shared font size for the labels.
pub fn layout_zone_block(
    block_w: u32,
    block_h: u32,
    gap: u32,
    labels: &[String],
    measurer: &dyn TextMeasurer,
    radius_override: Option<u32>,
    default_stroke: u32,
) -> ZoneBoxLayout {
    let n = labels.len().max(1) as u32;

    let cols = (n as f64).sqrt().ceil() as u32;
    let rows = n.div_ceil(cols);

    let cell_w = block_w
        .saturating_sub((cols - 1) * gap)
        .checked_div(cols)
        .unwrap_or(1)
        .max(1);
    let cell_h = block_h
        .saturating_sub((rows - 1) * gap)
        .checked_div(rows)
        .unwrap_or(1)
        .max(1);

    let (box_margin, num_padding) = if n == 1 {
        (SINGLE_BOX_MARGIN, SINGLE_NUM_PADDING)
    } else {
        (MULTI_BOX_MARGIN_FLOOR.max(gap / 3), MULTI_NUM_PADDING)
    };

    let box_w = cell_w.saturating_sub(2 * box_margin).max(1);
    let box_h = cell_h.saturating_sub(2 * box_margin).max(1);

    let allowed_text_w = box_w.saturating_sub(2 * num_padding).max(1);
    let allowed_text_h = box_h.saturating_sub(2 * num_padding).max(1);

    let base = fit_uniform(measurer, labels, allowed_text_w as i32, allowed_text_h as i32);
    let font_size = if n == 1 {
        (((base as f32) * SINGLE_FONT_BOOST).floor() as u32).max(1)
    } else {
        base
    };

    let corner_radius = radius_override.unwrap_or_else(|| {
        if n == 1 {
            SINGLE_RADIUS_FLOOR.max(((box_h as f32) * SINGLE_RADIUS_RATIO).floor() as u32)
        } else {
            ((box_h as f32) * MULTI_RADIUS_RATIO).floor() as u32
        }
    });

    let stroke_width = if n == 1 { SINGLE_STROKE } else { default_stroke };

    let boxes = (0..n)
        .map(|i| {
            let col = i % cols;
            let row = i / cols;
            Rect {
                x: col * (cell_w + gap) + box_margin,
                y: row * (cell_h + gap) + box_margin,
                w: box_w,
                h: box_h,
            }
        })
        .collect();

    ZoneBoxLayout {
        boxes,
        box_margin,
        num_padding,
        font_size,
        corner_radius,
        stroke_width,
        allowed_text_w,
        allowed_text_h,
    }
}
