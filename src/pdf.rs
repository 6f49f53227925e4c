//! Multi-page PDF assembly: one rendered credential per page.
//!
//! Pages keep the pixel dimensions of the rendered credential at print
//! resolution, so the PDF is ready for the print shop without rescaling.

use std::io::{BufWriter, Cursor};

use image::{DynamicImage, RgbaImage};
use printpdf::{
    ColorBits, ColorSpace, ImageTransform, ImageXObject, Mm, PdfDocument, Px,
};
use thiserror::Error;

const DPI: f32 = 300.0;
const PX_TO_MM: f32 = 25.4 / DPI;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("pdf has no pages")]
    Empty,
    #[error("pdf: {0}")]
    Build(String),
}

/// Paginate rendered credential images into a single PDF, preserving the
/// given page order.
pub fn assemble_pdf(title: &str, pages: &[RgbaImage]) -> Result<Vec<u8>, PdfError> {
    let first = pages.first().ok_or(PdfError::Empty)?;

    let page_mm = |img: &RgbaImage| {
        (
            Mm(img.width() as f32 * PX_TO_MM),
            Mm(img.height() as f32 * PX_TO_MM),
        )
    };

    let (w0, h0) = page_mm(first);
    let (doc, page1, layer1) = PdfDocument::new(title, w0, h0, "credentials");

    for (i, img) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(page1).get_layer(layer1)
        } else {
            let (w, h) = page_mm(img);
            let (page, layer) = doc.add_page(w, h, "credentials");
            doc.get_page(page).get_layer(layer)
        };

        let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
        let xobject = ImageXObject {
            width: Px(img.width() as usize),
            height: Px(img.height() as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: rgb.into_raw(),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        };
        printpdf::Image::from(xobject).add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm(0.0)),
                translate_y: Some(Mm(0.0)),
                dpi: Some(DPI),
                ..Default::default()
            },
        );
    }

    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut writer = BufWriter::new(cursor);
        doc.save(&mut writer).map_err(|e| PdfError::Build(e.to_string()))?;
    }
    Ok(buf)
}

/// Count page objects in a serialized PDF. Good enough for assertions: page
/// dictionaries are written uncompressed by the writer.
pub fn count_pages(bytes: &[u8]) -> usize {
    let needle = b"/Type /Page";
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= bytes.len() {
        if &bytes[i..i + needle.len()] == needle {
            // skip "/Type /Pages" (the page tree node)
            let next = bytes.get(i + needle.len());
            if next != Some(&b's') {
                count += 1;
            }
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}
