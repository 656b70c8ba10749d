use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use once_cell::sync::Lazy;

use crate::error::BrowserError;
use crate::types::Position;

pub const MARKER_RADIUS: u32 = 10;

static MARKER: Lazy<RgbaImage> = Lazy::new(|| {
    let size = MARKER_RADIUS * 2;
    let r = MARKER_RADIUS as f64;
    RgbaImage::from_fn(size, size, |x, y| {
        let dx = f64::from(x) + 0.5 - r;
        let dy = f64::from(y) + 0.5 - r;
        if dx * dx + dy * dy <= r * r {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
});

/// The red dot drawn where the cursor is. Built once per process.
pub fn marker() -> &'static RgbaImage {
    &MARKER
}

/// Draw the cursor marker centred on `at` over a PNG screenshot.
pub fn composite(png: &[u8], at: Position) -> Result<Vec<u8>, BrowserError> {
    let mut base = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| BrowserError::Image(e.to_string()))?
        .to_rgba8();

    let radius = i64::from(MARKER_RADIUS);
    image::imageops::overlay(
        &mut base,
        marker(),
        i64::from(at.x) - radius,
        i64::from(at.y) - radius,
    );

    let mut out = Vec::with_capacity(png.len());
    image::DynamicImage::ImageRgba8(base)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| BrowserError::Image(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}
