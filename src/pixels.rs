use super::{ALPHA_THRESHOLD, Color, ColorFormat, Error};
use std::borrow::Cow;

/// An opaque raster sample: its color and where it sits in the image.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pixel {
    /// Sample color.
    pub color: Color,
    /// Column, counted from the left edge.
    pub x: u32,
    /// Row, counted from the top edge.
    pub y: u32,
}

impl Pixel {
    /// Creates a pixel record.
    pub fn new(color: Color, x: u32, y: u32) -> Self {
        Pixel { color, x, y }
    }
}

/// Collects every sufficiently opaque sample of a raster in row-major order.
///
/// Samples whose alpha is at or below [`ALPHA_THRESHOLD`] are skipped, so the
/// result can be shorter than `width * height`. The order matches the scan
/// order of the raster, which lets an assignment index be traced back to its
/// coordinates.
pub fn extract_pixels(
    pixels: &[u8],
    color_format: ColorFormat,
    width: u32,
    height: u32,
) -> Result<Vec<Pixel>, Error> {
    let colors_count = color_format.channels();
    let expected = width as usize * height as usize * colors_count;
    if pixels.len() != expected {
        return Err(Error::InvalidRaster {
            expected,
            actual: pixels.len(),
        });
    }

    let mut extracted = Vec::with_capacity(width as usize * height as usize);
    for (i, pos) in (0..pixels.len()).step_by(colors_count).enumerate() {
        let (r, g, b, a) = color_format.color_parts(pixels, pos);
        if a > ALPHA_THRESHOLD {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            extracted.push(Pixel::new(Color::new(r, g, b), x, y));
        }
    }

    Ok(extracted)
}

/// Thins `pixels` down to at most `max_pixels` entries by taking every
/// `ceil(len / max_pixels)`-th one. Inputs that already fit are borrowed as-is.
pub fn sample(pixels: &[Pixel], max_pixels: usize) -> Cow<'_, [Pixel]> {
    let max_pixels = max_pixels.max(1);
    if pixels.len() <= max_pixels {
        return Cow::Borrowed(pixels);
    }

    let step = pixels.len().div_ceil(max_pixels);
    Cow::Owned(pixels.iter().step_by(step).copied().collect())
}
