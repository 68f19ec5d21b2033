// Copyright 2017, Reizner Evgeniy <razrfalcon@gmail.com>.
// See the COPYRIGHT file at the top-level directory of this distribution.
// Licensed under the MIT license, see the LICENSE file or <http://opensource.org/licenses/MIT>

//! *knit-palette* turns a raster image into a knitting (or cross-stitch) chart:
//! a small palette of yarn colors and a mapping of every stitch onto it.
//!
//! The palette is built with a K-means++ variant whose seeding favors vivid
//! colors near the middle of the picture, where the subject of a chart usually
//! sits. Colors picked by the user can be pinned; they keep the lowest palette
//! indices and are never moved by refinement.
//!
//! ```no_run
//! use knit_palette::{Color, ColorFormat, KMeans};
//!
//! # fn main() -> Result<(), knit_palette::Error> {
//! # let rgba: Vec<u8> = Vec::new();
//! let pattern = knit_palette::get_pattern(
//!     &rgba,
//!     ColorFormat::Rgba,
//!     40,
//!     30,
//!     6,
//!     &[Color::new(200, 30, 30)],
//!     &KMeans::default(),
//! )?;
//!
//! for entry in pattern.legend() {
//!     println!("{entry}: {} stitches", entry.stitches);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod hex;
mod kmeans;
mod pattern;
mod pixels;

use std::str::FromStr;
use thiserror::Error;

pub use hex::{HexParseError, from_hex, parse_palette, to_hex};
pub use kmeans::{Center, KMeans, Quantization, color_distance};
pub use pattern::{LegendEntry, MIN_STITCHES, Pattern, stitch_grid};
pub use pixels::{Pixel, extract_pixels, sample};

pub use rgb::RGB8 as Color;

/// Samples with an alpha at or below this value are treated as absent.
pub const ALPHA_THRESHOLD: u8 = 128;
/// Default upper bound on the number of pixels examined while seeding.
pub const MAX_SAMPLES: usize = 10_000;
/// Default number of Lloyd iterations.
pub const MAX_ITERATIONS: usize = 15;

/// Represent a color format of an underlying image data.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ColorFormat {
    /// Red, Green, Blue color format.
    Rgb,
    /// Red, Green, Blue, Alpha color format.
    Rgba,
    /// Alpha, Red, Green, Blue color format.
    Argb,
    /// Blue, Green, Red color format.
    Bgr,
    /// Blue, Green, Red, Alpha color format.
    Bgra,
}

impl ColorFormat {
    /// Returns the number of channels in a color format.
    pub fn channels(&self) -> usize {
        match self {
            ColorFormat::Rgb => 3,
            ColorFormat::Rgba => 4,
            ColorFormat::Argb => 4,
            ColorFormat::Bgr => 3,
            ColorFormat::Bgra => 4,
        }
    }

    /// Splits the sample starting at `pos` into `(r, g, b, a)`.
    /// Formats without an alpha channel report full opacity.
    fn color_parts(&self, pixels: &[u8], pos: usize) -> (u8, u8, u8, u8) {
        match self {
            ColorFormat::Rgb => (pixels[pos], pixels[pos + 1], pixels[pos + 2], 255),
            ColorFormat::Rgba => (
                pixels[pos],
                pixels[pos + 1],
                pixels[pos + 2],
                pixels[pos + 3],
            ),
            ColorFormat::Argb => (
                pixels[pos + 1],
                pixels[pos + 2],
                pixels[pos + 3],
                pixels[pos],
            ),
            ColorFormat::Bgr => (pixels[pos + 2], pixels[pos + 1], pixels[pos], 255),
            ColorFormat::Bgra => (
                pixels[pos + 2],
                pixels[pos + 1],
                pixels[pos],
                pixels[pos + 3],
            ),
        }
    }
}

/// Represents an error that can occur while building a pattern.
#[derive(Debug, Error)]
pub enum Error {
    /// The raster buffer does not hold `width * height` samples of the given format.
    #[error("raster buffer holds {actual} bytes, expected {expected}")]
    InvalidRaster {
        /// Byte length implied by the dimensions and color format.
        expected: usize,
        /// Byte length actually supplied.
        actual: usize,
    },
    /// The source image has a zero dimension.
    #[error("image has no pixels")]
    EmptyImage,
    /// A hex color string could not be parsed.
    #[error(transparent)]
    Hex(#[from] HexParseError),
    /// The requested chart is narrower than [`MIN_STITCHES`].
    #[error("a pattern needs at least {min} stitches per row, got {stitches}")]
    PatternTooNarrow {
        /// Requested stitches per row.
        stitches: u32,
        /// Smallest accepted width.
        min: u32,
    },
}

/// Represents an error for invalid input when parsing a color format
#[derive(Debug, Error)]
#[error("invalid color format")]
pub struct ColorFormatParseError;

impl FromStr for ColorFormat {
    type Err = ColorFormatParseError;

    fn from_str(s: &str) -> Result<ColorFormat, Self::Err> {
        const VARIANTS: &[(&str, ColorFormat)] = &[
            ("rgb", ColorFormat::Rgb),
            ("rgba", ColorFormat::Rgba),
            ("argb", ColorFormat::Argb),
            ("bgr", ColorFormat::Bgr),
            ("bgra", ColorFormat::Bgra),
        ];

        VARIANTS
            .iter()
            .find(|(name, _)| s.eq_ignore_ascii_case(name))
            .map(|(_, fmt)| *fmt)
            .ok_or(ColorFormatParseError)
    }
}

/// Builds a stitch pattern from raw image data.
///
/// * `pixels` - A raw image data, row-major.
/// * `color_format` - Represent a color format of the image data.
/// * `width`, `height` - Image dimensions in pixels (one pixel per stitch).
/// * `max_colors` - Maximum number of yarn colors in the palette.
/// * `seed_colors` - Colors that must appear verbatim at the start of the palette.
/// * `kmeans` - Quantizer settings.
///
/// Samples with an alpha at or below [`ALPHA_THRESHOLD`] become empty cells of the pattern.
pub fn get_pattern(
    pixels: &[u8],
    color_format: ColorFormat,
    width: u32,
    height: u32,
    max_colors: usize,
    seed_colors: &[Color],
    kmeans: &KMeans,
) -> Result<Pattern, Error> {
    let extracted = extract_pixels(pixels, color_format, width, height)?;
    let quantization = kmeans.quantize(&extracted, max_colors, width, height, seed_colors);
    Ok(Pattern::new(width, height, &extracted, quantization))
}
