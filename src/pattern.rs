use super::{Color, Error, hex::to_hex, kmeans::Center, kmeans::Quantization, pixels::Pixel};
use std::fmt;

/// Narrowest chart accepted by [`stitch_grid`].
pub const MIN_STITCHES: u32 = 10;

/// Chart dimensions for an image reduced to `stitches_wide` stitches per row.
/// Rows follow the aspect ratio of the image.
pub fn stitch_grid(
    image_width: u32,
    image_height: u32,
    stitches_wide: u32,
) -> Result<(u32, u32), Error> {
    if stitches_wide < MIN_STITCHES {
        return Err(Error::PatternTooNarrow {
            stitches: stitches_wide,
            min: MIN_STITCHES,
        });
    }
    if image_width == 0 || image_height == 0 {
        return Err(Error::EmptyImage);
    }

    let ratio = image_height as f64 / image_width as f64;
    let rows = (stitches_wide as f64 * ratio).round().max(1.0) as u32;
    Ok((stitches_wide, rows))
}

/// A quantized image laid out as a stitch chart.
#[derive(Clone, PartialEq, Debug)]
pub struct Pattern {
    width: u32,
    height: u32,
    palette: Vec<Center>,
    cells: Vec<Option<usize>>,
}

/// One line of a chart legend.
#[derive(Clone, PartialEq, Debug)]
pub struct LegendEntry {
    /// 1-based color number as printed on the chart.
    pub number: usize,
    /// Yarn color.
    pub color: Color,
    /// `#RRGGBB` form of `color`.
    pub hex: String,
    /// Stitches worked in this color.
    pub stitches: usize,
}

impl fmt::Display for LegendEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No.{} ({})", self.number, self.hex)
    }
}

impl Pattern {
    /// Lays `quantization` out over a `width` x `height` grid. `pixels` must be
    /// the sequence the quantization was computed from; raster cells without a
    /// pixel (transparent samples) stay empty, as do cells whose cluster id
    /// is not a palette index.
    pub fn new(width: u32, height: u32, pixels: &[Pixel], quantization: Quantization) -> Self {
        debug_assert_eq!(pixels.len(), quantization.assignments.len());

        let colors = quantization.palette.len();
        let mut cells = vec![None; width as usize * height as usize];
        for (p, &cluster) in pixels.iter().zip(&quantization.assignments) {
            if p.x < width && p.y < height && cluster < colors {
                cells[p.y as usize * width as usize + p.x as usize] = Some(cluster);
            }
        }

        Pattern {
            width,
            height,
            palette: quantization.palette,
            cells,
        }
    }

    /// Stitches per row.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Palette in cluster-id order.
    pub fn palette(&self) -> &[Center] {
        &self.palette
    }

    /// Palette index of the stitch at `(x, y)`, `None` for empty or out of range cells.
    pub fn cell(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells[y as usize * self.width as usize + x as usize]
    }

    /// Yarn color of the stitch at `(x, y)`.
    pub fn color(&self, x: u32, y: u32) -> Option<Color> {
        self.cell(x, y).map(|i| self.palette[i].color)
    }

    /// Number of stitches per palette entry.
    pub fn stitch_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.palette.len()];
        for &cluster in self.cells.iter().flatten() {
            counts[cluster] += 1;
        }
        counts
    }

    /// Legend entries in palette order.
    pub fn legend(&self) -> Vec<LegendEntry> {
        self.palette
            .iter()
            .zip(self.stitch_counts())
            .enumerate()
            .map(|(i, (center, stitches))| LegendEntry {
                number: i + 1,
                color: center.color,
                hex: to_hex(center.color),
                stitches,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_keeps_aspect_ratio() {
        assert_eq!(stitch_grid(400, 300, 40).unwrap(), (40, 30));
        assert_eq!(stitch_grid(300, 100, 10).unwrap(), (10, 3));
        assert_eq!(stitch_grid(1000, 1, 10).unwrap(), (10, 1));
    }

    #[test]
    fn grid_rejects_narrow_patterns() {
        assert!(matches!(
            stitch_grid(400, 300, 9),
            Err(Error::PatternTooNarrow {
                stitches: 9,
                min: 10
            })
        ));
    }

    #[test]
    fn legend_counts_stitches() {
        let red = Color::new(255, 0, 0);
        let white = Color::new(255, 255, 255);
        let pixels = vec![
            Pixel::new(red, 0, 0),
            Pixel::new(white, 1, 0),
            Pixel::new(red, 1, 1),
        ];
        let quantization = Quantization {
            palette: vec![Center::pinned(red), Center::new(white)],
            assignments: vec![0, 1, 0],
        };
        let pattern = Pattern::new(2, 2, &pixels, quantization);

        assert_eq!(pattern.cell(0, 1), None);
        assert_eq!(pattern.color(1, 1), Some(red));
        assert_eq!(pattern.cell(2, 0), None);
        assert_eq!(pattern.stitch_counts(), vec![2, 1]);

        let legend = pattern.legend();
        assert_eq!(legend[0].to_string(), "No.1 (#FF0000)");
        assert_eq!(legend[1].hex, "#FFFFFF");
        assert_eq!(legend[1].stitches, 1);
    }

    #[test]
    fn unknown_cluster_ids_stay_empty() {
        let red = Color::new(255, 0, 0);
        let pixels = vec![Pixel::new(red, 0, 0), Pixel::new(red, 1, 0)];
        let quantization = Quantization {
            palette: vec![Center::new(red)],
            assignments: vec![0, 5],
        };
        let pattern = Pattern::new(2, 1, &pixels, quantization);

        assert_eq!(pattern.cell(0, 0), Some(0));
        assert_eq!(pattern.cell(1, 0), None);
        assert_eq!(pattern.color(1, 0), None);
        assert_eq!(pattern.stitch_counts(), vec![1]);
    }
}
