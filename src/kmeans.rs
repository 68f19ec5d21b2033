use super::{Color, MAX_ITERATIONS, MAX_SAMPLES, pixels::Pixel, pixels::sample};
use log::{debug, trace, warn};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use std::collections::HashSet;

/// Sample pixels probed when looking for the first center.
const SALIENCY_PROBES: usize = 1000;
/// Extra roulette weight for a fully saturated color (up to 6x).
const SATURATION_BOOST: f64 = 5.0;
/// Extra roulette weight for a pixel at the exact image center (up to 4x).
const CENTER_BOOST: f64 = 3.0;
/// Upper bound on re-draws of a single palette slot.
const MAX_DUPLICATE_RETRIES: usize = 32;

/// A palette entry. Its position in the palette is its cluster id.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Center {
    /// Current color of the cluster.
    pub color: Color,
    /// Pinned by the caller; refinement never moves it.
    pub locked: bool,
}

impl Center {
    /// A free center that follows the mean of its cluster.
    pub fn new(color: Color) -> Self {
        Center {
            color,
            locked: false,
        }
    }

    /// A center pinned to `color`.
    pub fn pinned(color: Color) -> Self {
        Center {
            color,
            locked: true,
        }
    }
}

/// Output of [`KMeans::quantize`].
#[derive(Clone, PartialEq, Debug)]
pub struct Quantization {
    /// Palette entries; pinned seed colors come first, in caller order.
    pub palette: Vec<Center>,
    /// Cluster id of every input pixel, parallel to the input sequence.
    pub assignments: Vec<usize>,
}

impl Quantization {
    /// Single black center, used when there is nothing to cluster.
    fn degenerate(pixel_count: usize) -> Self {
        Quantization {
            palette: vec![Center::new(Color::new(0, 0, 0))],
            assignments: vec![0; pixel_count],
        }
    }

    /// Palette colors without the lock flags.
    pub fn colors(&self) -> Vec<Color> {
        self.palette.iter().map(|c| c.color).collect()
    }
}

/// Weighted K-means++ quantizer with support for pinned seed colors.
#[derive(Clone, Debug)]
pub struct KMeans {
    /// The maximum number of Lloyd iterations. Zero is treated as one.
    pub max_iterations: usize,
    /// Largest number of pixels examined while choosing initial centers.
    pub max_samples: usize,
    /// Seed for the random generator; `None` draws from the thread rng.
    pub seed: Option<u64>,
}

impl Default for KMeans {
    fn default() -> Self {
        KMeans {
            max_iterations: MAX_ITERATIONS,
            max_samples: MAX_SAMPLES,
            seed: None,
        }
    }
}

impl KMeans {
    /// Reduces `pixels` to at most `k` colors.
    ///
    /// * `pixels` - Opaque pixels of the image, as produced by [`extract_pixels`](crate::extract_pixels).
    /// * `k` - Requested palette size. Clamped to the number of distinct colors.
    /// * `width`, `height` - Image dimensions, used to favor central pixels while seeding.
    /// * `seed_colors` - Colors pinned to the first palette slots.
    ///
    /// Never fails: an empty input yields a single black center, and a palette
    /// shorter than `k` is returned when seeding runs out of distinct colors.
    pub fn quantize(
        &self,
        pixels: &[Pixel],
        k: usize,
        width: u32,
        height: u32,
        seed_colors: &[Color],
    ) -> Quantization {
        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };
        self.quantize_with_rng(pixels, k, width, height, seed_colors, &mut *rng)
    }

    /// Same as [`quantize`](Self::quantize), drawing randomness from `rng`.
    pub fn quantize_with_rng<R: Rng + ?Sized>(
        &self,
        pixels: &[Pixel],
        k: usize,
        width: u32,
        height: u32,
        seed_colors: &[Color],
        rng: &mut R,
    ) -> Quantization {
        if pixels.is_empty() {
            return Quantization::degenerate(0);
        }

        let distinct = pixels.iter().map(|p| p.color).collect::<HashSet<_>>().len();
        let k = k.min(distinct);

        let samples = sample(pixels, self.max_samples);
        debug!(
            "quantizing {} pixels ({} sampled, {} distinct) into {} colors with {} pinned",
            pixels.len(),
            samples.len(),
            distinct,
            k,
            seed_colors.len().min(k)
        );

        let frame = Frame::new(width, height);
        let mut centers = initialize_centers(&samples, k, &frame, seed_colors, rng);
        if centers.is_empty() {
            return Quantization::degenerate(pixels.len());
        }

        let assignments = refine(pixels, &mut centers, self.max_iterations);
        Quantization {
            palette: centers,
            assignments,
        }
    }
}

/// Luminance-weighted squared distance between two colors.
#[inline]
pub fn color_distance(c1: &Color, c2: &Color) -> f64 {
    let dr = c1.r.abs_diff(c2.r) as f64;
    let dg = c1.g.abs_diff(c2.g) as f64;
    let db = c1.b.abs_diff(c2.b) as f64;
    0.30 * dr * dr + 0.59 * dg * dg + 0.11 * db * db
}

/// Chroma spread of a color, `0.0` for grays and `1.0` for pure hues.
#[inline]
fn saturation(c: &Color) -> f64 {
    let max = c.r.max(c.g).max(c.b);
    let min = c.r.min(c.g).min(c.b);
    (max - min) as f64 / 255.0
}

/// Image geometry used for the center bias.
struct Frame {
    cx: f64,
    cy: f64,
    max_distance: f64,
}

impl Frame {
    fn new(width: u32, height: u32) -> Self {
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        Frame {
            cx,
            cy,
            max_distance: (cx * cx + cy * cy).sqrt(),
        }
    }

    /// `1.0` at the image center falling to `0.0` at the corners.
    fn center_bias(&self, p: &Pixel) -> f64 {
        if self.max_distance <= 0.0 {
            return 1.0;
        }
        let dx = p.x as f64 - self.cx;
        let dy = p.y as f64 - self.cy;
        (1.0 - (dx * dx + dy * dy).sqrt() / self.max_distance).clamp(0.0, 1.0)
    }
}

/// Picks the vivid, central pixel that anchors the palette when nothing is pinned.
/// Ties keep the earliest pixel in scan order.
fn most_salient<'a>(samples: &'a [Pixel], frame: &Frame) -> &'a Pixel {
    let step = (samples.len() / SALIENCY_PROBES).max(1);
    let mut best = &samples[0];
    let mut best_score = -1.0;
    for p in samples.iter().step_by(step) {
        let score = saturation(&p.color) * frame.center_bias(p);
        if score > best_score {
            best_score = score;
            best = p;
        }
    }
    best
}

fn initialize_centers<R: Rng + ?Sized>(
    samples: &[Pixel],
    k: usize,
    frame: &Frame,
    seed_colors: &[Color],
    rng: &mut R,
) -> Vec<Center> {
    let mut centers: Vec<Center> = seed_colors
        .iter()
        .take(k)
        .map(|&c| Center::pinned(c))
        .collect();

    if centers.len() >= k || samples.is_empty() {
        return centers;
    }

    if centers.is_empty() {
        let first = most_salient(samples, frame);
        debug!("anchoring palette on {:?} at ({}, {})", first.color, first.x, first.y);
        centers.push(Center::new(first.color));
    }

    // Saliency multipliers do not depend on the centers chosen so far.
    let boosts: Vec<f64> = samples
        .iter()
        .map(|p| {
            (1.0 + SATURATION_BOOST * saturation(&p.color))
                * (1.0 + CENTER_BOOST * frame.center_bias(p))
        })
        .collect();

    let mut nearest: Vec<f64> = samples
        .iter()
        .map(|p| {
            centers
                .iter()
                .map(|c| color_distance(&p.color, &c.color))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    let mut weights = vec![0.0; samples.len()];
    let mut retries = 0;

    while centers.len() < k {
        let mut total = 0.0;
        for ((w, &d), &boost) in weights.iter_mut().zip(&nearest).zip(&boosts) {
            *w = d * boost;
            total += *w;
        }

        if total <= 0.0 {
            debug!(
                "no candidates left, stopping with {} of {} centers",
                centers.len(),
                k
            );
            break;
        }

        let Some(idx) = roulette(&weights, total, rng) else {
            break;
        };
        // Zero weight means the color is already a center; roulette skips those.
        debug_assert!(weights[idx] > 0.0);

        let color = samples[idx].color;
        if centers.iter().any(|c| c.color == color) {
            retries += 1;
            if retries > MAX_DUPLICATE_RETRIES {
                warn!(
                    "giving up after {} duplicate picks with {} of {} centers",
                    retries - 1,
                    centers.len(),
                    k
                );
                break;
            }
            continue;
        }

        trace!("center {} <- {:?}", centers.len(), color);
        retries = 0;
        centers.push(Center::new(color));
        for (d, p) in nearest.iter_mut().zip(samples) {
            *d = d.min(color_distance(&p.color, &color));
        }
    }

    centers
}

/// Roulette-wheel draw proportional to `weights`. Zero weights are never picked.
fn roulette<R: Rng + ?Sized>(weights: &[f64], total: f64, rng: &mut R) -> Option<usize> {
    let mut target = rng.random::<f64>() * total;
    let mut last = None;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        if target < w {
            return Some(i);
        }
        target -= w;
        last = Some(i);
    }
    // Rounding can leave a sliver past the last bucket.
    last
}

/// Lloyd's algorithm over the full pixel set. Locked centers never move.
/// Returns the cluster id of every pixel from the last assignment pass.
fn refine(pixels: &[Pixel], centers: &mut [Center], max_iterations: usize) -> Vec<usize> {
    let k = centers.len();
    let mut assignments = vec![usize::MAX; pixels.len()];

    // preallocate buffers for update_centers and reuse each iteration
    let mut sums_r = vec![0u64; k];
    let mut sums_g = vec![0u64; k];
    let mut sums_b = vec![0u64; k];
    let mut counts = vec![0u64; k];

    for iteration in 0..max_iterations.max(1) {
        let changed = assign_clusters(pixels, centers, &mut assignments);
        debug!("iteration {}: {} pixels changed cluster", iteration, changed);
        if changed == 0 {
            debug!("converged after {} iterations", iteration + 1);
            break;
        }
        update_centers(
            pixels,
            &assignments,
            centers,
            &mut sums_r,
            &mut sums_g,
            &mut sums_b,
            &mut counts,
        );
    }

    assignments
}

/// Assigns every pixel to its nearest center and returns how many moved.
fn assign_clusters(pixels: &[Pixel], centers: &[Center], assignments: &mut [usize]) -> usize {
    let new_assignments: Vec<usize> = pixels
        .par_iter()
        .map(|pixel| {
            let mut min_dist = f64::INFINITY;
            let mut best_cluster = 0;
            for (cluster_idx, center) in centers.iter().enumerate() {
                let dist = color_distance(&pixel.color, &center.color);
                if dist < min_dist {
                    min_dist = dist;
                    best_cluster = cluster_idx;
                }
            }
            best_cluster
        })
        .collect();

    let mut changed = 0;
    for (slot, new_assignment) in assignments.iter_mut().zip(new_assignments) {
        if *slot != new_assignment {
            *slot = new_assignment;
            changed += 1;
        }
    }

    changed
}

fn update_centers(
    pixels: &[Pixel],
    assignments: &[usize],
    centers: &mut [Center],
    sums_r: &mut [u64],
    sums_g: &mut [u64],
    sums_b: &mut [u64],
    counts: &mut [u64],
) {
    debug_assert_eq!(sums_r.len(), centers.len());
    debug_assert_eq!(counts.len(), centers.len());

    // clear accumulators
    for i in 0..centers.len() {
        sums_r[i] = 0;
        sums_g[i] = 0;
        sums_b[i] = 0;
        counts[i] = 0;
    }

    for (p, &cluster) in pixels.iter().zip(assignments) {
        counts[cluster] += 1;
        sums_r[cluster] += p.color.r as u64;
        sums_g[cluster] += p.color.g as u64;
        sums_b[cluster] += p.color.b as u64;
    }

    for (i, center) in centers.iter_mut().enumerate() {
        // empty clusters keep their previous color
        if center.locked || counts[i] == 0 {
            continue;
        }
        // integer average with rounding
        let half = counts[i] / 2;
        center.color = Color::new(
            ((sums_r[i] + half) / counts[i]) as u8,
            ((sums_g[i] + half) / counts[i]) as u8,
            ((sums_b[i] + half) / counts[i]) as u8,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(r: u8, g: u8, b: u8, x: u32, y: u32) -> Pixel {
        Pixel::new(Color::new(r, g, b), x, y)
    }

    #[test]
    fn distance_weights_green_most() {
        let black = Color::new(0, 0, 0);
        let red = color_distance(&black, &Color::new(10, 0, 0));
        let green = color_distance(&black, &Color::new(0, 10, 0));
        let blue = color_distance(&black, &Color::new(0, 0, 10));
        assert!((red - 30.0).abs() < 1e-9);
        assert!((green - 59.0).abs() < 1e-9);
        assert!((blue - 11.0).abs() < 1e-9);
        assert_eq!(color_distance(&Color::new(7, 8, 9), &Color::new(7, 8, 9)), 0.0);
    }

    #[test]
    fn saturation_range() {
        assert_eq!(saturation(&Color::new(128, 128, 128)), 0.0);
        assert_eq!(saturation(&Color::new(255, 0, 0)), 1.0);
    }

    #[test]
    fn center_bias_falls_off_to_corners() {
        let frame = Frame::new(10, 10);
        assert_eq!(frame.center_bias(&px(0, 0, 0, 5, 5)), 1.0);
        assert_eq!(frame.center_bias(&px(0, 0, 0, 0, 0)), 0.0);
        assert!(frame.center_bias(&px(0, 0, 0, 3, 5)) > frame.center_bias(&px(0, 0, 0, 1, 5)));
        assert_eq!(Frame::new(0, 0).center_bias(&px(0, 0, 0, 0, 0)), 1.0);
    }

    #[test]
    fn anchor_prefers_vivid_center() {
        let frame = Frame::new(3, 3);
        let samples = vec![
            px(255, 0, 0, 0, 0),
            px(120, 120, 120, 1, 1),
            px(0, 200, 0, 1, 1),
            px(0, 0, 255, 0, 2),
        ];
        assert_eq!(most_salient(&samples, &frame).color, Color::new(0, 200, 0));
    }

    #[test]
    fn roulette_skips_zero_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        let weights = [0.0, 2.0, 0.0, 1.0, 0.0];
        for _ in 0..200 {
            let idx = roulette(&weights, 3.0, &mut rng).unwrap();
            assert!(idx == 1 || idx == 3);
        }
        assert_eq!(roulette(&[0.0, 0.0], 0.0, &mut rng), None);
    }

    /// Always draws the largest value `random::<f64>()` can produce.
    struct TopRng;

    impl RngCore for TopRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0xFF);
        }
    }

    #[test]
    fn roulette_overshoot_takes_last_bucket() {
        // total exceeds the weight sum, so the draw lands past every bucket
        let weights = [1.0, 0.0, 2.0, 0.0];
        assert_eq!(roulette(&weights, 4.0, &mut TopRng), Some(2));
        assert_eq!(roulette(&weights, 3.0 + 1e-9, &mut TopRng), Some(2));
    }

    #[test]
    fn seeds_alone_fill_palette() {
        let mut rng = StdRng::seed_from_u64(1);
        let samples = vec![px(1, 2, 3, 0, 0)];
        let seeds = [Color::new(9, 9, 9), Color::new(8, 8, 8), Color::new(7, 7, 7)];
        let centers = initialize_centers(&samples, 2, &Frame::new(1, 1), &seeds, &mut rng);
        assert_eq!(
            centers,
            vec![Center::pinned(seeds[0]), Center::pinned(seeds[1])]
        );
    }

    #[test]
    fn seeding_stops_when_colors_run_out() {
        let mut rng = StdRng::seed_from_u64(3);
        let samples: Vec<Pixel> = (0..20).map(|x| px(40, 40, 40, x, 0)).collect();
        let centers = initialize_centers(&samples, 4, &Frame::new(20, 1), &[], &mut rng);
        assert_eq!(centers, vec![Center::new(Color::new(40, 40, 40))]);
    }

    #[test]
    fn seeding_never_duplicates() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<Pixel> = (0..300)
            .map(|i| px((i % 5 * 50) as u8, (i % 3 * 80) as u8, 10, i % 20, i / 20))
            .collect();
        let centers = initialize_centers(&samples, 15, &Frame::new(20, 15), &[], &mut rng);
        assert_eq!(centers.len(), 15);
        let unique: HashSet<Color> = centers.iter().map(|c| c.color).collect();
        assert_eq!(unique.len(), centers.len());
    }

    #[test]
    fn refine_keeps_locked_center() {
        let pixels = vec![
            px(10, 10, 10, 0, 0),
            px(20, 20, 20, 1, 0),
            px(250, 250, 250, 2, 0),
            px(240, 240, 240, 3, 0),
        ];
        let mut centers = vec![
            Center::pinned(Color::new(0, 0, 0)),
            Center::new(Color::new(200, 200, 200)),
        ];
        let assignments = refine(&pixels, &mut centers, 15);
        assert_eq!(assignments, vec![0, 0, 1, 1]);
        assert_eq!(centers[0], Center::pinned(Color::new(0, 0, 0)));
        assert_eq!(centers[1].color, Color::new(245, 245, 245));
    }

    #[test]
    fn empty_cluster_keeps_color() {
        let pixels = vec![px(10, 10, 10, 0, 0), px(12, 12, 12, 1, 0)];
        let mut centers = vec![
            Center::new(Color::new(0, 0, 0)),
            Center::new(Color::new(255, 0, 255)),
        ];
        let assignments = refine(&pixels, &mut centers, 15);
        assert_eq!(assignments, vec![0, 0]);
        assert_eq!(centers[0].color, Color::new(11, 11, 11));
        assert_eq!(centers[1].color, Color::new(255, 0, 255));
    }

    #[test]
    fn zero_iterations_still_assigns() {
        let pixels = vec![px(10, 10, 10, 0, 0), px(250, 250, 250, 1, 0)];
        let mut centers = vec![
            Center::new(Color::new(0, 0, 0)),
            Center::new(Color::new(255, 255, 255)),
        ];
        assert_eq!(refine(&pixels, &mut centers, 0), vec![0, 1]);
    }
}
