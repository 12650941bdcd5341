//! Greyscale extraction and local contrast enhancement.
//!
//! Both enhancement filters look at a `(2r+1)²` window around every pixel
//! and use **mirror** boundary handling: a coordinate that falls off the
//! grid is reflected back across the edge (`-1 → 0`, `-2 → 1`,
//! `len → len-1`, ...) rather than clipped or wrapped. The adaptive
//! threshold in [`crate::threshold`] deliberately uses a different
//! (zero-pad) policy.

use crate::grid::GreyGrid;
use crate::types::PipelineError;

/// Number of channels in an interleaved RGBA buffer.
pub const RGBA_CHANNELS: usize = 4;

/// Extract a greyscale grid from an interleaved RGBA buffer.
///
/// Micrographs arrive as grey images stored in RGBA, so the first channel
/// carries the intensity and the remaining three are ignored.
///
/// # Errors
///
/// Returns [`PipelineError::BufferSize`] if `pixels.len()` is not
/// `width * height * 4`.
pub fn to_greyscale(pixels: &[u8], width: usize, height: usize) -> Result<GreyGrid, PipelineError> {
    let expected = width
        .saturating_mul(height)
        .saturating_mul(RGBA_CHANNELS);
    if pixels.len() != expected {
        return Err(PipelineError::BufferSize {
            expected,
            actual: pixels.len(),
        });
    }
    let cells = pixels.chunks_exact(RGBA_CHANNELS).map(|px| px[0]).collect();
    GreyGrid::from_vec(width, height, cells).ok_or(PipelineError::BufferSize {
        expected,
        actual: pixels.len(),
    })
}

/// Reflect a possibly out-of-range coordinate back into `0..len`.
///
/// `a < 0` maps to `-(a+1)` and `a >= len` maps to `2·len - 1 - a`. The
/// reflection repeats until the coordinate lands inside the grid, so
/// windows wider than the grid itself still resolve.
#[must_use]
pub const fn mirror(mut a: isize, len: usize) -> usize {
    let len = len.cast_signed();
    if len <= 0 {
        return 0;
    }
    loop {
        if a < 0 {
            a = -(a + 1);
        } else if a >= len {
            a = 2 * len - 1 - a;
        } else {
            return a.cast_unsigned();
        }
    }
}

/// Precomputed mirror lookup for one axis.
///
/// Entry `i` holds the in-range coordinate for the logical coordinate
/// `i - radius`, covering `-radius..len + radius`.
pub(crate) fn mirror_table(len: usize, radius: usize) -> Vec<usize> {
    let r = radius.cast_signed();
    (-r..len.cast_signed() + r).map(|a| mirror(a, len)).collect()
}

/// A mirror-padded window summarised as a clip-limited histogram.
///
/// Each intensity bucket keeps at most `clip` samples; every further
/// sample of that intensity is counted in `clipped` instead. `sum` is the
/// plain sum over the whole window, clipped samples included.
pub(crate) struct ClippedWindow {
    pub histogram: [u32; 256],
    pub clipped: u32,
    pub sum: u64,
    pub size: u32,
}

impl ClippedWindow {
    pub(crate) fn gather(
        grid: &GreyGrid,
        rows: &[usize],
        cols: &[usize],
        (row, col): (usize, usize),
        radius: usize,
        clip: u32,
    ) -> Self {
        let span = 2 * radius + 1;
        let mut window = Self {
            histogram: [0; 256],
            clipped: 0,
            sum: 0,
            size: 0,
        };
        for &r in &rows[row..row + span] {
            for &c in &cols[col..col + span] {
                let value = grid[(r, c)];
                window.sum += u64::from(value);
                window.size += 1;
                let bucket = &mut window.histogram[usize::from(value)];
                if *bucket >= clip {
                    window.clipped += 1;
                } else {
                    *bucket += 1;
                }
            }
        }
        window
    }

    /// Fraction of the window that was clipped away.
    pub(crate) fn uniformity(&self) -> f64 {
        f64::from(self.clipped) / f64::from(self.size.max(1))
    }

    /// Plain mean over the full window.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn mean(&self) -> f64 {
        self.sum as f64 / f64::from(self.size.max(1))
    }
}

/// Floor of the mean intensity over the whole grid.
pub(crate) fn global_mean(grid: &GreyGrid) -> u8 {
    if grid.is_empty() {
        return 0;
    }
    let sum: u64 = grid.as_slice().iter().map(|&v| u64::from(v)).sum();
    let mean = sum / grid.len() as u64;
    u8::try_from(mean).unwrap_or(u8::MAX)
}

/// Rescale a rank in `0..=population-1` onto `0..=255`.
fn rank_to_intensity(rank: u32, population: u32) -> u8 {
    if population <= 1 {
        return 0;
    }
    let scaled = (u64::from(rank) * 255 + u64::from(population - 1) / 2) / u64::from(population - 1);
    u8::try_from(scaled).unwrap_or(u8::MAX)
}

/// Round and clamp a blended intensity onto `0..=255`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn saturate(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Local-rank contrast stretch.
///
/// Every output pixel is the rank of its input value within the
/// mirror-padded `(2r+1)²` window (the number of window samples strictly
/// darker than it), rescaled so that the darkest possible rank is 0 and
/// the brightest is 255. A radius of zero leaves the grid unchanged.
#[must_use = "returns the enhanced grid"]
pub fn adaptive_contrast(grid: &GreyGrid, radius: usize) -> GreyGrid {
    if radius == 0 || grid.is_empty() {
        return grid.clone();
    }
    let rows = mirror_table(grid.height(), radius);
    let cols = mirror_table(grid.width(), radius);
    let span = 2 * radius + 1;
    let population = u32::try_from(span * span).unwrap_or(u32::MAX);

    GreyGrid::from_fn(grid.width(), grid.height(), |row, col| {
        let centre = grid[(row, col)];
        let mut darker = 0u32;
        for &r in &rows[row..row + span] {
            for &c in &cols[col..col + span] {
                if grid[(r, c)] < centre {
                    darker += 1;
                }
            }
        }
        rank_to_intensity(darker, population)
    })
}

/// Contrast-limited adaptive enhancement.
///
/// Like [`adaptive_contrast`], but each intensity bucket contributes at
/// most `clip` samples to the local rank. The samples clipped away measure
/// how flat the window is: with `u = clipped / window`, the output is
/// `(1-u)·localRank + u·globalMean`, so flat regions are pulled towards
/// the image-wide mean instead of having their noise amplified.
///
/// A radius of zero leaves the grid unchanged. `clip` is treated as at
/// least 1.
#[must_use = "returns the enhanced grid"]
pub fn contrast_limited_adaptive(grid: &GreyGrid, radius: usize, clip: u32) -> GreyGrid {
    if radius == 0 || grid.is_empty() {
        return grid.clone();
    }
    let clip = clip.max(1);
    let rows = mirror_table(grid.height(), radius);
    let cols = mirror_table(grid.width(), radius);
    let global = f64::from(global_mean(grid));

    GreyGrid::from_fn(grid.width(), grid.height(), |row, col| {
        let centre = usize::from(grid[(row, col)]);
        let window = ClippedWindow::gather(grid, &rows, &cols, (row, col), radius, clip);
        let kept = window.size - window.clipped;
        let darker: u32 = window.histogram[..centre].iter().sum();
        let local = f64::from(rank_to_intensity(darker, kept));
        let u = window.uniformity();
        saturate((1.0 - u).mul_add(local, u * global))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> GreyGrid {
        GreyGrid::from_fn(width, height, |row, col| {
            u8::try_from((row * width + col) % 256).unwrap()
        })
    }

    #[test]
    fn to_greyscale_takes_first_channel() {
        let pixels = [10, 99, 99, 255, 20, 0, 0, 255, 30, 1, 2, 3, 40, 4, 5, 6];
        let grid = to_greyscale(&pixels, 2, 2).unwrap();
        assert_eq!(grid.as_slice(), &[10, 20, 30, 40]);
        assert_eq!(grid[(1, 0)], 30);
    }

    #[test]
    fn to_greyscale_rejects_wrong_length() {
        let err = to_greyscale(&[0; 15], 2, 2).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BufferSize {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn mirror_reflects_across_edges() {
        assert_eq!(mirror(-1, 5), 0);
        assert_eq!(mirror(-2, 5), 1);
        assert_eq!(mirror(5, 5), 4);
        assert_eq!(mirror(6, 5), 3);
        assert_eq!(mirror(3, 5), 3);
    }

    #[test]
    fn mirror_handles_windows_wider_than_grid() {
        // -4 → 3 → (2·2-1-3) = 0
        assert_eq!(mirror(-4, 2), 0);
        assert_eq!(mirror(7, 2), 0);
        for a in -20..20 {
            assert!(mirror(a, 3) < 3);
        }
    }

    #[test]
    fn mirror_table_covers_padding() {
        assert_eq!(mirror_table(3, 2), vec![1, 0, 0, 1, 2, 2, 1]);
    }

    #[test]
    fn adaptive_contrast_radius_zero_is_identity() {
        let grid = ramp(4, 3);
        assert_eq!(adaptive_contrast(&grid, 0), grid);
    }

    #[test]
    fn adaptive_contrast_flat_image_is_black() {
        let grid = GreyGrid::filled(6, 6, 77);
        let out = adaptive_contrast(&grid, 2);
        assert!(out.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn adaptive_contrast_bright_spot_saturates() {
        let mut grid = GreyGrid::filled(7, 7, 10);
        grid[(3, 3)] = 200;
        let out = adaptive_contrast(&grid, 1);
        assert_eq!(out[(3, 3)], 255);
        assert_eq!(out[(0, 0)], 0);
    }

    #[test]
    fn adaptive_contrast_follows_gradient() {
        let grid = ramp(5, 5);
        let out = adaptive_contrast(&grid, 1);
        assert!(out[(2, 0)] < out[(2, 4)]);
    }

    #[test]
    fn contrast_limited_radius_zero_is_identity() {
        let grid = ramp(4, 3);
        assert_eq!(contrast_limited_adaptive(&grid, 0, 3), grid);
    }

    #[test]
    fn contrast_limited_flat_image_collapses_to_global_mean() {
        // Every window is one intensity: all but `clip` samples are
        // clipped, so uniformity approaches 1 and the output approaches
        // the global mean.
        let grid = GreyGrid::filled(9, 9, 120);
        let out = contrast_limited_adaptive(&grid, 2, 1);
        // u = 24/25, local rank = 0 → 0.96 · 120 = 115.2
        assert!(out.as_slice().iter().all(|&v| v == 115));
    }

    #[test]
    fn contrast_limited_without_clipping_matches_rank() {
        // Distinct values in every window means nothing is clipped.
        let grid = GreyGrid::from_fn(3, 3, |row, col| u8::try_from(row * 3 + col).unwrap() * 10);
        let limited = contrast_limited_adaptive(&grid, 1, 100);
        assert_eq!(limited[(1, 1)], adaptive_contrast(&grid, 1)[(1, 1)]);
    }

    #[test]
    fn global_mean_floors() {
        let grid = GreyGrid::from_vec(2, 1, vec![1, 2]).unwrap();
        assert_eq!(global_mean(&grid), 1);
    }
}
