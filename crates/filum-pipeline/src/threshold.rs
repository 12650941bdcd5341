//! Greyscale to binary conversion.
//!
//! [`threshold_adaptive`] uses **zero-pad** boundary handling: window
//! samples that fall off the grid are simply excluded, so edge pixels are
//! compared against the mean of a smaller window. The contrast-limited
//! variant shares the mirror-padded window of [`crate::intensity`].

use crate::grid::{BinaryGrid, GreyGrid};
use crate::intensity::{ClippedWindow, global_mean, mirror_table};

/// Global band threshold: foreground iff `min <= value <= max`.
#[must_use = "returns the binary mask"]
pub fn threshold_range(grid: &GreyGrid, min: u8, max: u8) -> BinaryGrid {
    grid.map(|v| (min..=max).contains(&v))
}

/// Summed-area table with a one-cell zero border on the top and left.
struct IntegralImage {
    stride: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(grid: &GreyGrid) -> Self {
        let stride = grid.width() + 1;
        let mut sums = vec![0u64; stride * (grid.height() + 1)];
        for row in 0..grid.height() {
            let mut running = 0u64;
            for col in 0..grid.width() {
                running += u64::from(grid[(row, col)]);
                sums[(row + 1) * stride + col + 1] = sums[row * stride + col + 1] + running;
            }
        }
        Self { stride, sums }
    }

    /// Sum over rows `r0..r1` and cols `c0..c1` (half-open).
    fn sum(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> u64 {
        let at = |r: usize, c: usize| self.sums[r * self.stride + c];
        at(r1, c1) + at(r0, c0) - at(r0, c1) - at(r1, c0)
    }
}

/// Local-mean threshold.
///
/// Foreground iff `value > mean + offset`, where `mean` is the arithmetic
/// mean of the in-bounds pixels of the `(2r+1)²` window centred on the
/// pixel. The comparison is carried out exactly in integers
/// (`value · count > sum + offset · count`).
#[must_use = "returns the binary mask"]
pub fn threshold_adaptive(grid: &GreyGrid, radius: usize, offset: i32) -> BinaryGrid {
    let integral = IntegralImage::new(grid);
    let (width, height) = (grid.width(), grid.height());

    BinaryGrid::from_fn(width, height, |row, col| {
        let r0 = row.saturating_sub(radius);
        let r1 = (row + radius + 1).min(height);
        let c0 = col.saturating_sub(radius);
        let c1 = (col + radius + 1).min(width);
        let count = i64::try_from((r1 - r0) * (c1 - c0)).unwrap_or(i64::MAX);
        let sum = i64::try_from(integral.sum(r0, r1, c0, c1)).unwrap_or(i64::MAX);
        let value = i64::from(grid[(row, col)]);
        value * count > sum + i64::from(offset) * count
    })
}

/// Contrast-limited local-mean threshold.
///
/// Foreground iff `value > (1-u)·localMean + u·globalMean + offset`. The
/// window is mirror-padded, `localMean` is the plain mean over it and
/// `u` is the fraction of window samples that exceeded the per-intensity
/// `clip` limit. Flat windows therefore fall back on the image-wide mean
/// `floor(sum / (h·w))`.
#[must_use = "returns the binary mask"]
pub fn threshold_limited_adaptive(grid: &GreyGrid, radius: usize, offset: i32, clip: u32) -> BinaryGrid {
    if grid.is_empty() {
        return BinaryGrid::new(grid.width(), grid.height());
    }
    let rows = mirror_table(grid.height(), radius);
    let cols = mirror_table(grid.width(), radius);
    let global = f64::from(global_mean(grid));
    let offset = f64::from(offset);

    BinaryGrid::from_fn(grid.width(), grid.height(), |row, col| {
        let window = ClippedWindow::gather(grid, &rows, &cols, (row, col), radius, clip);
        let u = window.uniformity();
        let cutoff = (1.0 - u).mul_add(window.mean(), u.mul_add(global, offset));
        f64::from(grid[(row, col)]) > cutoff
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive() {
        let grid = GreyGrid::from_vec(5, 1, vec![9, 10, 15, 20, 21]).unwrap();
        let mask = threshold_range(&grid, 10, 20);
        assert_eq!(mask.as_slice(), &[false, true, true, true, false]);
    }

    #[test]
    fn range_with_min_above_max_is_empty() {
        let grid = GreyGrid::filled(3, 3, 50);
        assert_eq!(threshold_range(&grid, 60, 40).count_foreground(), 0);
    }

    #[test]
    fn integral_image_matches_brute_force() {
        let grid = GreyGrid::from_fn(5, 4, |row, col| u8::try_from(row * 7 + col * 3).unwrap());
        let integral = IntegralImage::new(&grid);
        let brute: u64 = (1..3)
            .flat_map(|r| (2..5).map(move |c| (r, c)))
            .map(|p| u64::from(grid[p]))
            .sum();
        assert_eq!(integral.sum(1, 3, 2, 5), brute);
    }

    #[test]
    fn adaptive_flat_image_is_background() {
        let grid = GreyGrid::filled(8, 8, 100);
        assert_eq!(threshold_adaptive(&grid, 2, 0).count_foreground(), 0);
    }

    #[test]
    fn adaptive_picks_out_bright_line() {
        let grid = GreyGrid::from_fn(21, 21, |row, _| if row == 10 { 200 } else { 20 });
        let mask = threshold_adaptive(&grid, 4, 30);
        for col in 0..21 {
            assert!(mask[(10, col)]);
            assert!(!mask[(9, col)]);
            assert!(!mask[(0, col)]);
        }
    }

    #[test]
    fn adaptive_excludes_out_of_bounds_samples() {
        // Corner window holds only the 2×2 in-bounds block: mean = 25.
        let grid = GreyGrid::from_vec(2, 2, vec![40, 20, 20, 20]).unwrap();
        assert!(threshold_adaptive(&grid, 1, 14)[(0, 0)]);
        assert!(!threshold_adaptive(&grid, 1, 15)[(0, 0)]);
    }

    #[test]
    fn adaptive_negative_offset_admits_flat_regions() {
        let grid = GreyGrid::filled(4, 4, 100);
        assert_eq!(threshold_adaptive(&grid, 1, -1).count_foreground(), 16);
    }

    #[test]
    fn limited_adaptive_flat_image_is_background() {
        let grid = GreyGrid::filled(6, 6, 90);
        assert_eq!(threshold_limited_adaptive(&grid, 2, 1, 3).count_foreground(), 0);
    }

    #[test]
    fn limited_adaptive_picks_out_bright_spot() {
        let mut grid = GreyGrid::filled(9, 9, 10);
        grid[(4, 4)] = 250;
        let mask = threshold_limited_adaptive(&grid, 2, 20, 3);
        assert!(mask[(4, 4)]);
        assert_eq!(mask.count_foreground(), 1);
    }
}
