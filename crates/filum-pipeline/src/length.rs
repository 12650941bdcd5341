//! Skeleton length estimation.

use std::f64::consts::SQRT_2;

use crate::grid::BinaryGrid;
use crate::morphology::SQUARE;

/// Pixels per millimetre at the imaging system's native resolution.
pub const DEFAULT_CALIBRATION: f64 = 3.06;

/// Estimate the physical length of a single-curve skeleton.
///
/// Walks the skeleton depth-first over 8-neighbours from its first
/// foreground pixel (row-major). Each step onto an unvisited pixel adds
/// `√2` when diagonal and `1` when orthogonal, except that an orthogonal
/// step is not counted when the pixel it lands on has a foreground
/// neighbour across the step (above/below for a horizontal step,
/// left/right for a vertical one): that corner is already covered by a
/// diagonal step.
///
/// The pixel total is divided by `scale` (the display downsampling factor)
/// and by `calibration` (pixels per unit). Only the component containing
/// the first foreground pixel is measured; on branching skeletons the
/// result follows whichever branches the walk reaches. An empty skeleton
/// has length zero.
#[must_use]
pub fn measure_length(skeleton: &BinaryGrid, scale: f64, calibration: f64) -> f64 {
    let Some(start) = skeleton.first_foreground() else {
        return 0.0;
    };
    let mut visited = BinaryGrid::new(skeleton.width(), skeleton.height());
    let mut stack = vec![start];
    visited[start] = true;
    let mut pixels = 0.0;

    while let Some(pos) = stack.pop() {
        for &(d_row, d_col) in &SQUARE {
            let Some(next) = skeleton.offset(pos, (d_row, d_col)) else {
                continue;
            };
            if !skeleton[next] || visited[next] {
                continue;
            }
            if d_row != 0 && d_col != 0 {
                pixels += SQRT_2;
            } else {
                let across = if d_row == 0 { [(-1, 0), (1, 0)] } else { [(0, -1), (0, 1)] };
                let bridged = across
                    .iter()
                    .any(|&o| skeleton.offset(next, o).is_some_and(|n| skeleton[n]));
                if !bridged {
                    pixels += 1.0;
                }
            }
            visited[next] = true;
            stack.push(next);
        }
    }

    log::debug!("skeleton walk covered {pixels:.2} pixel units");
    pixels / scale / calibration
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn straight_line_of_ten() {
        let line = BinaryGrid::from_fn(14, 3, |row, col| row == 1 && (2..12).contains(&col));
        assert_close(measure_length(&line, 1.0, 1.0), 9.0);
    }

    #[test]
    fn vertical_line() {
        let line = BinaryGrid::from_fn(3, 8, |_, col| col == 1);
        assert_close(measure_length(&line, 1.0, 1.0), 7.0);
    }

    #[test]
    fn diagonal_line() {
        let line = BinaryGrid::from_fn(6, 6, |row, col| row == col);
        assert_close(measure_length(&line, 1.0, 1.0), 5.0 * SQRT_2);
    }

    #[test]
    fn scale_and_calibration_divide() {
        let line = BinaryGrid::from_fn(11, 1, |_, _| true);
        assert_close(measure_length(&line, 0.5, 2.0), 10.0);
        assert_close(
            measure_length(&line, 1.0, DEFAULT_CALIBRATION),
            10.0 / DEFAULT_CALIBRATION,
        );
    }

    #[test]
    fn empty_skeleton_is_zero() {
        assert_close(measure_length(&BinaryGrid::new(5, 5), 0.5, DEFAULT_CALIBRATION), 0.0);
    }

    #[test]
    fn only_first_component_is_measured() {
        let mut grid = BinaryGrid::new(10, 5);
        for col in 0..4 {
            grid[(0, col)] = true;
        }
        for col in 0..10 {
            grid[(4, col)] = true;
        }
        assert_close(measure_length(&grid, 1.0, 1.0), 3.0);
    }

    #[test]
    fn staircase_corner_is_not_double_counted() {
        // (0,0) (0,1)
        //       (1,1) (1,2)
        let mut grid = BinaryGrid::new(3, 2);
        for pos in [(0, 0), (0, 1), (1, 1), (1, 2)] {
            grid[pos] = true;
        }
        // (0,0)→(0,1) is skipped since (1,1) sits below (0,1); the
        // diagonal (0,0)→(1,1) and the step (1,1)→(1,2) are counted.
        assert_close(measure_length(&grid, 1.0, 1.0), 1.0 + SQRT_2);
    }
}
