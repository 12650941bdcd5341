//! Lookup-table pixel thinning.

use crate::grid::BinaryGrid;
use crate::lookup::{LookupTable, neighbour_configuration};

/// Thin the foreground to a one-pixel-wide skeleton.
///
/// Each pass visits every foreground pixel in row-major order and deletes
/// it in place when `table` marks its current neighbour configuration as
/// deletable, so later pixels in the same pass see earlier deletions.
/// Passes repeat until one deletes nothing. The result is therefore a
/// fixed point: thinning it again returns it unchanged.
#[must_use = "returns the thinned grid"]
pub fn thin_pixel(grid: &BinaryGrid, table: &LookupTable) -> BinaryGrid {
    let mut current = grid.clone();
    let positions: Vec<_> = grid.foreground().collect();
    let mut pass = 0usize;
    loop {
        pass += 1;
        let mut deleted = 0usize;
        for &pos in &positions {
            if current[pos] && table.is_deletable(neighbour_configuration(&current, pos)) {
                current[pos] = false;
                deleted += 1;
            }
        }
        log::trace!("thinning pass {pass}: deleted {deleted} pixels");
        if deleted == 0 {
            break;
        }
    }
    log::debug!(
        "thinned {} pixels to {} in {pass} passes",
        grid.count_foreground(),
        current.count_foreground()
    );
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::lookup_table;

    fn rect(width: usize, height: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> BinaryGrid {
        BinaryGrid::from_fn(width, height, |row, col| rows.contains(&row) && cols.contains(&col))
    }

    fn is_one_pixel_wide(grid: &BinaryGrid) -> bool {
        // No 2×2 block of foreground anywhere.
        (0..grid.height().saturating_sub(1)).all(|row| {
            (0..grid.width().saturating_sub(1)).all(|col| {
                !(grid[(row, col)] && grid[(row + 1, col)] && grid[(row, col + 1)] && grid[(row + 1, col + 1)])
            })
        })
    }

    #[test]
    fn thin_line_is_unchanged() {
        let line = rect(12, 5, 2..3, 1..11);
        assert_eq!(thin_pixel(&line, lookup_table()), line);
    }

    #[test]
    fn diagonal_line_is_unchanged() {
        let diagonal = BinaryGrid::from_fn(8, 8, |row, col| row == col);
        assert_eq!(thin_pixel(&diagonal, lookup_table()), diagonal);
    }

    #[test]
    fn single_pixel_survives() {
        let mut grid = BinaryGrid::new(3, 3);
        grid[(1, 1)] = true;
        assert_eq!(thin_pixel(&grid, lookup_table()), grid);
    }

    #[test]
    fn thick_bar_becomes_one_pixel_wide() {
        let bar = rect(20, 9, 2..7, 2..18);
        let skeleton = thin_pixel(&bar, lookup_table());
        assert!(skeleton.count_foreground() > 0);
        assert!(skeleton.is_subset_of(&bar));
        assert!(is_one_pixel_wide(&skeleton));
    }

    #[test]
    fn thinning_preserves_component_count() {
        use crate::label::label_components;
        use crate::morphology::StructuringElement;

        let mut grid = rect(30, 12, 1..5, 1..12);
        for row in 6..11 {
            for col in 15..28 {
                grid[(row, col)] = true;
            }
        }
        let skeleton = thin_pixel(&grid, lookup_table());
        assert_eq!(label_components(&skeleton, StructuringElement::Square).1.len(), 2);
    }

    #[test]
    fn thinning_is_idempotent() {
        let blob = BinaryGrid::from_fn(25, 25, |row, col| {
            let (dr, dc) = (row.abs_diff(12), col.abs_diff(12));
            dr * dr + dc * dc <= 81 || (row == 12 && col > 3)
        });
        let table = lookup_table();
        let once = thin_pixel(&blob, table);
        assert_eq!(thin_pixel(&once, table), once);
    }

    #[test]
    fn empty_grid_stays_empty() {
        let grid = BinaryGrid::new(6, 4);
        assert_eq!(thin_pixel(&grid, lookup_table()), grid);
    }
}
