//! Flat row-major pixel grids shared by every engine stage.
//!
//! A [`Grid`] owns one contiguous buffer of `height * width` cells indexed
//! by `row * width + col`. Stages never mutate their input: each transform
//! allocates a fresh grid for its output, so no two grids ever share rows.
//!
//! Three instantiations cover the whole engine:
//!
//! - [`GreyGrid`]: intensities in `0..=255`.
//! - [`BinaryGrid`]: foreground (`true`) / background (`false`).
//! - [`LabelGrid`]: `0` for background, `1..=N` for component identity.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Greyscale intensity grid.
pub type GreyGrid = Grid<u8>;

/// Binary foreground/background grid.
pub type BinaryGrid = Grid<bool>;

/// Connected-component label grid (`0` = background).
pub type LabelGrid = Grid<u32>;

/// A `(row, col)` pixel position.
pub type Position = (usize, usize);

/// A `(Δrow, Δcol)` neighbour offset.
pub type Offset = (isize, isize);

/// Rectangular 2D grid stored as a single row-major buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Copy + Default> Grid<T> {
    /// Create a grid with every cell set to `T::default()`.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::default())
    }
}

impl<T: Copy> Grid<T> {
    /// Create a grid with every cell set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width * height],
        }
    }

    /// Create a grid by evaluating `f(row, col)` for every cell in
    /// row-major order.
    #[must_use]
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                cells.push(f(row, col));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Wrap an existing row-major buffer.
    ///
    /// Returns `None` if `cells.len() != width * height`.
    #[must_use]
    pub fn from_vec(width: usize, height: usize, cells: Vec<T>) -> Option<Self> {
        (cells.len() == width * height).then_some(Self {
            width,
            height,
            cells,
        })
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells (`width * height`).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the grid has no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether `other` has the same width and height.
    #[must_use]
    pub const fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// The underlying row-major buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    /// Apply a neighbour offset to `(row, col)`.
    ///
    /// Returns `None` when the shifted position falls outside the grid.
    /// This is the zero-pad/skip boundary policy used by morphology,
    /// labelling, thinning and length measurement.
    #[must_use]
    pub fn offset(&self, (row, col): Position, (d_row, d_col): Offset) -> Option<Position> {
        let r = row.checked_add_signed(d_row)?;
        let c = col.checked_add_signed(d_col)?;
        (r < self.height && c < self.width).then_some((r, c))
    }

    /// Build a new grid by mapping every cell through `f`.
    #[must_use]
    pub fn map<U>(&self, f: impl FnMut(T) -> U) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            cells: self.cells.iter().copied().map(f).collect(),
        }
    }

    /// Iterate over `((row, col), value)` in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, T)> + '_ {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &v)| ((i / width, i % width), v))
    }
}

impl BinaryGrid {
    /// Swap foreground and background.
    #[must_use = "returns the inverted grid"]
    pub fn invert(&self) -> Self {
        self.map(|v| !v)
    }

    /// Number of foreground cells.
    #[must_use]
    pub fn count_foreground(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }

    /// Positions of all foreground cells in row-major order.
    pub fn foreground(&self) -> impl Iterator<Item = Position> + '_ {
        self.enumerate().filter_map(|(p, v)| v.then_some(p))
    }

    /// The first foreground cell in row-major order.
    #[must_use]
    pub fn first_foreground(&self) -> Option<Position> {
        self.foreground().next()
    }

    /// Whether every foreground cell of `self` is also foreground in
    /// `other`. Grids of different shapes are never subsets.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.same_shape(other)
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(&a, &b)| !a || b)
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    fn index(&self, (row, col): Position) -> &T {
        debug_assert!(row < self.height && col < self.width);
        &self.cells[row * self.width + col]
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    fn index_mut(&mut self, (row, col): Position) -> &mut T {
        debug_assert!(row < self.height && col < self.width);
        &mut self.cells[row * self.width + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_default_filled() {
        let grid = GreyGrid::new(3, 2);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
        assert!(grid.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn from_fn_is_row_major() {
        let grid = Grid::from_fn(3, 2, |row, col| row * 10 + col);
        assert_eq!(grid.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(grid[(1, 2)], 12);
    }

    #[test]
    fn from_vec_rejects_length_mismatch() {
        assert!(Grid::from_vec(2, 2, vec![0u8; 3]).is_none());
        assert!(Grid::from_vec(2, 2, vec![0u8; 4]).is_some());
    }

    #[test]
    fn offset_skips_out_of_bounds() {
        let grid = BinaryGrid::new(4, 3);
        assert_eq!(grid.offset((0, 0), (-1, 0)), None);
        assert_eq!(grid.offset((0, 0), (0, -1)), None);
        assert_eq!(grid.offset((2, 3), (1, 0)), None);
        assert_eq!(grid.offset((2, 3), (0, 1)), None);
        assert_eq!(grid.offset((1, 1), (1, 1)), Some((2, 2)));
    }

    #[test]
    fn invert_allocates_fresh_grid() {
        let mut grid = BinaryGrid::new(2, 2);
        grid[(0, 1)] = true;
        let inverted = grid.invert();
        grid[(1, 1)] = true;
        assert!(!inverted[(0, 1)]);
        assert!(inverted[(1, 1)]);
        assert_eq!(inverted.count_foreground(), 3);
    }

    #[test]
    fn first_foreground_is_row_major() {
        let mut grid = BinaryGrid::new(5, 5);
        grid[(3, 0)] = true;
        grid[(2, 4)] = true;
        assert_eq!(grid.first_foreground(), Some((2, 4)));
        assert_eq!(BinaryGrid::new(5, 5).first_foreground(), None);
    }

    #[test]
    fn subset_relation() {
        let mut small = BinaryGrid::new(3, 3);
        small[(1, 1)] = true;
        let mut big = small.clone();
        big[(0, 0)] = true;
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert!(!small.is_subset_of(&BinaryGrid::new(4, 3)));
    }
}
