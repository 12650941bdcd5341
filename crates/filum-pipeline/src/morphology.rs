//! Binary morphology: dilation, erosion, opening and closing.
//!
//! Neighbours are defined by a [`StructuringElement`]. Offsets that land
//! outside the grid are skipped, which is equivalent to zero-padding.
//!
//! Algebraic contracts:
//!
//! - `erode(X) == invert(dilate(invert(X)))`
//! - `open(X) ⊆ X ⊆ close(X)`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::{BinaryGrid, Offset};

/// 8-neighbour offsets, clockwise starting from the upper-left corner.
///
/// The order is load-bearing: bit `i` of a neighbour configuration in
/// [`crate::lookup`] corresponds to `SQUARE[i]`.
pub const SQUARE: [Offset; 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
];

/// 4-neighbour (orthogonal) offsets.
pub const CROSS: [Offset; 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Neighbour relation used by morphology, labelling and component
/// selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuringElement {
    /// 8-connected: orthogonal and diagonal neighbours.
    #[default]
    Square,
    /// 4-connected: orthogonal neighbours only.
    Cross,
}

impl StructuringElement {
    /// The neighbour offsets of this element.
    #[must_use]
    pub const fn offsets(self) -> &'static [Offset] {
        match self {
            Self::Square => &SQUARE,
            Self::Cross => &CROSS,
        }
    }
}

impl fmt::Display for StructuringElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Square => write!(f, "square"),
            Self::Cross => write!(f, "cross"),
        }
    }
}

/// Grow the foreground by `iterations` rounds of neighbour painting.
///
/// Each round paints from the previous round's output, so effects
/// compound. Stops early once a round changes nothing.
#[must_use = "returns the dilated grid"]
pub fn dilate(grid: &BinaryGrid, element: StructuringElement, iterations: usize) -> BinaryGrid {
    let mut current = grid.clone();
    for _ in 0..iterations {
        let mut next = current.clone();
        let mut changed = false;
        for pos in current.foreground() {
            for &offset in element.offsets() {
                if let Some(n) = current.offset(pos, offset)
                    && !next[n]
                {
                    next[n] = true;
                    changed = true;
                }
            }
        }
        current = next;
        if !changed {
            break;
        }
    }
    current
}

/// Shrink the foreground: the dual of [`dilate`] under inversion.
#[must_use = "returns the eroded grid"]
pub fn erode(grid: &BinaryGrid, element: StructuringElement, iterations: usize) -> BinaryGrid {
    dilate(&grid.invert(), element, iterations).invert()
}

/// Erode then dilate. Removes specks narrower than the element.
#[must_use = "returns the opened grid"]
pub fn open(grid: &BinaryGrid, element: StructuringElement, iterations: usize) -> BinaryGrid {
    dilate(&erode(grid, element, iterations), element, iterations)
}

/// Dilate then erode. Fills gaps narrower than the element.
#[must_use = "returns the closed grid"]
pub fn close(grid: &BinaryGrid, element: StructuringElement, iterations: usize) -> BinaryGrid {
    erode(&dilate(grid, element, iterations), element, iterations)
}

/// A morphological operator selectable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphologyOp {
    Dilate,
    Erode,
    Open,
    Close,
}

impl MorphologyOp {
    /// Apply this operator.
    #[must_use = "returns the transformed grid"]
    pub fn apply(self, grid: &BinaryGrid, element: StructuringElement, iterations: usize) -> BinaryGrid {
        match self {
            Self::Dilate => dilate(grid, element, iterations),
            Self::Erode => erode(grid, element, iterations),
            Self::Open => open(grid, element, iterations),
            Self::Close => close(grid, element, iterations),
        }
    }
}

impl fmt::Display for MorphologyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dilate => write!(f, "dilate"),
            Self::Erode => write!(f, "erode"),
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
        }
    }
}
