//! Interchangeable skeletonization algorithms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::complex::{
    CollapseThresholds, build_cell_complex, cell_complex_to_binary, collapse_cell_complex,
};
use crate::grid::BinaryGrid;
use crate::lookup::LookupTable;
use crate::thin::thin_pixel;

/// Reduces a binary mask to a one-pixel-wide skeleton.
pub trait Skeletonizer {
    /// Skeletonize `grid`. The result is a subset of `grid` with the same
    /// number of connected components.
    fn skeletonize(&self, grid: &BinaryGrid, table: &LookupTable) -> BinaryGrid;
}

/// Which thinning algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkeletonMethod {
    /// Serial lookup-table thinning.
    Pixel,
    /// Cell-complex collapse with medial persistence, then a final
    /// lookup-table pass.
    CellComplex {
        #[serde(default)]
        thresholds: CollapseThresholds,
    },
}

impl Default for SkeletonMethod {
    fn default() -> Self {
        Self::CellComplex {
            thresholds: CollapseThresholds::default(),
        }
    }
}

impl Skeletonizer for SkeletonMethod {
    fn skeletonize(&self, grid: &BinaryGrid, table: &LookupTable) -> BinaryGrid {
        match self {
            Self::Pixel => thin_pixel(grid, table),
            Self::CellComplex { thresholds } => {
                let collapsed = collapse_cell_complex(&build_cell_complex(grid), thresholds);
                cell_complex_to_binary(&collapsed, table)
            }
        }
    }
}

impl fmt::Display for SkeletonMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pixel => write!(f, "pixel"),
            Self::CellComplex { thresholds } => write!(
                f,
                "cell complex (min age {}, min survival {})",
                thresholds.min_age, thresholds.min_survival
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::label::label_components;
    use crate::lookup::lookup_table;
    use crate::morphology::StructuringElement;

    #[allow(clippy::cast_precision_loss)]
    fn filament() -> BinaryGrid {
        // A thick sinuous band.
        BinaryGrid::from_fn(64, 32, |row, col| {
            let centre = 8.0f64.mul_add((col as f64 / 10.0).sin(), 16.0);
            (4..60).contains(&col) && (row as f64 - centre).abs() <= 2.5
        })
    }

    #[test]
    fn both_methods_give_connected_subsets() {
        let grid = filament();
        for method in [SkeletonMethod::Pixel, SkeletonMethod::default()] {
            let skeleton = method.skeletonize(&grid, lookup_table());
            assert!(skeleton.is_subset_of(&grid), "{method}");
            assert_eq!(
                label_components(&skeleton, StructuringElement::Square).1.len(),
                1,
                "{method}"
            );
            assert!(skeleton.count_foreground() < grid.count_foreground() / 2, "{method}");
        }
    }

    #[test]
    fn serde_tagging() {
        let json = serde_json::to_string(&SkeletonMethod::Pixel).unwrap();
        assert_eq!(json, r#"{"kind":"pixel"}"#);
        let parsed: SkeletonMethod = serde_json::from_str(r#"{"kind":"cell_complex"}"#).unwrap();
        assert_eq!(parsed, SkeletonMethod::default());
    }

    #[test]
    fn display() {
        assert_eq!(SkeletonMethod::Pixel.to_string(), "pixel");
        assert_eq!(
            SkeletonMethod::default().to_string(),
            "cell complex (min age 4, min survival 0.4)"
        );
    }
}
