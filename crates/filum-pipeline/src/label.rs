//! Connected-component labelling and largest-component selection.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::grid::{BinaryGrid, LabelGrid};
use crate::morphology::StructuringElement;

/// Pixel count of one labelled component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentSize {
    /// Label id, starting at 1.
    pub label: u32,
    /// Number of pixels carrying this label.
    pub pixel_count: usize,
}

/// Label the foreground components of `grid`.
///
/// Pixels are scanned in row-major order. Each unlabelled foreground
/// pixel seeds an iterative depth-first flood fill over the neighbours of
/// `element`, and every pixel it reaches receives the next label. Labels
/// start at 1 and follow discovery order; background stays 0. The
/// returned sizes are indexed by `label - 1`.
#[must_use]
pub fn label_components(
    grid: &BinaryGrid,
    element: StructuringElement,
) -> (LabelGrid, Vec<ComponentSize>) {
    let mut labels = LabelGrid::new(grid.width(), grid.height());
    let mut sizes = Vec::new();
    let mut stack = Vec::new();

    for seed in grid.foreground() {
        if labels[seed] != 0 {
            continue;
        }
        let label = u32::try_from(sizes.len() + 1).unwrap_or(u32::MAX);
        labels[seed] = label;
        stack.push(seed);
        let mut pixel_count = 0;

        while let Some(pos) = stack.pop() {
            pixel_count += 1;
            for &offset in element.offsets() {
                if let Some(n) = grid.offset(pos, offset)
                    && grid[n]
                    && labels[n] == 0
                {
                    labels[n] = label;
                    stack.push(n);
                }
            }
        }
        sizes.push(ComponentSize { label, pixel_count });
    }

    log::debug!(
        "labelled {} {element}-connected components over {} pixels",
        sizes.len(),
        grid.count_foreground()
    );
    (labels, sizes)
}

/// Keep only the `k` largest components.
///
/// Components are ranked by pixel count, descending; ties keep discovery
/// order. Asking for more components than exist keeps all of them.
#[must_use = "returns the filtered grid"]
pub fn largest_components(grid: &BinaryGrid, k: usize, element: StructuringElement) -> BinaryGrid {
    let (labels, sizes) = label_components(grid, element);
    largest_from_labels(&labels, &sizes, k)
}

/// Keep the `k` largest components of an existing labelling.
///
/// `sizes` is the table returned alongside `labels` by
/// [`label_components`]. Ranking is the same as [`largest_components`].
#[must_use = "returns the filtered grid"]
pub fn largest_from_labels(labels: &LabelGrid, sizes: &[ComponentSize], k: usize) -> BinaryGrid {
    let mut ranked = sizes.to_vec();
    ranked.sort_by_key(|size| Reverse(size.pixel_count));

    let mut keep = vec![false; sizes.len() + 1];
    for size in ranked.iter().take(k) {
        if let Some(slot) = keep.get_mut(size.label as usize) {
            *slot = true;
        }
    }
    labels.map(|label| label != 0 && keep.get(label as usize).copied().unwrap_or(false))
}
