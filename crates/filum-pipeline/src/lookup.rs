//! Deletability table for lookup-table thinning.
//!
//! A foreground pixel's 8 neighbours are packed into one byte, bit `i`
//! set iff the neighbour at [`SQUARE`]`[i]` is foreground (clockwise from
//! the upper-left corner). The table maps each of the 256 configurations
//! to whether the centre pixel may be deleted without changing topology.
//!
//! The table is derived from a 3×3 analysis of every configuration, never
//! hand-authored. [`lookup_table`] builds it once per process and hands
//! out a shared reference thereafter.

use std::sync::OnceLock;

use crate::grid::{BinaryGrid, Position};
use crate::morphology::SQUARE;

/// Bits of [`SQUARE`] that sit on the orthogonal (edge-sharing) neighbours.
const ORTHOGONAL_BITS: [u8; 4] = [1, 3, 5, 7];

type Patch = [[bool; 3]; 3];

/// 256-entry "centre may be deleted" table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable([bool; 256]);

impl LookupTable {
    /// Whether a foreground pixel with this neighbour configuration may be
    /// deleted.
    #[must_use]
    pub fn is_deletable(&self, configuration: u8) -> bool {
        self.0[usize::from(configuration)]
    }

    /// Number of deletable configurations.
    #[must_use]
    pub fn count_deletable(&self) -> usize {
        self.0.iter().filter(|&&d| d).count()
    }
}

/// Pack the 8 neighbours of `pos` into a configuration byte.
///
/// Neighbours outside the grid count as background.
#[must_use]
pub fn neighbour_configuration(grid: &BinaryGrid, pos: Position) -> u8 {
    SQUARE
        .iter()
        .enumerate()
        .filter(|&(_, &offset)| grid.offset(pos, offset).is_some_and(|n| grid[n]))
        .fold(0u8, |acc, (bit, _)| acc | (1 << bit))
}

/// Expand a configuration byte into a 3×3 patch with the centre set.
fn patch(configuration: u8) -> Patch {
    let mut patch = [[false; 3]; 3];
    patch[1][1] = true;
    for (bit, (d_row, d_col)) in SQUARE.iter().enumerate() {
        let row = (1 + d_row).cast_unsigned();
        let col = (1 + d_col).cast_unsigned();
        patch[row][col] = configuration & (1 << bit) != 0;
    }
    patch
}

/// Count 4-connected components of cells equal to `value` in a patch.
fn count_components(patch: &Patch, value: bool) -> usize {
    let mut seen = [[false; 3]; 3];
    let mut stack = Vec::with_capacity(9);
    let mut count = 0;
    for row in 0..3 {
        for col in 0..3 {
            if patch[row][col] != value || seen[row][col] {
                continue;
            }
            count += 1;
            seen[row][col] = true;
            stack.push((row, col));
            while let Some((r, c)) = stack.pop() {
                let neighbours = [
                    r.checked_sub(1).map(|r| (r, c)),
                    (r < 2).then(|| (r + 1, c)),
                    c.checked_sub(1).map(|c| (r, c)),
                    (c < 2).then(|| (r, c + 1)),
                ];
                for (nr, nc) in neighbours.into_iter().flatten() {
                    if patch[nr][nc] == value && !seen[nr][nc] {
                        seen[nr][nc] = true;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }
    count
}

/// Decide deletability for one configuration.
fn is_deletable(configuration: u8) -> bool {
    // A lone orthogonal neighbour marks a curve endpoint.
    if configuration.count_ones() == 1
        && ORTHOGONAL_BITS
            .iter()
            .any(|&bit| configuration & (1 << bit) != 0)
    {
        return false;
    }

    let before = patch(configuration);
    let mut after = before;
    after[1][1] = false;

    count_components(&before, true) == count_components(&after, true)
        && count_components(&before, false) == count_components(&after, false)
}

/// Derive the full table by enumerating all 256 configurations.
#[must_use]
pub fn build_lookup_table() -> LookupTable {
    let mut table = [false; 256];
    for configuration in 0..=u8::MAX {
        table[usize::from(configuration)] = is_deletable(configuration);
    }
    let table = LookupTable(table);
    log::debug!(
        "built thinning lookup table: {} of 256 configurations deletable",
        table.count_deletable()
    );
    table
}

/// The process-wide table, built on first use.
#[must_use]
pub fn lookup_table() -> &'static LookupTable {
    static TABLE: OnceLock<LookupTable> = OnceLock::new();
    TABLE.get_or_init(build_lookup_table)
}
