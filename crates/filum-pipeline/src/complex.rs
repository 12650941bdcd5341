//! Cell-complex collapse thinning.
//!
//! A binary grid is lifted to a cubical complex at doubled resolution:
//! pixel `(r, c)` contributes the face centred on `(2r+1, 2c+1)`, its four
//! bounding edges at the side midpoints and its four corner vertices.
//! Cells shared between neighbouring pixels are created once.
//!
//! The complex is then collapsed by removing free pairs, highest level
//! first, until nothing changes:
//!
//! - `(face, edge)` where the edge bounds exactly one alive face;
//! - `(edge, vertex)` where the vertex bounds exactly one alive edge and
//!   that edge bounds no face.
//!
//! Collapsing a free pair never changes topology, so components and holes
//! survive. What would otherwise shrink every branch down to a point is
//! held back by medial persistence: an edge that lost its last face at
//! iteration `t` is kept once `now - t > min_age` and
//! `1 - t / now > min_survival`.
//!
//! All cross references are indices into flat lists; there are no owning
//! pointers between levels.

use serde::{Deserialize, Serialize};

use crate::grid::{BinaryGrid, Position};
use crate::lookup::LookupTable;
use crate::thin::thin_pixel;

/// A point in the doubled coordinate system.
pub type DoubledPosition = (usize, usize);

/// Level-0 cell: a pixel corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: DoubledPosition,
    /// First pixel (row-major) that contributed this cell.
    pub source: Position,
}

/// Level-1 cell: a pixel side, bounded by two vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub vertices: [usize; 2],
    pub position: DoubledPosition,
    pub source: Position,
}

/// Level-2 cell: a pixel interior, bounded by four edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Face {
    pub edges: [usize; 4],
    pub position: DoubledPosition,
    pub source: Position,
}

/// Index arena of vertices, edges and faces over a `width × height` grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellComplex {
    width: usize,
    height: usize,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    faces: Vec<Face>,
}

impl CellComplex {
    /// Width of the source grid in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height of the source grid in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[must_use]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// `V - E + F`. Invariant under collapse.
    #[must_use]
    pub const fn euler_characteristic(&self) -> isize {
        self.vertices.len().cast_signed() - self.edges.len().cast_signed()
            + self.faces.len().cast_signed()
    }

    /// Whether the complex holds no cells at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Deduplicates cells through a dense index over the doubled grid.
struct Builder {
    stride: usize,
    index: Vec<Option<usize>>,
    complex: CellComplex,
}

impl Builder {
    fn new(width: usize, height: usize) -> Self {
        let stride = 2 * width + 1;
        Self {
            stride,
            index: vec![None; stride * (2 * height + 1)],
            complex: CellComplex {
                width,
                height,
                vertices: Vec::new(),
                edges: Vec::new(),
                faces: Vec::new(),
            },
        }
    }

    fn vertex(&mut self, position: DoubledPosition, source: Position) -> usize {
        let slot = position.0 * self.stride + position.1;
        if let Some(i) = self.index[slot] {
            return i;
        }
        let i = self.complex.vertices.len();
        self.complex.vertices.push(Vertex { position, source });
        self.index[slot] = Some(i);
        i
    }

    fn edge(&mut self, position: DoubledPosition, vertices: [usize; 2], source: Position) -> usize {
        let slot = position.0 * self.stride + position.1;
        if let Some(i) = self.index[slot] {
            return i;
        }
        let i = self.complex.edges.len();
        self.complex.edges.push(Edge {
            vertices,
            position,
            source,
        });
        self.index[slot] = Some(i);
        i
    }

    fn pixel(&mut self, (row, col): Position) {
        let (top, left) = (2 * row, 2 * col);
        let (bottom, right) = (top + 2, left + 2);
        let source = (row, col);

        let top_left = self.vertex((top, left), source);
        let top_right = self.vertex((top, right), source);
        let bottom_right = self.vertex((bottom, right), source);
        let bottom_left = self.vertex((bottom, left), source);

        let edges = [
            self.edge((top, left + 1), [top_left, top_right], source),
            self.edge((top + 1, right), [top_right, bottom_right], source),
            self.edge((bottom, left + 1), [bottom_left, bottom_right], source),
            self.edge((top + 1, left), [top_left, bottom_left], source),
        ];
        self.complex.faces.push(Face {
            edges,
            position: (top + 1, left + 1),
            source,
        });
    }
}

/// Lift every foreground pixel of `grid` into a cell complex.
#[must_use]
pub fn build_cell_complex(grid: &BinaryGrid) -> CellComplex {
    let mut builder = Builder::new(grid.width(), grid.height());
    for pos in grid.foreground() {
        builder.pixel(pos);
    }
    let complex = builder.complex;
    log::debug!(
        "built cell complex: {} vertices, {} edges, {} faces",
        complex.vertices.len(),
        complex.edges.len(),
        complex.faces.len()
    );
    complex
}

/// Medial persistence thresholds for [`collapse_cell_complex`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseThresholds {
    /// Iterations an isolated edge must survive before it is kept.
    pub min_age: u32,
    /// Fraction of the running time an edge must have been isolated for.
    pub min_survival: f64,
}

impl CollapseThresholds {
    pub const DEFAULT_MIN_AGE: u32 = 4;
    pub const DEFAULT_MIN_SURVIVAL: f64 = 0.4;

    /// Whether an edge isolated at iteration `isolated_at` is kept at
    /// iteration `now`.
    #[must_use]
    pub fn protects(&self, isolated_at: u32, now: u32) -> bool {
        if now == 0 {
            return false;
        }
        let age = now.saturating_sub(isolated_at);
        age > self.min_age && 1.0 - f64::from(isolated_at) / f64::from(now) > self.min_survival
    }
}

impl Default for CollapseThresholds {
    fn default() -> Self {
        Self {
            min_age: Self::DEFAULT_MIN_AGE,
            min_survival: Self::DEFAULT_MIN_SURVIVAL,
        }
    }
}

/// Mutable bookkeeping for one collapse run.
struct CollapseState<'a> {
    complex: &'a CellComplex,
    vertex_alive: Vec<bool>,
    edge_alive: Vec<bool>,
    face_alive: Vec<bool>,
    /// Alive faces bounded by each edge.
    edge_faces: Vec<u8>,
    /// Alive edges bounded by each vertex.
    vertex_edges: Vec<u8>,
    /// Iteration at which each edge lost its last face.
    isolated_at: Vec<Option<u32>>,
    faces_of_edge: Vec<Vec<usize>>,
    edges_of_vertex: Vec<Vec<usize>>,
}

impl<'a> CollapseState<'a> {
    fn new(complex: &'a CellComplex) -> Self {
        let mut faces_of_edge = vec![Vec::with_capacity(2); complex.edges.len()];
        for (f, face) in complex.faces.iter().enumerate() {
            for &e in &face.edges {
                faces_of_edge[e].push(f);
            }
        }
        let mut edges_of_vertex = vec![Vec::with_capacity(4); complex.vertices.len()];
        for (e, edge) in complex.edges.iter().enumerate() {
            for &v in &edge.vertices {
                edges_of_vertex[v].push(e);
            }
        }
        let count = |adjacent: &Vec<usize>| u8::try_from(adjacent.len()).unwrap_or(u8::MAX);

        Self {
            complex,
            vertex_alive: vec![true; complex.vertices.len()],
            edge_alive: vec![true; complex.edges.len()],
            face_alive: vec![true; complex.faces.len()],
            edge_faces: faces_of_edge.iter().map(count).collect(),
            vertex_edges: edges_of_vertex.iter().map(count).collect(),
            isolated_at: vec![None; complex.edges.len()],
            faces_of_edge,
            edges_of_vertex,
        }
    }

    /// Remove every `(face, edge)` pair free at the start of this level.
    fn collapse_faces(&mut self, now: u32) -> usize {
        let free: Vec<usize> = (0..self.complex.edges.len())
            .filter(|&e| self.edge_alive[e] && self.edge_faces[e] == 1)
            .collect();
        let mut removed = 0;
        for e in free {
            if !self.edge_alive[e] || self.edge_faces[e] != 1 {
                continue;
            }
            let Some(f) = self.faces_of_edge[e]
                .iter()
                .copied()
                .find(|&f| self.face_alive[f])
            else {
                continue;
            };
            self.face_alive[f] = false;
            self.edge_alive[e] = false;
            self.edge_faces[e] = 0;
            for &other in &self.complex.faces[f].edges {
                if other == e {
                    continue;
                }
                self.edge_faces[other] -= 1;
                if self.edge_faces[other] == 0 {
                    self.isolated_at[other] = Some(now);
                }
            }
            for &v in &self.complex.edges[e].vertices {
                self.vertex_edges[v] -= 1;
            }
            removed += 1;
        }
        removed
    }

    /// Remove every unprotected `(edge, vertex)` pair free at the start of
    /// this level.
    fn collapse_edges(&mut self, now: u32, thresholds: &CollapseThresholds) -> usize {
        let free: Vec<usize> = (0..self.complex.vertices.len())
            .filter(|&v| self.vertex_alive[v] && self.vertex_edges[v] == 1)
            .collect();
        let mut removed = 0;
        for v in free {
            if !self.vertex_alive[v] || self.vertex_edges[v] != 1 {
                continue;
            }
            let Some(e) = self.edges_of_vertex[v]
                .iter()
                .copied()
                .find(|&e| self.edge_alive[e])
            else {
                continue;
            };
            if self.edge_faces[e] > 0 {
                continue;
            }
            if self.isolated_at[e].is_some_and(|t| thresholds.protects(t, now)) {
                continue;
            }
            self.edge_alive[e] = false;
            self.vertex_alive[v] = false;
            self.vertex_edges[v] = 0;
            for &w in &self.complex.edges[e].vertices {
                if w != v {
                    self.vertex_edges[w] -= 1;
                }
            }
            removed += 1;
        }
        removed
    }

    /// Rebuild a compact complex from the surviving cells.
    fn into_complex(self) -> CellComplex {
        let remap = |alive: &[bool]| -> Vec<Option<usize>> {
            let mut next = 0;
            alive
                .iter()
                .map(|&a| {
                    a.then(|| {
                        next += 1;
                        next - 1
                    })
                })
                .collect()
        };
        let vertex_map = remap(&self.vertex_alive);
        let edge_map = remap(&self.edge_alive);

        let vertices = self
            .complex
            .vertices
            .iter()
            .zip(&self.vertex_alive)
            .filter_map(|(v, &alive)| alive.then_some(*v))
            .collect();
        let edges = self
            .complex
            .edges
            .iter()
            .zip(&self.edge_alive)
            .filter(|&(_, &alive)| alive)
            .filter_map(|(edge, _)| {
                let [a, b] = edge.vertices;
                Some(Edge {
                    vertices: [vertex_map[a]?, vertex_map[b]?],
                    ..*edge
                })
            })
            .collect();
        let faces = self
            .complex
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter(|&(_, &alive)| alive)
            .filter_map(|(face, _)| {
                let [a, b, c, d] = face.edges;
                Some(Face {
                    edges: [edge_map[a]?, edge_map[b]?, edge_map[c]?, edge_map[d]?],
                    ..*face
                })
            })
            .collect();

        CellComplex {
            width: self.complex.width,
            height: self.complex.height,
            vertices,
            edges,
            faces,
        }
    }
}

/// Collapse free pairs until a full sweep removes nothing.
#[must_use]
pub fn collapse_cell_complex(complex: &CellComplex, thresholds: &CollapseThresholds) -> CellComplex {
    let mut state = CollapseState::new(complex);
    let mut now = 0u32;
    loop {
        now += 1;
        let faces = state.collapse_faces(now);
        let edges = state.collapse_edges(now, thresholds);
        log::trace!("collapse iteration {now}: removed {faces} face pairs, {edges} edge pairs");
        if faces + edges == 0 {
            break;
        }
    }
    let collapsed = state.into_complex();
    log::debug!(
        "collapsed cell complex in {now} iterations: {} vertices, {} edges, {} faces remain",
        collapsed.vertices.len(),
        collapsed.edges.len(),
        collapsed.faces.len()
    );
    collapsed
}

/// Rasterise a complex back onto its pixel grid.
///
/// Every surviving cell marks the pixel it was lifted from. The raster is
/// then passed through [`thin_pixel`] once more to remove two-pixel-wide
/// runs left where neighbouring cells map to adjacent pixels.
#[must_use]
pub fn cell_complex_to_binary(complex: &CellComplex, table: &LookupTable) -> BinaryGrid {
    let mut grid = BinaryGrid::new(complex.width, complex.height);
    let sources = complex
        .vertices
        .iter()
        .map(|v| v.source)
        .chain(complex.edges.iter().map(|e| e.source))
        .chain(complex.faces.iter().map(|f| f.source));
    for source in sources {
        grid[source] = true;
    }
    thin_pixel(&grid, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::label_components;
    use crate::lookup::lookup_table;
    use crate::morphology::StructuringElement;

    fn from_rows(rows: &[&str]) -> BinaryGrid {
        let width = rows.first().map_or(0, |r| r.len());
        BinaryGrid::from_fn(width, rows.len(), |row, col| rows[row].as_bytes()[col] == b'#')
    }

    fn skeletonize(grid: &BinaryGrid) -> BinaryGrid {
        let collapsed = collapse_cell_complex(&build_cell_complex(grid), &CollapseThresholds::default());
        cell_complex_to_binary(&collapsed, lookup_table())
    }

    fn components(grid: &BinaryGrid) -> usize {
        label_components(grid, StructuringElement::Square).1.len()
    }

    #[test]
    fn single_pixel_counts() {
        let grid = from_rows(&["...", ".#.", "..."]);
        let complex = build_cell_complex(&grid);
        assert_eq!(complex.vertices().len(), 4);
        assert_eq!(complex.edges().len(), 4);
        assert_eq!(complex.faces().len(), 1);
        assert_eq!(complex.euler_characteristic(), 1);
        assert_eq!(complex.faces()[0].position, (3, 3));
    }

    #[test]
    fn shared_cells_are_deduplicated() {
        let grid = from_rows(&["##", "##"]);
        let complex = build_cell_complex(&grid);
        assert_eq!(complex.vertices().len(), 9);
        assert_eq!(complex.edges().len(), 12);
        assert_eq!(complex.faces().len(), 4);
    }

    #[test]
    fn references_stay_in_bounds() {
        let grid = from_rows(&[".##.", "###.", ".#.#"]);
        let complex = build_cell_complex(&grid);
        for edge in complex.edges() {
            assert!(edge.vertices.iter().all(|&v| v < complex.vertices().len()));
        }
        for face in complex.faces() {
            assert!(face.edges.iter().all(|&e| e < complex.edges().len()));
        }
    }

    #[test]
    fn round_trip_of_thin_shapes() {
        let shapes = [
            from_rows(&["..........", ".########.", ".........."]),
            from_rows(&[".....", ".#...", ".#...", ".###.", "....."]),
            from_rows(&["#....", ".#...", "..#..", "...#.", "....#"]),
            from_rows(&[".#.", "...", ".#."]),
        ];
        for shape in shapes {
            let back = cell_complex_to_binary(&build_cell_complex(&shape), lookup_table());
            assert_eq!(back, shape);
        }
    }

    #[test]
    fn collapse_preserves_euler_characteristic() {
        let ring = from_rows(&[
            "........",
            ".######.",
            ".######.",
            ".##..##.",
            ".##..##.",
            ".######.",
            ".######.",
            "........",
        ]);
        let complex = build_cell_complex(&ring);
        let collapsed = collapse_cell_complex(&complex, &CollapseThresholds::default());
        assert_eq!(complex.euler_characteristic(), 0);
        assert_eq!(collapsed.euler_characteristic(), 0);
        assert!(collapsed.faces().is_empty());
    }

    #[test]
    fn single_pixel_collapses_to_a_vertex() {
        let grid = from_rows(&["...", ".#.", "..."]);
        let collapsed = collapse_cell_complex(&build_cell_complex(&grid), &CollapseThresholds::default());
        assert_eq!(collapsed.vertices().len(), 1);
        assert!(collapsed.edges().is_empty());
        assert_eq!(collapsed.vertices()[0].source, (1, 1));
        assert_eq!(cell_complex_to_binary(&collapsed, lookup_table()), grid);
    }

    #[test]
    fn skeleton_is_inside_and_keeps_components() {
        let mut grid = BinaryGrid::new(40, 24);
        for row in 3..8 {
            for col in 2..36 {
                grid[(row, col)] = true;
            }
        }
        for row in 14..21 {
            for col in 5..30 {
                grid[(row, col)] = true;
            }
        }
        let skeleton = skeletonize(&grid);
        assert!(skeleton.is_subset_of(&grid));
        assert_eq!(components(&skeleton), 2);
        assert!(skeleton.count_foreground() < grid.count_foreground() / 3);
    }

    #[test]
    fn long_bar_keeps_a_persistent_branch() {
        let mut grid = BinaryGrid::new(60, 9);
        for row in 2..7 {
            for col in 2..58 {
                grid[(row, col)] = true;
            }
        }
        let skeleton = skeletonize(&grid);
        // A branch, not a point: protection stops the endpoint erosion.
        assert!(skeleton.count_foreground() > 20);
    }

    #[test]
    fn empty_grid_gives_empty_complex() {
        let grid = BinaryGrid::new(4, 4);
        let complex = build_cell_complex(&grid);
        assert!(complex.is_empty());
        let collapsed = collapse_cell_complex(&complex, &CollapseThresholds::default());
        assert_eq!(cell_complex_to_binary(&collapsed, lookup_table()), grid);
    }

    #[test]
    fn protection_rule() {
        let thresholds = CollapseThresholds::default();
        assert!(!thresholds.protects(1, 5));
        assert!(thresholds.protects(1, 6));
        // Old enough, but isolated for too small a share of the run.
        assert!(!thresholds.protects(10, 15));
        assert!(thresholds.protects(10, 17));
    }
}
