//! Cell topology metadata for background and child cells.
//!
//! The reference elements use the following vertex ordering and parametric
//! domains:
//! - `Tri3`: `[v0, v1, v2]` with `(r, s)` in the unit right triangle.
//! - `Quad4`: `[v0, v1, v2, v3]` counter-clockwise with `(xi, eta)` in `[-1, 1]^2`.
//! - `Tet4`: `[v0, v1, v2, v3]` with `(r, s, t)` in the unit tetrahedron.
//! - `Hex8`: bottom face `[v0..v3]` then top face `[v4..v7]` with
//!   `(xi, eta, zeta)` in `[-1, 1]^3`.
//!
//! All topologies are first order. Side ordinals follow the Exodus convention.

use serde::{Deserialize, Serialize};

/// Supported first-order cell topologies.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellTopology {
    /// 2D simplex.
    Tri3,
    /// 2D tensor-product cell.
    Quad4,
    /// 3D simplex.
    Tet4,
    /// 3D tensor-product cell.
    Hex8,
}

const TRI3_REF: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const QUAD4_REF: [[f64; 3]; 4] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
];
const TET4_REF: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];
const HEX8_REF: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

const TRI3_SIDES: [&[usize]; 3] = [&[0, 1], &[1, 2], &[2, 0]];
const QUAD4_SIDES: [&[usize]; 4] = [&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TET4_SIDES: [&[usize]; 4] = [&[0, 1, 3], &[1, 2, 3], &[0, 3, 2], &[0, 2, 1]];
const HEX8_SIDES: [&[usize]; 6] = [
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
];

const TRI3_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const QUAD4_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TET4_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const HEX8_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

impl CellTopology {
    /// Spatial (and topological) dimension.
    pub fn dimension(self) -> usize {
        match self {
            CellTopology::Tri3 | CellTopology::Quad4 => 2,
            CellTopology::Tet4 | CellTopology::Hex8 => 3,
        }
    }

    /// Number of vertices of the cell.
    pub fn num_vertices(self) -> usize {
        match self {
            CellTopology::Tri3 => 3,
            CellTopology::Quad4 | CellTopology::Tet4 => 4,
            CellTopology::Hex8 => 8,
        }
    }

    /// Interpolation order. Only linear cells are supported.
    pub fn order(self) -> usize {
        1
    }

    /// Whether the cell is a simplex.
    pub fn is_simplex(self) -> bool {
        matches!(self, CellTopology::Tri3 | CellTopology::Tet4)
    }

    /// The simplex topology of the same dimension.
    pub fn simplex_of_dimension(dim: usize) -> Option<CellTopology> {
        match dim {
            2 => Some(CellTopology::Tri3),
            3 => Some(CellTopology::Tet4),
            _ => None,
        }
    }

    /// Parametric coordinates of the reference vertices (padded to 3 components).
    pub fn reference_vertices(self) -> &'static [[f64; 3]] {
        match self {
            CellTopology::Tri3 => &TRI3_REF,
            CellTopology::Quad4 => &QUAD4_REF,
            CellTopology::Tet4 => &TET4_REF,
            CellTopology::Hex8 => &HEX8_REF,
        }
    }

    /// Parametric centroid of the reference cell.
    pub fn reference_center(self) -> [f64; 3] {
        match self {
            CellTopology::Tri3 => [1.0 / 3.0, 1.0 / 3.0, 0.0],
            CellTopology::Tet4 => [0.25, 0.25, 0.25],
            CellTopology::Quad4 | CellTopology::Hex8 => [0.0, 0.0, 0.0],
        }
    }

    /// Local vertex lists of the sides (edges in 2D, faces in 3D).
    pub fn sides(self) -> &'static [&'static [usize]] {
        match self {
            CellTopology::Tri3 => &TRI3_SIDES,
            CellTopology::Quad4 => &QUAD4_SIDES,
            CellTopology::Tet4 => &TET4_SIDES,
            CellTopology::Hex8 => &HEX8_SIDES,
        }
    }

    /// Number of sides.
    pub fn num_sides(self) -> usize {
        self.sides().len()
    }

    /// Local vertex pairs of the edges.
    pub fn edges(self) -> &'static [[usize; 2]] {
        match self {
            CellTopology::Tri3 => &TRI3_EDGES,
            CellTopology::Quad4 => &QUAD4_EDGES,
            CellTopology::Tet4 => &TET4_EDGES,
            CellTopology::Hex8 => &HEX8_EDGES,
        }
    }

    /// Signed distance-like measure of a parametric point from side `side`.
    ///
    /// Returns zero (up to round-off) exactly when `xi` lies on the side plane.
    pub fn side_distance(self, side: usize, xi: &[f64; 3]) -> Option<f64> {
        let d = match (self, side) {
            (CellTopology::Quad4, 0) => xi[1] + 1.0,
            (CellTopology::Quad4, 1) => 1.0 - xi[0],
            (CellTopology::Quad4, 2) => 1.0 - xi[1],
            (CellTopology::Quad4, 3) => xi[0] + 1.0,
            (CellTopology::Hex8, 0) => xi[1] + 1.0,
            (CellTopology::Hex8, 1) => 1.0 - xi[0],
            (CellTopology::Hex8, 2) => 1.0 - xi[1],
            (CellTopology::Hex8, 3) => xi[0] + 1.0,
            (CellTopology::Hex8, 4) => xi[2] + 1.0,
            (CellTopology::Hex8, 5) => 1.0 - xi[2],
            (CellTopology::Tri3, 0) => xi[1],
            (CellTopology::Tri3, 1) => 1.0 - xi[0] - xi[1],
            (CellTopology::Tri3, 2) => xi[0],
            (CellTopology::Tet4, 0) => xi[1],
            (CellTopology::Tet4, 1) => 1.0 - xi[0] - xi[1] - xi[2],
            (CellTopology::Tet4, 2) => xi[0],
            (CellTopology::Tet4, 3) => xi[2],
            _ => return None,
        };
        Some(d)
    }
}
