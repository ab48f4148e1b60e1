//! Structured box generators for background meshes, serial or slab-partitioned.
//!
//! Ids are lexicographic (x fastest) and start at 1. A partitioned build
//! assigns whole x-columns of cells to ranks and adds one column of aura
//! cells on each side, so every basis owned by a rank has its complete
//! support locally. A node is owned by the lowest rank owning one of its cells.

use crate::background::mesh::{BackgroundMesh, BackgroundMeshBuilder};
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;
use std::collections::BTreeSet;

/// Cell-type choices for structured meshes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StructuredCellType {
    Triangle,
    Quadrilateral,
    Hexahedron,
}

#[derive(Clone, Debug)]
pub struct StructuredBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
    /// Cells per direction; `cells[2] == 1` and unused in 2D.
    pub cells: [usize; 3],
    pub cell_type: StructuredCellType,
}

fn invalid_geometry(message: impl Into<String>) -> MeshError {
    MeshError::InvalidGeometry(message.into())
}

impl StructuredBox {
    /// A 2D box over `[min, max]` with `nx`×`ny` quads (or twice as many triangles).
    pub fn new_2d(
        nx: usize,
        ny: usize,
        min: [f64; 2],
        max: [f64; 2],
        cell_type: StructuredCellType,
    ) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 {
            return Err(invalid_geometry("nx and ny must be positive"));
        }
        if cell_type == StructuredCellType::Hexahedron {
            return Err(invalid_geometry("hex elements are not valid for 2D meshes"));
        }
        if !(max[0] > min[0] && max[1] > min[1]) {
            return Err(invalid_geometry("box extent must be positive"));
        }
        Ok(Self {
            min: [min[0], min[1], 0.0],
            max: [max[0], max[1], 0.0],
            cells: [nx, ny, 1],
            cell_type,
        })
    }

    /// A 3D box over `[min, max]` with `nx`×`ny`×`nz` hexahedra.
    pub fn new_3d(
        nx: usize,
        ny: usize,
        nz: usize,
        min: [f64; 3],
        max: [f64; 3],
    ) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(invalid_geometry("nx, ny, and nz must be positive"));
        }
        if !(0..3).all(|d| max[d] > min[d]) {
            return Err(invalid_geometry("box extent must be positive"));
        }
        Ok(Self {
            min,
            max,
            cells: [nx, ny, nz],
            cell_type: StructuredCellType::Hexahedron,
        })
    }

    pub fn dimension(&self) -> usize {
        match self.cell_type {
            StructuredCellType::Hexahedron => 3,
            _ => 2,
        }
    }

    /// Rank owning cell column `i` when split over `size` ranks.
    pub fn column_owner(&self, i: usize, size: usize) -> usize {
        i * size / self.cells[0]
    }

    fn node_counts(&self) -> [usize; 3] {
        let [nx, ny, nz] = self.cells;
        if self.dimension() == 3 {
            [nx + 1, ny + 1, nz + 1]
        } else {
            [nx + 1, ny + 1, 1]
        }
    }

    fn node_id(&self, i: usize, j: usize, k: usize) -> u64 {
        let [sx, sy, _] = self.node_counts();
        (i + sx * (j + sy * k)) as u64 + 1
    }

    fn node_coords(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let h = |d: usize| (self.max[d] - self.min[d]) / self.cells[d] as f64;
        let mut x = [
            self.min[0] + h(0) * i as f64,
            self.min[1] + h(1) * j as f64,
            0.0,
        ];
        if self.dimension() == 3 {
            x[2] = self.min[2] + h(2) * k as f64;
        }
        x
    }

    /// Owner of a node: the lowest owner among the columns touching it.
    fn node_owner(&self, i: usize, size: usize) -> usize {
        let col = if i == 0 { 0 } else { (i - 1).min(self.cells[0] - 1) };
        self.column_owner(col, size)
    }

    /// The whole box on rank 0 of a single-rank run.
    pub fn build(&self) -> Result<BackgroundMesh, MeshError> {
        self.build_partitioned(0, 1)
    }

    /// The part of the box `rank` holds when split over `size` ranks.
    pub fn build_partitioned(&self, rank: usize, size: usize) -> Result<BackgroundMesh, MeshError> {
        if size == 0 || rank >= size {
            return Err(MeshError::InvalidConfig(format!(
                "rank {rank} is outside a world of {size}"
            )));
        }
        let [nx, ny, nz] = self.cells;
        let owned: Vec<usize> = (0..nx).filter(|&i| self.column_owner(i, size) == rank).collect();
        let mut builder = BackgroundMeshBuilder::new(self.dimension(), rank);
        let (Some(&first), Some(&last)) = (owned.first(), owned.last()) else {
            log::debug!("rank {rank} owns no cell columns");
            return builder.build();
        };
        let lo = first.saturating_sub(1);
        let hi = (last + 1).min(nx - 1);

        let mut nodes = BTreeSet::new();
        let layers = if self.dimension() == 3 { nz } else { 1 };
        for k in 0..layers {
            for j in 0..ny {
                for i in lo..=hi {
                    let owner = self.column_owner(i, size);
                    let quad_id = (i + nx * (j + ny * k)) as u64 + 1;
                    match self.cell_type {
                        StructuredCellType::Quadrilateral => {
                            let v = [
                                self.node_id(i, j, 0),
                                self.node_id(i + 1, j, 0),
                                self.node_id(i + 1, j + 1, 0),
                                self.node_id(i, j + 1, 0),
                            ];
                            builder.add_cell(quad_id, CellTopology::Quad4, &v, owner)?;
                            nodes.extend([(0, j, i), (0, j, i + 1), (0, j + 1, i + 1), (0, j + 1, i)]);
                        }
                        StructuredCellType::Triangle => {
                            let v0 = self.node_id(i, j, 0);
                            let v1 = self.node_id(i + 1, j, 0);
                            let v2 = self.node_id(i + 1, j + 1, 0);
                            let v3 = self.node_id(i, j + 1, 0);
                            builder.add_cell(2 * quad_id - 1, CellTopology::Tri3, &[v0, v1, v2], owner)?;
                            builder.add_cell(2 * quad_id, CellTopology::Tri3, &[v0, v2, v3], owner)?;
                            nodes.extend([(0, j, i), (0, j, i + 1), (0, j + 1, i + 1), (0, j + 1, i)]);
                        }
                        StructuredCellType::Hexahedron => {
                            let corners = [
                                (i, j, k),
                                (i + 1, j, k),
                                (i + 1, j + 1, k),
                                (i, j + 1, k),
                                (i, j, k + 1),
                                (i + 1, j, k + 1),
                                (i + 1, j + 1, k + 1),
                                (i, j + 1, k + 1),
                            ];
                            let v = corners.map(|(a, b, c)| self.node_id(a, b, c));
                            builder.add_cell(quad_id, CellTopology::Hex8, &v, owner)?;
                            nodes.extend(corners.map(|(a, b, c)| (c, b, a)));
                        }
                    }
                }
            }
        }
        // (k, j, i) order keeps local node indices ascending by id
        for (k, j, i) in nodes {
            builder.add_node(self.node_id(i, j, k), self.node_coords(i, j, k), self.node_owner(i, size))?;
        }
        builder.build()
    }
}

/// Serial quad mesh over `[min, max]` with `n[0]`×`n[1]` cells.
pub fn structured_quad_mesh(
    min: [f64; 2],
    max: [f64; 2],
    n: [usize; 2],
) -> Result<BackgroundMesh, MeshError> {
    StructuredBox::new_2d(n[0], n[1], min, max, StructuredCellType::Quadrilateral)?.build()
}

/// Serial hex mesh over `[min, max]` with `n[0]`×`n[1]`×`n[2]` cells.
pub fn structured_hex_mesh(
    min: [f64; 3],
    max: [f64; 3],
    n: [usize; 3],
) -> Result<BackgroundMesh, MeshError> {
    StructuredBox::new_3d(n[0], n[1], n[2], min, max)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_mesh_counts_and_ids() {
        let mesh = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
        assert_eq!(mesh.num_cells(), 2);
        assert_eq!(mesh.num_nodes(), 6);
        assert_eq!(mesh.node_coords(4).unwrap(), [1.0, 1.0, 0.0]);
        assert_eq!(mesh.cell_topology(0).unwrap(), CellTopology::Quad4);
        let n = mesh.facet_neighbor(0, 1).unwrap();
        assert_eq!((n.cell, n.side), (1, 3));
    }

    #[test]
    fn triangle_and_hex_variants() {
        let tri = StructuredBox::new_2d(2, 2, [0.0, 0.0], [1.0, 1.0], StructuredCellType::Triangle)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(tri.num_cells(), 8);
        let hex = structured_hex_mesh([0.0; 3], [1.0; 3], [2, 1, 1]).unwrap();
        assert_eq!(hex.num_cells(), 2);
        assert_eq!(hex.num_nodes(), 12);
        assert!(hex.facet_neighbor(0, 1).is_some());
    }

    #[test]
    fn partition_adds_aura_and_min_owner() {
        let b = StructuredBox::new_2d(4, 1, [0.0, 0.0], [4.0, 1.0], StructuredCellType::Quadrilateral)
            .unwrap();
        let r0 = b.build_partitioned(0, 2).unwrap();
        let r1 = b.build_partitioned(1, 2).unwrap();
        // rank 0 owns columns 0,1 and sees column 2 as aura
        assert_eq!(r0.num_cells(), 3);
        assert_eq!(r0.owned_cells().count(), 2);
        assert_eq!(r1.num_cells(), 3);
        // node at x = 2 touches columns 1 and 2 and belongs to rank 0
        let id = crate::topology::point::PointId::new(3).unwrap();
        let n0 = r0.node_index(id).unwrap();
        let n1 = r1.node_index(id).unwrap();
        assert_eq!(r0.node_owner(n0).unwrap(), 0);
        assert_eq!(r1.node_owner(n1).unwrap(), 0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(StructuredBox::new_2d(0, 1, [0.0; 2], [1.0; 2], StructuredCellType::Triangle).is_err());
        assert!(
            StructuredBox::new_2d(1, 1, [0.0; 2], [1.0; 2], StructuredCellType::Hexahedron).is_err()
        );
    }
}
