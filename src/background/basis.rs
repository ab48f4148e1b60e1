//! Basis interpolation accessors.
//!
//! An [`InterpolationBasis`] says which basis functions live on which support
//! cell, who owns each basis function, and how a point of a background cell
//! is interpolated from them ([`BaseInterpolation`], a T-matrix row). The
//! enrichment engine only talks to this trait.
//!
//! Two implementations are provided: [`LagrangeBasis`], whose basis
//! functions are the background nodes and whose support cells are the
//! background cells, and [`CoarseLagrangeBasis`], a bilinear/trilinear basis
//! on a coarser structured grid laid over a rectilinear background.

use crate::background::mesh::BackgroundMesh;
use crate::geometry::shape;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;
use std::collections::{BTreeMap, HashMap};

/// Interpolation of one point: basis ids, owners, and weights.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseInterpolation {
    /// Rank-local basis indices.
    pub basis_indices: Vec<usize>,
    pub basis_ids: Vec<u64>,
    pub owners: Vec<usize>,
    pub weights: Vec<f64>,
}

impl BaseInterpolation {
    pub fn len(&self) -> usize {
        self.basis_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basis_indices.is_empty()
    }

    /// Sum of the weights; one for a partition-of-unity basis.
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

pub trait InterpolationBasis {
    fn num_bases(&self) -> usize;
    fn basis_id(&self, basis: usize) -> Result<u64, MeshError>;
    fn basis_owner(&self, basis: usize) -> Result<usize, MeshError>;
    fn basis_index(&self, id: u64) -> Result<usize, MeshError>;

    /// Number of cells the basis is defined on (its enrichment cells).
    fn num_support_cells(&self) -> usize;
    /// Global id of a support cell.
    fn support_cell_id(&self, cell: usize) -> Result<u64, MeshError>;
    /// Support cell containing a background cell.
    fn support_cell_of(&self, background_cell: usize) -> Result<usize, MeshError>;
    /// Bases with support on a support cell, in that cell's vertex order.
    fn cell_bases(&self, cell: usize) -> Result<&[usize], MeshError>;

    /// Interpolation of the parametric point `xi` of a background cell.
    fn interpolate(
        &self,
        mesh: &BackgroundMesh,
        background_cell: usize,
        xi: &[f64; 3],
    ) -> Result<BaseInterpolation, MeshError>;
}

fn out_of_bounds(what: &'static str, index: usize, len: usize) -> MeshError {
    MeshError::IndexOutOfBounds { what, index, len }
}

/// Nodal first-order basis of the background mesh.
#[derive(Clone, Debug)]
pub struct LagrangeBasis {
    node_ids: Vec<u64>,
    owners: Vec<usize>,
    index: HashMap<u64, usize>,
    cell_ids: Vec<u64>,
    cell_nodes: Vec<Vec<usize>>,
    topologies: Vec<CellTopology>,
}

impl LagrangeBasis {
    pub fn new(mesh: &BackgroundMesh) -> Result<Self, MeshError> {
        let mut node_ids = Vec::with_capacity(mesh.num_nodes());
        let mut owners = Vec::with_capacity(mesh.num_nodes());
        for n in 0..mesh.num_nodes() {
            node_ids.push(mesh.node_id(n)?.get());
            owners.push(mesh.node_owner(n)?);
        }
        let index = node_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut cell_ids = Vec::with_capacity(mesh.num_cells());
        let mut cell_nodes = Vec::with_capacity(mesh.num_cells());
        let mut topologies = Vec::with_capacity(mesh.num_cells());
        for c in 0..mesh.num_cells() {
            cell_ids.push(mesh.cell_id(c)?.get());
            cell_nodes.push(mesh.cell_nodes(c)?.to_vec());
            topologies.push(mesh.cell_topology(c)?);
        }
        Ok(Self {
            node_ids,
            owners,
            index,
            cell_ids,
            cell_nodes,
            topologies,
        })
    }
}

impl InterpolationBasis for LagrangeBasis {
    fn num_bases(&self) -> usize {
        self.node_ids.len()
    }

    fn basis_id(&self, basis: usize) -> Result<u64, MeshError> {
        self.node_ids
            .get(basis)
            .copied()
            .ok_or_else(|| out_of_bounds("basis", basis, self.node_ids.len()))
    }

    fn basis_owner(&self, basis: usize) -> Result<usize, MeshError> {
        self.owners
            .get(basis)
            .copied()
            .ok_or_else(|| out_of_bounds("basis", basis, self.owners.len()))
    }

    fn basis_index(&self, id: u64) -> Result<usize, MeshError> {
        self.index.get(&id).copied().ok_or(MeshError::UnknownBasis(id))
    }

    fn num_support_cells(&self) -> usize {
        self.cell_ids.len()
    }

    fn support_cell_id(&self, cell: usize) -> Result<u64, MeshError> {
        self.cell_ids
            .get(cell)
            .copied()
            .ok_or_else(|| out_of_bounds("support cell", cell, self.cell_ids.len()))
    }

    fn support_cell_of(&self, background_cell: usize) -> Result<usize, MeshError> {
        if background_cell < self.cell_ids.len() {
            Ok(background_cell)
        } else {
            Err(out_of_bounds("cell", background_cell, self.cell_ids.len()))
        }
    }

    fn cell_bases(&self, cell: usize) -> Result<&[usize], MeshError> {
        self.cell_nodes
            .get(cell)
            .map(Vec::as_slice)
            .ok_or_else(|| out_of_bounds("support cell", cell, self.cell_nodes.len()))
    }

    fn interpolate(
        &self,
        _mesh: &BackgroundMesh,
        background_cell: usize,
        xi: &[f64; 3],
    ) -> Result<BaseInterpolation, MeshError> {
        let nodes = self.cell_bases(background_cell)?;
        let weights = shape::shape_values(self.topologies[background_cell], xi);
        Ok(BaseInterpolation {
            basis_indices: nodes.to_vec(),
            basis_ids: nodes.iter().map(|&n| self.node_ids[n]).collect(),
            owners: nodes.iter().map(|&n| self.owners[n]).collect(),
            weights,
        })
    }
}

/// Structured grid carrying a coarse basis.
#[derive(Clone, Debug, PartialEq)]
pub struct CoarseGrid {
    pub min: [f64; 3],
    pub max: [f64; 3],
    /// Cells per direction; `cells[2]` is ignored in 2D.
    pub cells: [usize; 3],
}

impl CoarseGrid {
    fn spacing(&self, d: usize) -> f64 {
        (self.max[d] - self.min[d]) / self.cells[d] as f64
    }
}

/// Bilinear (2D) or trilinear (3D) basis on a [`CoarseGrid`].
///
/// Every background cell must lie inside one coarse cell; it is assigned by
/// its centroid. A coarse basis is owned by the owner of the coincident
/// background node when one exists on this rank, otherwise by the lowest
/// owner among the local background cells in its coarse cells.
#[derive(Clone, Debug)]
pub struct CoarseLagrangeBasis {
    grid: CoarseGrid,
    topology: CellTopology,
    node_ids: Vec<u64>,
    owners: Vec<usize>,
    node_index: HashMap<u64, usize>,
    cell_ids: Vec<u64>,
    cell_bounds: Vec<([f64; 3], [f64; 3])>,
    cell_bases: Vec<Vec<usize>>,
    background_to_coarse: Vec<usize>,
}

impl CoarseLagrangeBasis {
    pub fn new(mesh: &BackgroundMesh, grid: CoarseGrid) -> Result<Self, MeshError> {
        let dim = mesh.dimension();
        let topology = match dim {
            2 => CellTopology::Quad4,
            3 => CellTopology::Hex8,
            d => {
                return Err(MeshError::DimensionMismatch {
                    expected: 3,
                    found: d,
                });
            }
        };
        if (0..dim).any(|d| grid.cells[d] == 0 || !(grid.max[d] > grid.min[d])) {
            return Err(MeshError::InvalidConfig("coarse grid must be non-empty".into()));
        }
        let counts = [
            grid.cells[0] + 1,
            grid.cells[1] + 1,
            if dim == 3 { grid.cells[2] + 1 } else { 1 },
        ];
        let node_id = |ijk: [usize; 3]| (ijk[0] + counts[0] * (ijk[1] + counts[1] * ijk[2])) as u64 + 1;

        // coarse cell of every background cell, by centroid
        let mut cell_of_bg = Vec::with_capacity(mesh.num_cells());
        let mut coarse_cells: BTreeMap<u64, [usize; 3]> = BTreeMap::new();
        for c in 0..mesh.num_cells() {
            let x = shape::centroid(&mesh.cell_coords(c)?);
            let mut ijk = [0usize; 3];
            for d in 0..dim {
                let q = ((x[d] - grid.min[d]) / grid.spacing(d)).floor();
                if q < 0.0 || q >= grid.cells[d] as f64 {
                    return Err(MeshError::InvalidGeometry(format!(
                        "background cell {} lies outside the coarse grid",
                        mesh.cell_id(c)?
                    )));
                }
                ijk[d] = q as usize;
            }
            let id = (ijk[0] + grid.cells[0] * (ijk[1] + grid.cells[1] * ijk[2])) as u64 + 1;
            coarse_cells.insert(id, ijk);
            cell_of_bg.push(id);
        }

        // background nodes sitting on coarse grid nodes
        let mut coincident: HashMap<[usize; 3], usize> = HashMap::new();
        for n in 0..mesh.num_nodes() {
            let x = mesh.node_coords(n)?;
            let mut ijk = [0usize; 3];
            let mut on_grid = true;
            for d in 0..dim {
                let q = (x[d] - grid.min[d]) / grid.spacing(d);
                let r = q.round();
                on_grid &= (q - r).abs() < 1e-8 && r >= 0.0;
                ijk[d] = r.max(0.0) as usize;
            }
            if on_grid {
                coincident.insert(ijk, n);
            }
        }

        let mut fallback_owner: HashMap<u64, usize> = HashMap::new();
        for (c, &coarse) in cell_of_bg.iter().enumerate() {
            let owner = mesh.cell_owner(c)?;
            let e = fallback_owner.entry(coarse).or_insert(owner);
            *e = (*e).min(owner);
        }

        let mut node_ids = Vec::new();
        let mut owners = Vec::new();
        let mut node_index = HashMap::new();
        let mut cell_ids = Vec::with_capacity(coarse_cells.len());
        let mut cell_bounds = Vec::with_capacity(coarse_cells.len());
        let mut cell_bases = Vec::with_capacity(coarse_cells.len());
        let mut node_fallback: HashMap<u64, usize> = HashMap::new();
        for (&cid, ijk) in &coarse_cells {
            let refs = topology.reference_vertices();
            let mut bases = Vec::with_capacity(refs.len());
            for r in refs {
                let mut v = *ijk;
                for d in 0..dim {
                    if r[d] > 0.0 {
                        v[d] += 1;
                    }
                }
                let nid = node_id(v);
                let owner = fallback_owner[&cid];
                let f = node_fallback.entry(nid).or_insert(owner);
                *f = (*f).min(owner);
                let idx = *node_index.entry(nid).or_insert_with(|| {
                    node_ids.push(nid);
                    owners.push(usize::MAX);
                    node_ids.len() - 1
                });
                if let Some(&bg) = coincident.get(&v) {
                    owners[idx] = mesh.node_owner(bg)?;
                }
                bases.push(idx);
            }
            let mut lo = [0.0; 3];
            let mut hi = [0.0; 3];
            for d in 0..dim {
                lo[d] = grid.min[d] + grid.spacing(d) * ijk[d] as f64;
                hi[d] = lo[d] + grid.spacing(d);
            }
            cell_ids.push(cid);
            cell_bounds.push((lo, hi));
            cell_bases.push(bases);
        }
        for (idx, owner) in owners.iter_mut().enumerate() {
            if *owner == usize::MAX {
                *owner = node_fallback[&node_ids[idx]];
            }
        }
        let position: HashMap<u64, usize> =
            cell_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let background_to_coarse = cell_of_bg.iter().map(|id| position[id]).collect();
        log::debug!(
            "coarse basis: {} cells, {} bases over {} background cells",
            cell_ids.len(),
            node_ids.len(),
            mesh.num_cells()
        );
        Ok(Self {
            grid,
            topology,
            node_ids,
            owners,
            node_index,
            cell_ids,
            cell_bounds,
            cell_bases,
            background_to_coarse,
        })
    }

    pub fn grid(&self) -> &CoarseGrid {
        &self.grid
    }

    pub fn topology(&self) -> CellTopology {
        self.topology
    }

    /// Lower and upper corner of a coarse cell.
    pub fn cell_bounds(&self, cell: usize) -> Result<([f64; 3], [f64; 3]), MeshError> {
        self.cell_bounds
            .get(cell)
            .copied()
            .ok_or_else(|| out_of_bounds("coarse cell", cell, self.cell_bounds.len()))
    }
}

impl InterpolationBasis for CoarseLagrangeBasis {
    fn num_bases(&self) -> usize {
        self.node_ids.len()
    }

    fn basis_id(&self, basis: usize) -> Result<u64, MeshError> {
        self.node_ids
            .get(basis)
            .copied()
            .ok_or_else(|| out_of_bounds("coarse basis", basis, self.node_ids.len()))
    }

    fn basis_owner(&self, basis: usize) -> Result<usize, MeshError> {
        self.owners
            .get(basis)
            .copied()
            .ok_or_else(|| out_of_bounds("coarse basis", basis, self.owners.len()))
    }

    fn basis_index(&self, id: u64) -> Result<usize, MeshError> {
        self.node_index.get(&id).copied().ok_or(MeshError::UnknownBasis(id))
    }

    fn num_support_cells(&self) -> usize {
        self.cell_ids.len()
    }

    fn support_cell_id(&self, cell: usize) -> Result<u64, MeshError> {
        self.cell_ids
            .get(cell)
            .copied()
            .ok_or_else(|| out_of_bounds("coarse cell", cell, self.cell_ids.len()))
    }

    fn support_cell_of(&self, background_cell: usize) -> Result<usize, MeshError> {
        self.background_to_coarse
            .get(background_cell)
            .copied()
            .ok_or_else(|| out_of_bounds("cell", background_cell, self.background_to_coarse.len()))
    }

    fn cell_bases(&self, cell: usize) -> Result<&[usize], MeshError> {
        self.cell_bases
            .get(cell)
            .map(Vec::as_slice)
            .ok_or_else(|| out_of_bounds("coarse cell", cell, self.cell_bases.len()))
    }

    fn interpolate(
        &self,
        mesh: &BackgroundMesh,
        background_cell: usize,
        xi: &[f64; 3],
    ) -> Result<BaseInterpolation, MeshError> {
        let x = shape::map_to_physical(
            mesh.cell_topology(background_cell)?,
            &mesh.cell_coords(background_cell)?,
            xi,
        )?;
        let coarse = self.support_cell_of(background_cell)?;
        let (lo, hi) = self.cell_bounds[coarse];
        let mut eta = [0.0; 3];
        for d in 0..self.topology.dimension() {
            eta[d] = 2.0 * (x[d] - lo[d]) / (hi[d] - lo[d]) - 1.0;
        }
        let bases = &self.cell_bases[coarse];
        Ok(BaseInterpolation {
            basis_indices: bases.clone(),
            basis_ids: bases.iter().map(|&b| self.node_ids[b]).collect(),
            owners: bases.iter().map(|&b| self.owners[b]).collect(),
            weights: shape::shape_values(self.topology, &eta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::meshgen::structured_quad_mesh;

    #[test]
    fn lagrange_interpolation_is_nodal() {
        let mesh = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
        let basis = LagrangeBasis::new(&mesh).unwrap();
        assert_eq!(basis.num_bases(), 6);
        let t = basis.interpolate(&mesh, 1, &[1.0, 1.0, 0.0]).unwrap();
        // vertex 2 of cell 1 is node (2,1), id 6
        let hit = t.weights.iter().position(|&w| (w - 1.0).abs() < 1e-14).unwrap();
        assert_eq!(t.basis_ids[hit], 6);
        assert!((t.weight_sum() - 1.0).abs() < 1e-14);
    }

    #[test]
    fn coarse_basis_reproduces_linear_fields() {
        let mesh = structured_quad_mesh([0.0, 0.0], [4.0, 2.0], [4, 2]).unwrap();
        let grid = CoarseGrid {
            min: [0.0, 0.0, 0.0],
            max: [4.0, 2.0, 0.0],
            cells: [2, 1, 1],
        };
        let basis = CoarseLagrangeBasis::new(&mesh, grid).unwrap();
        assert_eq!(basis.num_support_cells(), 2);
        assert_eq!(basis.num_bases(), 6);
        assert_eq!(basis.support_cell_of(0).unwrap(), 0);
        assert_eq!(basis.support_cell_of(3).unwrap(), 1);
        // x-coordinate of coarse nodes, interpolated at the center of background cell 5
        let t = basis.interpolate(&mesh, 5, &[0.0, 0.0, 0.0]).unwrap();
        let x: f64 = t
            .basis_ids
            .iter()
            .zip(&t.weights)
            .map(|(&id, w)| w * 2.0 * ((id - 1) % 3) as f64)
            .sum();
        assert!((x - 1.5).abs() < 1e-12);
        assert!(basis.basis_owner(0).unwrap() == 0);
    }
}
