//! Background mesh adapter.
//!
//! [`BackgroundMesh`] is the rank-local view of the uncut input mesh: node
//! coordinates, global id ↔ index maps, node and cell ownership, cell→node
//! and node→cell connectivity, and facet neighbours. It also carries the
//! mutable parent → child-mesh association that the decomposition fills in
//! and then freezes.

use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;
use crate::topology::ownership::PointOwnership;
use crate::topology::point::PointId;
use std::collections::HashMap;

/// Facet neighbour across one side of a cell.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FacetNeighbor {
    pub cell: usize,
    pub side: usize,
}

#[derive(Clone, Debug)]
pub struct BackgroundMesh {
    dimension: usize,
    node_ids: Vec<PointId>,
    node_coords: Vec<[f64; 3]>,
    node_index: HashMap<PointId, usize>,
    cell_ids: Vec<PointId>,
    cell_topologies: Vec<CellTopology>,
    cell_nodes: Vec<Vec<usize>>,
    cell_index: HashMap<PointId, usize>,
    node_ownership: PointOwnership,
    cell_ownership: PointOwnership,
    node_cells: Vec<Vec<usize>>,
    facet_neighbors: Vec<Vec<Option<FacetNeighbor>>>,
    child_of: Vec<Option<usize>>,
    children_finalized: bool,
}

/// Incremental construction of a [`BackgroundMesh`].
#[derive(Clone, Debug)]
pub struct BackgroundMeshBuilder {
    dimension: usize,
    my_rank: usize,
    nodes: Vec<(PointId, [f64; 3], usize)>,
    cells: Vec<(PointId, CellTopology, Vec<PointId>, usize)>,
}

impl BackgroundMeshBuilder {
    pub fn new(dimension: usize, my_rank: usize) -> Self {
        Self {
            dimension,
            my_rank,
            nodes: Vec::new(),
            cells: Vec::new(),
        }
    }

    pub fn add_node(&mut self, id: u64, coords: [f64; 3], owner: usize) -> Result<&mut Self, MeshError> {
        self.nodes.push((PointId::new(id)?, coords, owner));
        Ok(self)
    }

    pub fn add_cell(
        &mut self,
        id: u64,
        topology: CellTopology,
        nodes: &[u64],
        owner: usize,
    ) -> Result<&mut Self, MeshError> {
        let nodes = nodes
            .iter()
            .map(|&n| PointId::new(n))
            .collect::<Result<Vec<_>, _>>()?;
        self.cells.push((PointId::new(id)?, topology, nodes, owner));
        Ok(self)
    }

    /// Validate and build connectivity.
    pub fn build(self) -> Result<BackgroundMesh, MeshError> {
        if !(2..=3).contains(&self.dimension) {
            return Err(MeshError::InvalidGeometry(format!(
                "background dimension {} is not supported",
                self.dimension
            )));
        }
        let mut node_ids = Vec::with_capacity(self.nodes.len());
        let mut node_coords = Vec::with_capacity(self.nodes.len());
        let mut node_index = HashMap::with_capacity(self.nodes.len());
        let mut node_ownership = PointOwnership::new(self.my_rank);
        for (i, (id, x, owner)) in self.nodes.into_iter().enumerate() {
            if node_index.insert(id, i).is_some() {
                return Err(MeshError::InvalidGeometry(format!("duplicate node id {id}")));
            }
            node_ids.push(id);
            node_coords.push(x);
            node_ownership.set_owner(id, owner);
        }

        let mut cell_ids = Vec::with_capacity(self.cells.len());
        let mut cell_topologies = Vec::with_capacity(self.cells.len());
        let mut cell_nodes = Vec::with_capacity(self.cells.len());
        let mut cell_index = HashMap::with_capacity(self.cells.len());
        let mut cell_ownership = PointOwnership::new(self.my_rank);
        for (c, (id, topo, nodes, owner)) in self.cells.into_iter().enumerate() {
            if topo.dimension() != self.dimension {
                return Err(MeshError::DimensionMismatch {
                    expected: self.dimension,
                    found: topo.dimension(),
                });
            }
            if nodes.len() != topo.num_vertices() {
                return Err(MeshError::InvalidGeometry(format!(
                    "cell {id}: {topo:?} needs {} nodes, got {}",
                    topo.num_vertices(),
                    nodes.len()
                )));
            }
            if cell_index.insert(id, c).is_some() {
                return Err(MeshError::InvalidGeometry(format!("duplicate cell id {id}")));
            }
            let local = nodes
                .iter()
                .map(|n| node_index.get(n).copied().ok_or(MeshError::MissingNode(*n)))
                .collect::<Result<Vec<_>, _>>()?;
            cell_ids.push(id);
            cell_topologies.push(topo);
            cell_nodes.push(local);
            cell_ownership.set_owner(id, owner);
        }

        let mut mesh = BackgroundMesh {
            dimension: self.dimension,
            node_ids,
            node_coords,
            node_index,
            child_of: vec![None; cell_ids.len()],
            cell_ids,
            cell_topologies,
            cell_nodes,
            cell_index,
            node_ownership,
            cell_ownership,
            node_cells: Vec::new(),
            facet_neighbors: Vec::new(),
            children_finalized: false,
        };
        mesh.build_connectivity();
        Ok(mesh)
    }
}

impl BackgroundMesh {
    fn build_connectivity(&mut self) {
        let mut node_cells = vec![Vec::new(); self.node_ids.len()];
        for (c, nodes) in self.cell_nodes.iter().enumerate() {
            for &n in nodes {
                node_cells[n].push(c);
            }
        }

        let mut by_key: HashMap<Vec<u64>, Vec<(usize, usize)>> = HashMap::new();
        let mut neighbors = Vec::with_capacity(self.cell_ids.len());
        for c in 0..self.cell_ids.len() {
            let topo = self.cell_topologies[c];
            neighbors.push(vec![None; topo.num_sides()]);
            for side in 0..topo.num_sides() {
                by_key.entry(self.side_key(c, side)).or_default().push((c, side));
            }
        }
        for owners in by_key.values() {
            if let &[(a, sa), (b, sb)] = owners.as_slice() {
                neighbors[a][sa] = Some(FacetNeighbor { cell: b, side: sb });
                neighbors[b][sb] = Some(FacetNeighbor { cell: a, side: sa });
            } else if owners.len() > 2 {
                log::warn!("facet shared by {} cells; treating as boundary", owners.len());
            }
        }
        self.node_cells = node_cells;
        self.facet_neighbors = neighbors;
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_ids.len()
    }

    pub fn my_rank(&self) -> usize {
        self.node_ownership.my_rank()
    }

    pub fn node_id(&self, node: usize) -> Result<PointId, MeshError> {
        self.node_ids.get(node).copied().ok_or(MeshError::IndexOutOfBounds {
            what: "node",
            index: node,
            len: self.node_ids.len(),
        })
    }

    pub fn node_index(&self, id: PointId) -> Result<usize, MeshError> {
        self.node_index.get(&id).copied().ok_or(MeshError::MissingNode(id))
    }

    pub fn node_coords(&self, node: usize) -> Result<[f64; 3], MeshError> {
        self.node_coords
            .get(node)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                what: "node",
                index: node,
                len: self.node_coords.len(),
            })
    }

    pub fn cell_id(&self, cell: usize) -> Result<PointId, MeshError> {
        self.cell_ids.get(cell).copied().ok_or(MeshError::IndexOutOfBounds {
            what: "cell",
            index: cell,
            len: self.cell_ids.len(),
        })
    }

    pub fn cell_index(&self, id: PointId) -> Result<usize, MeshError> {
        self.cell_index.get(&id).copied().ok_or(MeshError::MissingCell(id))
    }

    pub fn cell_topology(&self, cell: usize) -> Result<CellTopology, MeshError> {
        self.cell_topologies
            .get(cell)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                what: "cell",
                index: cell,
                len: self.cell_topologies.len(),
            })
    }

    /// Local node indices of a cell in reference-vertex order.
    pub fn cell_nodes(&self, cell: usize) -> Result<&[usize], MeshError> {
        self.cell_nodes
            .get(cell)
            .map(Vec::as_slice)
            .ok_or(MeshError::IndexOutOfBounds {
                what: "cell",
                index: cell,
                len: self.cell_nodes.len(),
            })
    }

    pub fn cell_coords(&self, cell: usize) -> Result<Vec<[f64; 3]>, MeshError> {
        self.cell_nodes(cell)?
            .iter()
            .map(|&n| self.node_coords(n))
            .collect()
    }

    pub fn node_cells(&self, node: usize) -> Result<&[usize], MeshError> {
        self.node_cells
            .get(node)
            .map(Vec::as_slice)
            .ok_or(MeshError::IndexOutOfBounds {
                what: "node",
                index: node,
                len: self.node_cells.len(),
            })
    }

    pub fn node_owner(&self, node: usize) -> Result<usize, MeshError> {
        self.node_ownership.owner(self.node_id(node)?)
    }

    pub fn cell_owner(&self, cell: usize) -> Result<usize, MeshError> {
        self.cell_ownership.owner(self.cell_id(cell)?)
    }

    pub fn is_cell_owned(&self, cell: usize) -> bool {
        self.cell_id(cell)
            .is_ok_and(|id| self.cell_ownership.is_owned(id))
    }

    /// Owned cells in ascending index order.
    pub fn owned_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_cells()).filter(|&c| self.is_cell_owned(c))
    }

    /// Cell across `side`, if it is present on this rank.
    pub fn facet_neighbor(&self, cell: usize, side: usize) -> Option<FacetNeighbor> {
        self.facet_neighbors
            .get(cell)
            .and_then(|sides| sides.get(side).copied().flatten())
    }

    /// Sorted global node ids of a side; identical for both cells sharing it.
    pub fn side_key(&self, cell: usize, side: usize) -> Vec<u64> {
        let topo = self.cell_topologies[cell];
        let mut key: Vec<u64> = topo.sides()[side]
            .iter()
            .map(|&v| self.node_ids[self.cell_nodes[cell][v]].get())
            .collect();
        key.sort_unstable();
        key
    }

    /// Largest node id present on this rank.
    pub fn max_local_node_id(&self) -> u64 {
        self.node_ids.iter().map(|id| id.get()).max().unwrap_or(0)
    }

    /// Child mesh registered for `cell`, if any.
    pub fn child_of(&self, cell: usize) -> Option<usize> {
        self.child_of.get(cell).copied().flatten()
    }

    pub fn set_child(&mut self, cell: usize, child: usize) -> Result<(), MeshError> {
        if self.children_finalized {
            return Err(MeshError::AlreadyFinalized("parent/child links"));
        }
        let len = self.child_of.len();
        let slot = self.child_of.get_mut(cell).ok_or(MeshError::IndexOutOfBounds {
            what: "cell",
            index: cell,
            len,
        })?;
        *slot = Some(child);
        Ok(())
    }

    /// Freeze the parent/child links.
    pub fn finalize_children(&mut self) {
        self.children_finalized = true;
    }

    pub fn children_finalized(&self) -> bool {
        self.children_finalized
    }

    /// Parent links of intersected cells, ascending by cell.
    pub fn intersected_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.child_of
            .iter()
            .enumerate()
            .filter_map(|(c, child)| child.map(|m| (c, m)))
    }
}
