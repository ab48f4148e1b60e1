//! Conforming simplex decomposition of one intersected parent cell.
//!
//! A [`ChildMesh`] is populated in stages: the subdivision template, then one
//! conforming pass per geometry, then phase and subphase tagging. After
//! [`ChildMesh::finalize`] it is read-only.
//!
//! Vertices are stored as handles into the rank's
//! [`VertexTable`](crate::cut::vertex::VertexTable) together with their
//! parametric coordinates in the parent's reference frame.

use crate::debug_invariants::DebugInvariants;
use crate::geometry::shape;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;
use crate::topology::point::PointId;
use std::collections::HashMap;

/// Parametric tolerance for deciding that a child facet lies on a parent side.
pub const SIDE_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Debug)]
pub struct ChildMesh {
    parent: usize,
    parent_id: PointId,
    parent_topology: CellTopology,
    topology: CellTopology,
    vertices: Vec<usize>,
    local: HashMap<usize, usize>,
    param_coords: Vec<[f64; 3]>,
    connectivity: Vec<usize>,
    element_phase: Vec<usize>,
    element_subphase: Vec<usize>,
    subphase_phase: Vec<usize>,
    finalized: bool,
}

impl ChildMesh {
    pub fn new(
        parent: usize,
        parent_id: PointId,
        parent_topology: CellTopology,
    ) -> Result<Self, MeshError> {
        let topology = CellTopology::simplex_of_dimension(parent_topology.dimension())
            .ok_or(MeshError::UnsupportedTopology(parent_topology))?;
        Ok(Self {
            parent,
            parent_id,
            parent_topology,
            topology,
            vertices: Vec::new(),
            local: HashMap::new(),
            param_coords: Vec::new(),
            connectivity: Vec::new(),
            element_phase: Vec::new(),
            element_subphase: Vec::new(),
            subphase_phase: Vec::new(),
            finalized: false,
        })
    }

    fn check_mutable(&self) -> Result<(), MeshError> {
        if self.finalized {
            Err(MeshError::AlreadyFinalized("child mesh"))
        } else {
            Ok(())
        }
    }

    /// Background cell index of the parent.
    pub fn parent(&self) -> usize {
        self.parent
    }

    pub fn parent_id(&self) -> PointId {
        self.parent_id
    }

    pub fn parent_topology(&self) -> CellTopology {
        self.parent_topology
    }

    /// Topology of the child elements.
    pub fn topology(&self) -> CellTopology {
        self.topology
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Add a vertex (or return the local index it already has).
    pub fn add_vertex(&mut self, handle: usize, xi: [f64; 3]) -> Result<usize, MeshError> {
        self.check_mutable()?;
        if let Some(&l) = self.local.get(&handle) {
            return Ok(l);
        }
        let l = self.vertices.len();
        self.vertices.push(handle);
        self.param_coords.push(xi);
        self.local.insert(handle, l);
        Ok(l)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn local_index(&self, handle: usize) -> Option<usize> {
        self.local.get(&handle).copied()
    }

    pub fn vertex_handles(&self) -> &[usize] {
        &self.vertices
    }

    pub fn vertex_handle(&self, local: usize) -> Result<usize, MeshError> {
        self.vertices.get(local).copied().ok_or(MeshError::IndexOutOfBounds {
            what: "child vertex",
            index: local,
            len: self.vertices.len(),
        })
    }

    pub fn param_coords(&self, local: usize) -> Result<[f64; 3], MeshError> {
        self.param_coords
            .get(local)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                what: "child vertex",
                index: local,
                len: self.param_coords.len(),
            })
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.len() / self.topology.num_vertices()
    }

    /// Local vertex indices of element `e`.
    pub fn element(&self, e: usize) -> Result<&[usize], MeshError> {
        let n = self.topology.num_vertices();
        self.connectivity
            .get(e * n..(e + 1) * n)
            .ok_or(MeshError::IndexOutOfBounds {
                what: "child element",
                index: e,
                len: self.num_elements(),
            })
    }

    /// Vertex handles of element `e`.
    pub fn element_handles(&self, e: usize) -> Result<Vec<usize>, MeshError> {
        Ok(self.element(e)?.iter().map(|&l| self.vertices[l]).collect())
    }

    /// Replace the element list (local indices, simplex vertex order).
    pub fn set_elements(&mut self, elements: Vec<Vec<usize>>) -> Result<(), MeshError> {
        self.check_mutable()?;
        let n = self.topology.num_vertices();
        let mut flat = Vec::with_capacity(elements.len() * n);
        for el in elements {
            if el.len() != n || el.iter().any(|&l| l >= self.vertices.len()) {
                return Err(MeshError::InvalidGeometry(format!(
                    "child element {el:?} does not fit {:?} with {} vertices",
                    self.topology,
                    self.vertices.len()
                )));
            }
            flat.extend(el);
        }
        self.connectivity = flat;
        self.element_phase.clear();
        self.element_subphase.clear();
        self.subphase_phase.clear();
        Ok(())
    }

    pub fn set_phases(&mut self, phases: Vec<usize>) -> Result<(), MeshError> {
        self.check_mutable()?;
        if phases.len() != self.num_elements() {
            return Err(MeshError::DimensionMismatch {
                expected: self.num_elements(),
                found: phases.len(),
            });
        }
        self.element_phase = phases;
        Ok(())
    }

    pub fn element_phase(&self, e: usize) -> Result<usize, MeshError> {
        self.element_phase
            .get(e)
            .copied()
            .ok_or(MeshError::NotFinalized("child element phase"))
    }

    /// Record the subphase ordinal of every element and the phase of every subphase.
    pub fn set_subphases(
        &mut self,
        element_subphase: Vec<usize>,
        subphase_phase: Vec<usize>,
    ) -> Result<(), MeshError> {
        self.check_mutable()?;
        if element_subphase.len() != self.num_elements() {
            return Err(MeshError::DimensionMismatch {
                expected: self.num_elements(),
                found: element_subphase.len(),
            });
        }
        self.element_subphase = element_subphase;
        self.subphase_phase = subphase_phase;
        Ok(())
    }

    pub fn element_subphase(&self, e: usize) -> Result<usize, MeshError> {
        self.element_subphase
            .get(e)
            .copied()
            .ok_or(MeshError::NotFinalized("child element subphase"))
    }

    pub fn num_subphases(&self) -> usize {
        self.subphase_phase.len()
    }

    pub fn subphase_phase(&self, ordinal: usize) -> Result<usize, MeshError> {
        self.subphase_phase
            .get(ordinal)
            .copied()
            .ok_or(MeshError::NotFinalized("child subphase"))
    }

    /// Elements of a subphase, ascending.
    pub fn subphase_elements(&self, ordinal: usize) -> Vec<usize> {
        self.element_subphase
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ordinal)
            .map(|(e, _)| e)
            .collect()
    }

    pub fn finalize(&mut self) -> Result<(), MeshError> {
        if self.element_phase.len() != self.num_elements()
            || self.element_subphase.len() != self.num_elements()
        {
            return Err(MeshError::NotFinalized("child mesh phase tagging"));
        }
        self.finalized = true;
        self.debug_assert_invariants();
        Ok(())
    }

    /// Elements sharing each facet, keyed by sorted vertex handles.
    pub fn facet_map(&self) -> HashMap<Vec<usize>, Vec<usize>> {
        let mut map: HashMap<Vec<usize>, Vec<usize>> = HashMap::new();
        for e in 0..self.num_elements() {
            let verts = &self.connectivity
                [e * self.topology.num_vertices()..(e + 1) * self.topology.num_vertices()];
            for side in self.topology.sides() {
                let mut key: Vec<usize> = side.iter().map(|&s| self.vertices[verts[s]]).collect();
                key.sort_unstable();
                map.entry(key).or_default().push(e);
            }
        }
        map
    }

    /// Facet-neighbour lists of the child elements.
    pub fn element_neighbors(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.num_elements()];
        for elems in self.facet_map().into_values() {
            if let &[a, b] = elems.as_slice() {
                out[a].push(b);
                out[b].push(a);
            }
        }
        for n in &mut out {
            n.sort_unstable();
        }
        out
    }

    /// Child facets lying on parent side `side`, as `(element, sorted handles)`.
    pub fn side_facets(&self, side: usize) -> Result<Vec<(usize, Vec<usize>)>, MeshError> {
        if side >= self.parent_topology.num_sides() {
            return Err(MeshError::IndexOutOfBounds {
                what: "parent side",
                index: side,
                len: self.parent_topology.num_sides(),
            });
        }
        let on_side = |l: usize| {
            self.parent_topology
                .side_distance(side, &self.param_coords[l])
                .is_some_and(|d| d.abs() <= SIDE_TOLERANCE)
        };
        let mut out = Vec::new();
        for e in 0..self.num_elements() {
            let verts = self.element(e)?;
            for s in self.topology.sides() {
                if s.iter().all(|&i| on_side(verts[i])) {
                    let mut key: Vec<usize> = s.iter().map(|&i| self.vertices[verts[i]]).collect();
                    key.sort_unstable();
                    out.push((e, key));
                }
            }
        }
        Ok(out)
    }

    /// Signed measure of an element in the parent's parametric frame.
    pub fn element_param_measure(&self, e: usize) -> Result<f64, MeshError> {
        let pts: Vec<[f64; 3]> = self
            .element(e)?
            .iter()
            .map(|&l| self.param_coords[l])
            .collect();
        shape::simplex_measure(&pts)
    }
}

impl DebugInvariants for ChildMesh {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        if self.vertices.len() != self.param_coords.len() {
            return Err(MeshError::DimensionMismatch {
                expected: self.vertices.len(),
                found: self.param_coords.len(),
            });
        }
        if self.connectivity.len() % self.topology.num_vertices() != 0 {
            return Err(MeshError::InvalidGeometry(format!(
                "child of cell {}: ragged connectivity",
                self.parent_id
            )));
        }
        if let Some(&l) = self.connectivity.iter().find(|&&l| l >= self.vertices.len()) {
            return Err(MeshError::IndexOutOfBounds {
                what: "child vertex",
                index: l,
                len: self.vertices.len(),
            });
        }
        if let Some(&s) = self
            .element_subphase
            .iter()
            .find(|&&s| s >= self.subphase_phase.len())
        {
            return Err(MeshError::IndexOutOfBounds {
                what: "child subphase",
                index: s,
                len: self.subphase_phase.len(),
            });
        }
        for e in 0..self.num_elements() {
            if self.element_param_measure(e)? < 0.0 {
                return Err(MeshError::InvalidGeometry(format!(
                    "child of cell {}: element {e} is inverted",
                    self.parent_id
                )));
            }
        }
        Ok(())
    }
}
