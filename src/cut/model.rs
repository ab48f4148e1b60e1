//! Decomposition driver: background mesh + geometries → [`CutMesh`].
//!
//! `decompose` runs the stages in order:
//! 1. ingest the background nodes into the geometry engine,
//! 2. per geometry, template every newly intersected parent and split the
//!    child simplices crossed by that geometry's interface,
//! 3. agree on global ids of the created vertices (collective),
//! 4. tag child elements and uncut parents with a phase index,
//! 5. flood-fill subphases and finalize the child meshes and parent links.
//!
//! Child meshes only depend on data local to their parent cell and on
//! [`VertexKey`]s, so every rank holding a parent builds the same child.

use std::collections::HashMap;

use crate::algs::communicator::Communicator;
use crate::algs::context::ParallelContext;
use crate::background::mesh::BackgroundMesh;
use crate::config::DecompositionConfig;
use crate::cut::child_mesh::ChildMesh;
use crate::cut::conform::split_simplex;
use crate::cut::global_ids::{IdSummary, assign_global_ids};
use crate::cut::subphase::{Subphase, SubphaseKey, SubphaseTable, assign_subphases};
use crate::cut::templates::{self, TemplatePoint, template_elements, template_point_coords};
use crate::cut::vertex::{CutVertex, VertexKey, VertexOrigin, VertexTable};
use crate::geometry::engine::GeometryEngine;
use crate::geometry::level_set::Geometry;
use crate::geometry::shape;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;

/// Owns the geometry engine until the decomposition hands it to the cut mesh.
pub struct DecompositionModel {
    engine: GeometryEngine,
}

impl DecompositionModel {
    pub fn new(engine: GeometryEngine) -> Self {
        Self { engine }
    }

    /// Shorthand for `DecompositionModel::new(GeometryEngine::new(..)?)`.
    pub fn with_geometries(
        geometries: Vec<Box<dyn Geometry>>,
        config: DecompositionConfig,
    ) -> Result<Self, MeshError> {
        Ok(Self::new(GeometryEngine::new(geometries, config)?))
    }

    pub fn engine(&self) -> &GeometryEngine {
        &self.engine
    }

    /// Decompose `mesh` against every geometry. Collective over `ctx`.
    ///
    /// On return the parent → child links of `mesh` are set and frozen.
    pub fn decompose<C: Communicator>(
        self,
        mesh: &mut BackgroundMesh,
        ctx: &ParallelContext<C>,
    ) -> Result<CutMesh, MeshError> {
        if mesh.children_finalized() {
            return Err(MeshError::AlreadyFinalized("parent/child links"));
        }
        let mut engine = self.engine;
        engine.ingest_background(mesh)?;
        let nodes = (0..mesh.num_nodes())
            .map(|n| Ok((mesh.node_id(n)?, mesh.node_coords(n)?, mesh.node_owner(n)?)))
            .collect::<Result<Vec<_>, MeshError>>()?;
        let mut cutter = Cutter {
            engine,
            vertices: VertexTable::with_background(nodes),
        };
        let mut children: Vec<ChildMesh> = Vec::new();
        let mut cell_child: Vec<Option<usize>> = vec![None; mesh.num_cells()];

        // 1-2. seed, template, conform
        for g in 0..cutter.engine.num_geometries() {
            cutter.engine.set_active_geometry(g)?;
            let mut cut_cells = 0;
            let mut created = 0;
            for cell in 0..mesh.num_cells() {
                let rows = mesh.cell_nodes(cell)?;
                if !cutter.engine.is_intersected(rows)? {
                    continue;
                }
                let idx = match cell_child[cell] {
                    Some(idx) => idx,
                    None => {
                        let child = cutter.template_child(mesh, cell)?;
                        let idx = children.len();
                        children.push(child);
                        cell_child[cell] = Some(idx);
                        mesh.set_child(cell, idx)?;
                        idx
                    }
                };
                created += cutter.conform(mesh, &mut children[idx], g)?;
                cut_cells += 1;
            }
            log::debug!(
                "geometry {g}: {cut_cells} intersected cells, {created} interface vertices"
            );
        }

        // 3. global ids
        let mut used_by_owned = vec![false; cutter.vertices.len()];
        for child in &children {
            if mesh.is_cell_owned(child.parent()) {
                for &h in child.vertex_handles() {
                    used_by_owned[h] = true;
                }
            }
        }
        let ids = assign_global_ids(
            &mut cutter.vertices,
            &used_by_owned,
            mesh.max_local_node_id(),
            ctx,
        )?;

        // 4. phases
        let mut anomalies = 0;
        for child in &mut children {
            let mut phases = Vec::with_capacity(child.num_elements());
            for e in 0..child.num_elements() {
                let rows = child
                    .element_handles(e)?
                    .into_iter()
                    .map(|h| cutter.vertices.get(h).map(|v| v.row))
                    .collect::<Result<Vec<_>, _>>()?;
                let class = cutter.engine.classify_entity(&rows)?;
                anomalies += usize::from(class.anomalous);
                phases.push(class.phase);
            }
            child.set_phases(phases)?;
        }
        let mut cell_phase = vec![None; mesh.num_cells()];
        for (cell, slot) in cell_phase.iter_mut().enumerate() {
            if cell_child[cell].is_none() {
                let class = cutter.engine.classify_entity(mesh.cell_nodes(cell)?)?;
                anomalies += usize::from(class.anomalous);
                *slot = Some(class.phase);
            }
        }

        // 5. subphases and freeze
        for child in &mut children {
            assign_subphases(child)?;
            child.finalize()?;
        }
        let mut per_cell = Vec::with_capacity(mesh.num_cells());
        for cell in 0..mesh.num_cells() {
            let id = mesh.cell_id(cell)?;
            let list = match (cell_child[cell], cell_phase[cell]) {
                (Some(idx), _) => {
                    let child = &children[idx];
                    (0..child.num_subphases())
                        .map(|ordinal| {
                            Ok(Subphase {
                                key: SubphaseKey { cell: id, ordinal },
                                cell,
                                phase: child.subphase_phase(ordinal)?,
                                child: Some(idx),
                            })
                        })
                        .collect::<Result<Vec<_>, MeshError>>()?
                }
                (None, phase) => vec![Subphase {
                    key: SubphaseKey { cell: id, ordinal: 0 },
                    cell,
                    phase: phase.unwrap_or(0),
                    child: None,
                }],
            };
            per_cell.push(list);
        }
        let subphases = SubphaseTable::from_cells(per_cell)?;
        mesh.finalize_children();

        if anomalies > 0 {
            log::warn!("{anomalies} entities had no node off an interface and default to inside");
        }
        log::debug!(
            "rank {}: {} child meshes, {} subphases, {} vertices ({} created)",
            ctx.rank(),
            children.len(),
            subphases.len(),
            cutter.vertices.len(),
            cutter.vertices.len() - cutter.vertices.num_background()
        );
        Ok(CutMesh {
            dimension: mesh.dimension(),
            engine: cutter.engine,
            vertices: cutter.vertices,
            children,
            cell_child,
            cell_phase,
            subphases,
            ids,
            anomalies,
        })
    }
}

/// Mutable state shared by the template and conforming passes.
struct Cutter {
    engine: GeometryEngine,
    vertices: VertexTable,
}

impl Cutter {
    fn template_child(&mut self, mesh: &BackgroundMesh, cell: usize) -> Result<ChildMesh, MeshError> {
        let topology = mesh.cell_topology(cell)?;
        let cell_id = mesh.cell_id(cell)?;
        let nodes = mesh.cell_nodes(cell)?.to_vec();
        let coords = mesh.cell_coords(cell)?;
        let mut child = ChildMesh::new(cell, cell_id, topology)?;
        let mut elements = Vec::new();
        for template in template_elements(topology) {
            let mut local = Vec::with_capacity(template.len());
            for point in template {
                let xi = template_point_coords(topology, point)?;
                let handle = match point {
                    TemplatePoint::Parent(v) => nodes[v],
                    TemplatePoint::FaceCenter(s) => self.template_vertex(
                        VertexKey::FaceCenter(mesh.side_key(cell, s)),
                        topology,
                        &nodes,
                        &coords,
                        xi,
                    )?,
                    TemplatePoint::CellCenter => self.template_vertex(
                        VertexKey::CellCenter(cell_id.get()),
                        topology,
                        &nodes,
                        &coords,
                        xi,
                    )?,
                };
                local.push(child.add_vertex(handle, xi)?);
            }
            templates::orient(&mut local, |l| child.param_coords(l).unwrap_or_default())?;
            elements.push(local);
        }
        child.set_elements(elements)?;
        log::trace!("cell {cell_id}: {topology:?} template with {} elements", child.num_elements());
        Ok(child)
    }

    fn template_vertex(
        &mut self,
        key: VertexKey,
        topology: CellTopology,
        nodes: &[usize],
        coords: &[[f64; 3]],
        xi: [f64; 3],
    ) -> Result<usize, MeshError> {
        let engine = &mut self.engine;
        let (handle, _) = self.vertices.get_or_insert_with(key.clone(), || {
            let x = shape::map_to_physical(topology, coords, &xi)?;
            let row = engine.admit_node(parent_weights(topology, nodes, &xi), x)?;
            Ok(CutVertex {
                key,
                coords: x,
                row,
                origin: VertexOrigin::Template,
                id: None,
                owner: None,
            })
        })?;
        Ok(handle)
    }

    /// Split the elements of `child` crossed by geometry `g`. Returns the
    /// number of interface vertices added to the child.
    fn conform(
        &mut self,
        mesh: &BackgroundMesh,
        child: &mut ChildMesh,
        g: usize,
    ) -> Result<usize, MeshError> {
        let parent = Parent {
            topology: child.parent_topology(),
            rows: mesh.cell_nodes(child.parent())?.to_vec(),
            coords: mesh.cell_coords(child.parent())?,
        };
        let threshold = self.engine.config().threshold;
        let elements = (0..child.num_elements())
            .map(|e| child.element(e).map(<[usize]>::to_vec))
            .collect::<Result<Vec<_>, _>>()?;
        let below = (0..child.num_vertices())
            .map(|l| {
                let row = self.vertices.get(child.vertex_handle(l)?)?.row;
                Ok(self.engine.evaluate_node_phase(row, g)? < threshold)
            })
            .collect::<Result<Vec<bool>, MeshError>>()?;

        let edges = child.topology().edges();
        let mut cuts: HashMap<(usize, usize), usize> = HashMap::new();
        for el in &elements {
            for &[i, j] in edges {
                let (a, b) = (el[i], el[j]);
                let edge = (a.min(b), a.max(b));
                if below[a] != below[b] && !cuts.contains_key(&edge) {
                    let l = self.interface_vertex(&parent, child, edge, g)?;
                    cuts.insert(edge, l);
                }
            }
        }
        if cuts.is_empty() {
            return Ok(0);
        }

        let keys = child
            .vertex_handles()
            .iter()
            .map(|&h| self.vertices.get(h).map(|v| v.key.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut split = Vec::with_capacity(elements.len() * 2);
        for el in &elements {
            let flags: Vec<bool> = el.iter().map(|&l| below[l]).collect();
            let pieces = split_simplex(
                el,
                &flags,
                |a, b| cuts.get(&(a.min(b), a.max(b))).copied(),
                |l| &keys[l],
            )?;
            for mut piece in pieces {
                templates::orient(&mut piece, |l| child.param_coords(l).unwrap_or_default())?;
                split.push(piece);
            }
        }
        child.set_elements(split)?;
        Ok(cuts.len())
    }

    /// Interface vertex of geometry `g` on the child edge `(a, b)` (local
    /// indices); creates it unless a neighbour already did.
    fn interface_vertex(
        &mut self,
        parent: &Parent,
        child: &mut ChildMesh,
        (a, b): (usize, usize),
        g: usize,
    ) -> Result<usize, MeshError> {
        let (ha, hb) = (child.vertex_handle(a)?, child.vertex_handle(b)?);
        let (va, vb) = (self.vertices.get(ha)?, self.vertices.get(hb)?);
        let (ra, rb) = (va.row, vb.row);
        let key = VertexKey::interface(g, &va.key, &vb.key);
        let (xi_a, xi_b) = (child.param_coords(a)?, child.param_coords(b)?);

        let linear = self.engine.intersect_edge(ra, rb)?;
        if !linear.intersected {
            return Err(MeshError::InvalidGeometry(format!(
                "geometry {g} changes side across rows {ra} and {rb} without a strict sign change"
            )));
        }
        let refined = if parent.topology.is_simplex() {
            None
        } else {
            self.engine.refine_on_parent(
                parent.topology,
                &parent.rows,
                &xi_a,
                &xi_b,
                linear.fraction(),
            )?
        };
        let t = refined.unwrap_or_else(|| linear.fraction());
        let xi = shape::lerp(&xi_a, &xi_b, t);

        let engine = &mut self.engine;
        let (handle, _) = self.vertices.get_or_insert_with(key.clone(), || {
            let x = shape::map_to_physical(parent.topology, &parent.coords, &xi)?;
            let sensitivity = match refined {
                Some(t) => engine.compute_refined_sensitivity(
                    parent.topology,
                    &parent.rows,
                    &parent.coords,
                    &xi_a,
                    &xi_b,
                    t,
                )?,
                None => linear.sensitivity.clone(),
            };
            let row = engine.admit_interface_node(
                [ra, rb],
                t,
                x,
                parent_weights(parent.topology, &parent.rows, &xi),
                sensitivity,
            )?;
            Ok(CutVertex {
                key,
                coords: x,
                row,
                origin: VertexOrigin::Interface {
                    geometry: g,
                    edge: [ha, hb],
                    fraction: t,
                },
                id: None,
                owner: None,
            })
        })?;
        child.add_vertex(handle, xi)
    }
}

struct Parent {
    topology: CellTopology,
    rows: Vec<usize>,
    coords: Vec<[f64; 3]>,
}

/// Non-zero shape-function weights of a parent at `xi`, over its node rows.
fn parent_weights(topology: CellTopology, rows: &[usize], xi: &[f64; 3]) -> Vec<(usize, f64)> {
    shape::shape_values(topology, xi)
        .into_iter()
        .zip(rows)
        .filter(|(w, _)| *w != 0.0)
        .map(|(w, &r)| (r, w))
        .collect()
}

/// Result of a decomposition: child meshes, vertices, phases, and subphases.
pub struct CutMesh {
    dimension: usize,
    engine: GeometryEngine,
    vertices: VertexTable,
    children: Vec<ChildMesh>,
    cell_child: Vec<Option<usize>>,
    cell_phase: Vec<Option<usize>>,
    subphases: SubphaseTable,
    ids: IdSummary,
    anomalies: usize,
}

impl CutMesh {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn engine(&self) -> &GeometryEngine {
        &self.engine
    }

    pub fn vertices(&self) -> &VertexTable {
        &self.vertices
    }

    pub fn num_cells(&self) -> usize {
        self.cell_child.len()
    }

    pub fn children(&self) -> &[ChildMesh] {
        &self.children
    }

    pub fn child(&self, idx: usize) -> Result<&ChildMesh, MeshError> {
        self.children.get(idx).ok_or(MeshError::IndexOutOfBounds {
            what: "child mesh",
            index: idx,
            len: self.children.len(),
        })
    }

    /// Child mesh of a background cell, if it was intersected.
    pub fn child_of(&self, cell: usize) -> Option<&ChildMesh> {
        self.cell_child
            .get(cell)
            .copied()
            .flatten()
            .and_then(|i| self.children.get(i))
    }

    pub fn child_index_of(&self, cell: usize) -> Option<usize> {
        self.cell_child.get(cell).copied().flatten()
    }

    /// Phase of an uncut cell; `None` for intersected cells.
    pub fn uncut_phase(&self, cell: usize) -> Option<usize> {
        self.cell_phase.get(cell).copied().flatten()
    }

    pub fn subphases(&self) -> &SubphaseTable {
        &self.subphases
    }

    pub fn num_phases(&self) -> usize {
        self.engine.num_phases()
    }

    pub fn id_summary(&self) -> IdSummary {
        self.ids
    }

    /// Entities classified without a decisive node.
    pub fn num_anomalies(&self) -> usize {
        self.anomalies
    }

    /// Physical coordinates of the vertices of a child element.
    pub fn element_coords(&self, child: usize, element: usize) -> Result<Vec<[f64; 3]>, MeshError> {
        self.child(child)?
            .element_handles(element)?
            .into_iter()
            .map(|h| self.vertices.get(h).map(|v| v.coords))
            .collect()
    }

    /// Handles of vertices created on the interface of geometry `g`.
    pub fn interface_vertices(&self, g: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertices.created().filter_map(move |(h, v)| match v.origin {
            VertexOrigin::Interface { geometry, .. } if geometry == g => Some(h),
            _ => None,
        })
    }

    /// Physical measure of every phase over the cells this rank owns.
    pub fn phase_measures(&self, mesh: &BackgroundMesh) -> Result<Vec<f64>, MeshError> {
        let mut out = vec![0.0; self.num_phases()];
        for cell in mesh.owned_cells() {
            match self.child_index_of(cell) {
                Some(idx) => {
                    let child = &self.children[idx];
                    for e in 0..child.num_elements() {
                        let m = shape::simplex_measure(&self.element_coords(idx, e)?)?;
                        out[child.element_phase(e)?] += m.abs();
                    }
                }
                None => {
                    let phase = self.uncut_phase(cell).unwrap_or(0);
                    out[phase] += templates::cell_measure(
                        mesh.cell_topology(cell)?,
                        &mesh.cell_coords(cell)?,
                    )?;
                }
            }
        }
        Ok(out)
    }
}
