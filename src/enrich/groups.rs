//! Subphase groups (SPGs) on the cells of a coarse (B-spline) basis.
//!
//! Within one coarse cell the subphases of its background cells are
//! flood-filled into facet-connected same-phase groups. Groups are admitted
//! one at a time with [`BsplineMeshInfo::add_subphase_group_to_bspline_cell`];
//! [`BsplineMeshInfo::create_sp_to_spg_map`] then closes admission and checks
//! that every subphase belongs to exactly one group.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::OnceCell;

use crate::algs::flood_fill::flood_fill;
use crate::background::basis::InterpolationBasis;
use crate::background::mesh::BackgroundMesh;
use crate::cut::model::CutMesh;
use crate::cut::subphase::SubphaseTable;
use crate::debug_invariants::DebugInvariants;
use crate::enrich::graph::SubphaseGraph;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;

const ON_SIDE_TOLERANCE: f64 = 1e-10;

#[derive(Debug)]
pub struct SubphaseGroup {
    index: usize,
    bspline_cell: usize,
    ordinal: usize,
    phase: usize,
    subphases: Vec<usize>,
    cells: OnceCell<Vec<usize>>,
    ligament_sides: OnceCell<Vec<usize>>,
}

impl SubphaseGroup {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bspline_cell(&self) -> usize {
        self.bspline_cell
    }

    /// Position among the groups of its B-spline cell.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn subphases(&self) -> &[usize] {
        &self.subphases
    }

    /// Background cells covered by the group, ascending. Computed on first use.
    pub fn cells(&self, table: &SubphaseTable) -> &[usize] {
        self.cells.get_or_init(|| {
            let set: BTreeSet<usize> = self
                .subphases
                .iter()
                .filter_map(|&sp| table.get(sp).ok().map(|s| s.cell))
                .collect();
            set.into_iter().collect()
        })
    }

    /// Sides of the B-spline cell (`topology`, spanning `bounds`) that the
    /// group touches. Computed on first use.
    pub fn ligament_side_ordinals(
        &self,
        cut: &CutMesh,
        mesh: &BackgroundMesh,
        topology: CellTopology,
        bounds: ([f64; 3], [f64; 3]),
    ) -> Result<&[usize], MeshError> {
        self.ligament_sides
            .get_or_try_init(|| {
                let (lo, hi) = bounds;
                let dim = topology.dimension();
                let to_eta = |x: [f64; 3]| {
                    let mut eta = [0.0; 3];
                    for d in 0..dim {
                        eta[d] = 2.0 * (x[d] - lo[d]) / (hi[d] - lo[d]) - 1.0;
                    }
                    eta
                };
                let mut sides = BTreeSet::new();
                for &sp in &self.subphases {
                    let subphase = cut.subphases().get(sp)?;
                    let cell = subphase.cell;
                    let bg_topology = mesh.cell_topology(cell)?;
                    let nodes = mesh.cell_nodes(cell)?;
                    for (s, side) in bg_topology.sides().iter().enumerate() {
                        let eta = side
                            .iter()
                            .map(|&v| mesh.node_coords(nodes[v]).map(to_eta))
                            .collect::<Result<Vec<_>, _>>()?;
                        let on: Vec<usize> = (0..topology.num_sides())
                            .filter(|&cs| {
                                eta.iter().all(|e| {
                                    topology
                                        .side_distance(cs, e)
                                        .is_some_and(|d| d.abs() < ON_SIDE_TOLERANCE)
                                })
                            })
                            .collect();
                        if on.is_empty() {
                            continue;
                        }
                        let touches = match cut.child_of(cell) {
                            None => true,
                            Some(child) => child.side_facets(s)?.into_iter().any(|(e, _)| {
                                child
                                    .element_subphase(e)
                                    .is_ok_and(|o| o == subphase.key.ordinal)
                            }),
                        };
                        if touches {
                            sides.extend(on);
                        }
                    }
                }
                Ok::<_, MeshError>(sides.into_iter().collect())
            })
            .map(Vec::as_slice)
    }
}

/// SPG bookkeeping of one coarse basis.
#[derive(Debug, Default)]
pub struct BsplineMeshInfo {
    groups: Vec<SubphaseGroup>,
    by_bspline_cell: Vec<Vec<usize>>,
    num_subphases: usize,
    sp_to_spg: Option<Vec<usize>>,
}

impl BsplineMeshInfo {
    pub fn new(num_bspline_cells: usize, num_subphases: usize) -> Self {
        Self {
            groups: Vec::new(),
            by_bspline_cell: vec![Vec::new(); num_bspline_cells],
            num_subphases,
            sp_to_spg: None,
        }
    }

    /// Admit a group of subphases on a B-spline cell; returns its index.
    pub fn add_subphase_group_to_bspline_cell(
        &mut self,
        bspline_cell: usize,
        phase: usize,
        subphases: Vec<usize>,
    ) -> Result<usize, MeshError> {
        if self.sp_to_spg.is_some() {
            return Err(MeshError::AlreadyFinalized("subphase group admission"));
        }
        if subphases.is_empty() {
            return Err(MeshError::EmptyGroup { bspline_cell });
        }
        let len = self.by_bspline_cell.len();
        let slot = self
            .by_bspline_cell
            .get_mut(bspline_cell)
            .ok_or(MeshError::IndexOutOfBounds {
                what: "B-spline cell",
                index: bspline_cell,
                len,
            })?;
        let index = self.groups.len();
        self.groups.push(SubphaseGroup {
            index,
            bspline_cell,
            ordinal: slot.len(),
            phase,
            subphases,
            cells: OnceCell::new(),
            ligament_sides: OnceCell::new(),
        });
        slot.push(index);
        Ok(index)
    }

    /// Close admission and build the subphase → group map.
    ///
    /// # Errors
    /// [`MeshError::DuplicateSubphase`] if a subphase is in two groups,
    /// [`MeshError::UnassignedSubphase`] if one is in none.
    pub fn create_sp_to_spg_map(&mut self) -> Result<(), MeshError> {
        let mut map: Vec<Option<usize>> = vec![None; self.num_subphases];
        for group in &self.groups {
            for &sp in &group.subphases {
                let slot = map.get_mut(sp).ok_or(MeshError::IndexOutOfBounds {
                    what: "subphase",
                    index: sp,
                    len: self.num_subphases,
                })?;
                if let Some(first) = slot.replace(group.index) {
                    return Err(MeshError::DuplicateSubphase {
                        subphase: sp,
                        first,
                        second: group.index,
                    });
                }
            }
        }
        let map = map
            .into_iter()
            .enumerate()
            .map(|(sp, g)| g.ok_or(MeshError::UnassignedSubphase(sp)))
            .collect::<Result<Vec<_>, _>>()?;
        self.sp_to_spg = Some(map);
        crate::debug_invariants!(self.validate_invariants(), "subphase groups");
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.sp_to_spg.is_some()
    }

    pub fn spg_of_subphase(&self, subphase: usize) -> Result<usize, MeshError> {
        let map = self
            .sp_to_spg
            .as_ref()
            .ok_or(MeshError::NotFinalized("subphase to SPG map"))?;
        map.get(subphase).copied().ok_or(MeshError::IndexOutOfBounds {
            what: "subphase",
            index: subphase,
            len: map.len(),
        })
    }

    pub fn sp_to_spg(&self) -> Result<&[usize], MeshError> {
        self.sp_to_spg
            .as_deref()
            .ok_or(MeshError::NotFinalized("subphase to SPG map"))
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[SubphaseGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Result<&SubphaseGroup, MeshError> {
        self.groups.get(index).ok_or(MeshError::IndexOutOfBounds {
            what: "subphase group",
            index,
            len: self.groups.len(),
        })
    }

    pub fn groups_of_bspline_cell(&self, bspline_cell: usize) -> &[usize] {
        self.by_bspline_cell
            .get(bspline_cell)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl DebugInvariants for BsplineMeshInfo {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        for (cell, members) in self.by_bspline_cell.iter().enumerate() {
            for (ordinal, &g) in members.iter().enumerate() {
                let group = self.group(g)?;
                if group.bspline_cell != cell || group.ordinal != ordinal {
                    return Err(MeshError::InvalidGeometry(format!(
                        "group {g} is listed as ({cell}, {ordinal}) but records ({}, {})",
                        group.bspline_cell, group.ordinal
                    )));
                }
            }
        }
        if let Some(map) = &self.sp_to_spg {
            for (sp, &g) in map.iter().enumerate() {
                if !self.group(g)?.subphases.contains(&sp) {
                    return Err(MeshError::UnassignedSubphase(sp));
                }
            }
        }
        Ok(())
    }
}

/// Flood-fill the subphases of every support cell of `basis` into groups.
///
/// Subphases are visited in key order, so group ordinals agree on every rank
/// that holds all background cells of a B-spline cell.
pub fn build_subphase_groups<B: InterpolationBasis + ?Sized>(
    cut: &CutMesh,
    basis: &B,
    graph: &SubphaseGraph,
) -> Result<BsplineMeshInfo, MeshError> {
    let table = cut.subphases();
    let mut per_cell: Vec<Vec<usize>> = vec![Vec::new(); basis.num_support_cells()];
    for (sp, subphase) in table.iter() {
        let sc = basis.support_cell_of(subphase.cell)?;
        per_cell
            .get_mut(sc)
            .ok_or(MeshError::IndexOutOfBounds {
                what: "B-spline cell",
                index: sc,
                len: basis.num_support_cells(),
            })?
            .push(sp);
    }

    let mut info = BsplineMeshInfo::new(per_cell.len(), table.len());
    for (bspline_cell, mut members) in per_cell.into_iter().enumerate() {
        members.sort_by_key(|&sp| table.get(sp).map(|s| s.key).ok());
        let position: HashMap<usize, usize> =
            members.iter().enumerate().map(|(i, &sp)| (sp, i)).collect();
        let phase = |i: usize| table.get(members[i]).map(|s| s.phase).unwrap_or(usize::MAX);
        let (labels, count) = flood_fill(
            members.len(),
            |i| {
                graph
                    .neighbors(members[i])
                    .iter()
                    .filter_map(|sp| position.get(sp).copied())
                    .collect::<Vec<_>>()
            },
            |_| true,
            |a, b| phase(a) == phase(b),
        );
        let mut components: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, label) in labels.into_iter().enumerate() {
            if let Some(k) = label {
                components[k].push(members[i]);
            }
        }
        for component in components {
            let p = table.get(component[0])?.phase;
            info.add_subphase_group_to_bspline_cell(bspline_cell, p, component)?;
        }
    }
    info.create_sp_to_spg_map()?;
    log::debug!(
        "{} subphase groups on {} B-spline cells",
        info.num_groups(),
        basis.num_support_cells()
    );
    Ok(info)
}
