//! Enrichment driver: subphase graph, per-basis flood fill, coefficient ids,
//! and vertex enrichment.
//!
//! The unit of enrichment is a subphase ([`EnrichmentRank::Background`]) or a
//! subphase group ([`EnrichmentRank::Coarse`]). Either way every unit carries a
//! [`UnitKey`] that is identical on every rank holding it, and the flood fills
//! visit units in key order, so ranks agree on levels without talking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::algs::communicator::Communicator;
use crate::algs::context::ParallelContext;
use crate::background::basis::InterpolationBasis;
use crate::background::mesh::BackgroundMesh;
use crate::config::{EnrichmentConfig, EnrichmentRank};
use crate::cut::model::CutMesh;
use crate::enrich::coefficients::assign_coefficient_ids;
use crate::enrich::flood_fill::{basis_support_cells, flood_fill_basis, BasisLevels};
use crate::enrich::graph::SubphaseGraph;
use crate::enrich::groups::{build_subphase_groups, BsplineMeshInfo};
use crate::enrich::interpolation::EnrichedInterpolationMesh;
use crate::mesh_error::MeshError;

/// Rank-independent name of an enrichment unit: the global id of the cell it
/// lives on (background or support cell) and its ordinal there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub cell: u64,
    pub ordinal: u64,
}

/// The nodes of the per-basis flood fill.
#[derive(Clone, Debug)]
pub struct EnrichmentUnits {
    keys: Vec<UnitKey>,
    support_cell: Vec<usize>,
    phase: Vec<usize>,
    /// Unit of every subphase.
    of_subphase: Vec<usize>,
    by_key: HashMap<UnitKey, usize>,
    by_support_cell: Vec<Vec<usize>>,
    /// Facet adjacency between units.
    pub graph: SubphaseGraph,
}

impl EnrichmentUnits {
    /// Assemble units from parallel per-unit arrays.
    pub fn new(
        keys: Vec<UnitKey>,
        support_cell: Vec<usize>,
        phase: Vec<usize>,
        of_subphase: Vec<usize>,
        graph: SubphaseGraph,
        num_support_cells: usize,
    ) -> Result<Self, MeshError> {
        let n = keys.len();
        if support_cell.len() != n || phase.len() != n || graph.num_nodes() != n {
            return Err(MeshError::InvalidGeometry(format!(
                "enrichment units: {n} keys, {} cells, {} phases, {} graph nodes",
                support_cell.len(),
                phase.len(),
                graph.num_nodes()
            )));
        }
        if let Some(&u) = of_subphase.iter().find(|&&u| u >= n) {
            return Err(MeshError::IndexOutOfBounds {
                what: "enrichment unit",
                index: u,
                len: n,
            });
        }
        let mut by_key = HashMap::with_capacity(n);
        for (u, key) in keys.iter().enumerate() {
            if by_key.insert(*key, u).is_some() {
                return Err(MeshError::InvalidGeometry(format!(
                    "enrichment unit key {key:?} is not unique"
                )));
            }
        }
        let mut by_support_cell = vec![Vec::new(); num_support_cells];
        for (u, &c) in support_cell.iter().enumerate() {
            by_support_cell
                .get_mut(c)
                .ok_or(MeshError::IndexOutOfBounds {
                    what: "support cell",
                    index: c,
                    len: num_support_cells,
                })?
                .push(u);
        }
        Ok(Self {
            keys,
            support_cell,
            phase,
            of_subphase,
            by_key,
            by_support_cell,
            graph,
        })
    }

    /// One unit per subphase, keyed by `(parent cell id, ordinal)`.
    pub fn from_subphases<B: InterpolationBasis + ?Sized>(
        cut: &CutMesh,
        basis: &B,
        graph: SubphaseGraph,
    ) -> Result<Self, MeshError> {
        let table = cut.subphases();
        let mut keys = Vec::with_capacity(table.len());
        let mut support_cell = Vec::with_capacity(table.len());
        let mut phase = Vec::with_capacity(table.len());
        for (_, sp) in table.iter() {
            keys.push(UnitKey {
                cell: sp.key.cell.get(),
                ordinal: sp.key.ordinal as u64,
            });
            support_cell.push(basis.support_cell_of(sp.cell)?);
            phase.push(sp.phase);
        }
        let of_subphase = (0..table.len()).collect();
        Self::new(
            keys,
            support_cell,
            phase,
            of_subphase,
            graph,
            basis.num_support_cells(),
        )
    }

    /// One unit per subphase group, keyed by `(support cell id, ordinal)`.
    pub fn from_groups<B: InterpolationBasis + ?Sized>(
        info: &BsplineMeshInfo,
        basis: &B,
        graph: &SubphaseGraph,
    ) -> Result<Self, MeshError> {
        let sp_to_spg = info.sp_to_spg()?;
        let mut keys = Vec::with_capacity(info.num_groups());
        let mut support_cell = Vec::with_capacity(info.num_groups());
        let mut phase = Vec::with_capacity(info.num_groups());
        for group in info.groups() {
            keys.push(UnitKey {
                cell: basis.support_cell_id(group.bspline_cell())?,
                ordinal: group.ordinal() as u64,
            });
            support_cell.push(group.bspline_cell());
            phase.push(group.phase());
        }
        Self::new(
            keys,
            support_cell,
            phase,
            sp_to_spg.to_vec(),
            graph.quotient(sp_to_spg, info.num_groups()),
            basis.num_support_cells(),
        )
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, unit: usize) -> UnitKey {
        self.keys[unit]
    }

    pub fn phase(&self, unit: usize) -> usize {
        self.phase[unit]
    }

    pub fn support_cell(&self, unit: usize) -> usize {
        self.support_cell[unit]
    }

    pub fn of_support_cell(&self, cell: usize) -> &[usize] {
        self.by_support_cell
            .get(cell)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn unit_of_subphase(&self, subphase: usize) -> Result<usize, MeshError> {
        self.of_subphase
            .get(subphase)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                what: "subphase",
                index: subphase,
                len: self.of_subphase.len(),
            })
    }

    pub fn index_of(&self, key: &UnitKey) -> Result<usize, MeshError> {
        self.by_key
            .get(key)
            .copied()
            .ok_or(MeshError::UnknownSubphase {
                cell: key.cell,
                ordinal: key.ordinal,
            })
    }
}

/// Enrichment of a decomposed mesh against one interpolation basis.
pub struct Enrichment<'a, B: InterpolationBasis + ?Sized> {
    cut: &'a CutMesh,
    mesh: &'a BackgroundMesh,
    basis: &'a B,
    config: EnrichmentConfig,
}

impl<'a, B: InterpolationBasis + ?Sized> Enrichment<'a, B> {
    /// # Errors
    /// [`MeshError::InvalidConfig`] for a rejected config,
    /// [`MeshError::NotFinalized`] if `mesh` has no finalized child links.
    pub fn new(
        cut: &'a CutMesh,
        mesh: &'a BackgroundMesh,
        basis: &'a B,
        config: EnrichmentConfig,
    ) -> Result<Self, MeshError> {
        config.validate()?;
        if !mesh.children_finalized() {
            return Err(MeshError::NotFinalized("parent/child links"));
        }
        if cut.num_cells() != mesh.num_cells() {
            return Err(MeshError::InvalidGeometry(format!(
                "cut mesh has {} cells, background mesh {}",
                cut.num_cells(),
                mesh.num_cells()
            )));
        }
        Ok(Self {
            cut,
            mesh,
            basis,
            config,
        })
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Run the enrichment. Collective: every rank must call it.
    pub fn perform<C: Communicator>(
        &self,
        ctx: &ParallelContext<C>,
    ) -> Result<EnrichedInterpolationMesh, MeshError> {
        let graph = SubphaseGraph::build(self.cut, self.mesh)?;
        let (units, groups) = match self.config.rank {
            EnrichmentRank::Background => (
                EnrichmentUnits::from_subphases(self.cut, self.basis, graph)?,
                None,
            ),
            EnrichmentRank::Coarse => {
                let info = build_subphase_groups(self.cut, self.basis, &graph)?;
                let units = EnrichmentUnits::from_groups(&info, self.basis, &graph)?;
                (units, Some(info))
            }
        };

        let support = basis_support_cells(self.basis)?;
        let levels: Vec<BasisLevels> = support
            .iter()
            .enumerate()
            .map(|(b, cells)| flood_fill_basis(b, &units, cells))
            .collect();
        let enriched = levels.iter().filter(|l| l.num_levels > 1).count();
        log::debug!(
            "rank {}: {} units, {} bases, {} with more than one level",
            ctx.rank(),
            units.len(),
            levels.len(),
            enriched
        );

        let coefficients = assign_coefficient_ids(&levels, &units, self.basis, ctx)?;
        EnrichedInterpolationMesh::build(
            self.cut,
            self.mesh,
            self.basis,
            &self.config,
            units,
            levels,
            coefficients,
            groups,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::background::basis::LagrangeBasis;
    use crate::background::meshgen::structured_quad_mesh;
    use crate::cut::model::DecompositionModel;
    use crate::geometry::level_set::Plane;

    #[test]
    fn enrichment_requires_finalized_links() {
        let mut mesh = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
        let other = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
        let plane = Plane::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        let ctx = ParallelContext::init(NoComm, Default::default()).unwrap();
        let cut = DecompositionModel::with_geometries(vec![Box::new(plane)], Default::default())
            .unwrap()
            .decompose(&mut mesh, &ctx)
            .unwrap();
        let basis = LagrangeBasis::new(&other).unwrap();
        assert!(matches!(
            Enrichment::new(&cut, &other, &basis, EnrichmentConfig::default()),
            Err(MeshError::NotFinalized(_))
        ));
        let bad = EnrichmentConfig {
            field_prefix: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            Enrichment::new(&cut, &mesh, &basis, bad),
            Err(MeshError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unit_keys_must_be_unique() {
        let key = UnitKey {
            cell: 3,
            ordinal: 0,
        };
        let graph = SubphaseGraph::from_edges(2, []);
        let err = EnrichmentUnits::new(vec![key, key], vec![0, 0], vec![0, 1], vec![0, 1], graph, 1);
        assert!(err.is_err());
    }
}
