//! The enriched interpolation mesh handed to the downstream solver.
//!
//! One [`EnrichedCell`] per subphase: a copy of the parent interpolation cell
//! whose vertices are enriched with the levels of the subphase's unit. An
//! enriched vertex is a background node together with its restricted
//! interpolation; cells that see the same node with the same coefficients
//! share the enriched vertex.

use std::collections::HashMap;

use crate::background::basis::{BaseInterpolation, InterpolationBasis};
use crate::background::mesh::BackgroundMesh;
use crate::config::{EnrichmentConfig, EnrichmentRank};
use crate::cut::model::CutMesh;
use crate::cut::subphase::SubphaseKey;
use crate::enrich::coefficients::CoefficientTable;
use crate::enrich::engine::EnrichmentUnits;
use crate::enrich::flood_fill::BasisLevels;
use crate::enrich::groups::BsplineMeshInfo;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;
use crate::topology::point::PointId;

/// Base interpolation restricted to the levels active on one unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexEnrichment {
    pub basis_indices: Vec<usize>,
    pub basis_ids: Vec<u64>,
    pub levels: Vec<usize>,
    pub coefficient_ids: Vec<u64>,
    pub weights: Vec<f64>,
}

impl VertexEnrichment {
    pub fn len(&self) -> usize {
        self.coefficient_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficient_ids.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedVertex {
    /// Background node row.
    pub node: usize,
    pub node_id: PointId,
    pub enrichment: VertexEnrichment,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedCell {
    pub subphase: usize,
    pub key: SubphaseKey,
    /// Background cell index.
    pub cell: usize,
    pub topology: CellTopology,
    pub phase: usize,
    /// Enrichment unit (subphase or subphase group).
    pub unit: usize,
    /// Enriched vertex indices in the parent's node order.
    pub vertices: Vec<usize>,
    /// Bases of the unit's support cell with their level on this cell.
    pub basis_indices: Vec<usize>,
    pub levels: Vec<usize>,
    pub coefficient_ids: Vec<u64>,
}

#[derive(Debug)]
pub struct EnrichedInterpolationMesh {
    rank: EnrichmentRank,
    condense: bool,
    units: EnrichmentUnits,
    levels: Vec<BasisLevels>,
    coefficients: CoefficientTable,
    groups: Option<BsplineMeshInfo>,
    cells: Vec<EnrichedCell>,
    vertices: Vec<EnrichedVertex>,
}

impl EnrichedInterpolationMesh {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build<B: InterpolationBasis + ?Sized>(
        cut: &CutMesh,
        mesh: &BackgroundMesh,
        basis: &B,
        config: &EnrichmentConfig,
        units: EnrichmentUnits,
        levels: Vec<BasisLevels>,
        coefficients: CoefficientTable,
        groups: Option<BsplineMeshInfo>,
    ) -> Result<Self, MeshError> {
        let mut out = Self {
            rank: config.rank,
            condense: config.condense_zero_weights,
            units,
            levels,
            coefficients,
            groups,
            cells: Vec::new(),
            vertices: Vec::new(),
        };
        let mut shared: HashMap<(usize, Vec<u64>), usize> = HashMap::new();
        let mut base_cache: HashMap<(usize, usize), BaseInterpolation> = HashMap::new();

        for (sp, subphase) in cut.subphases().iter() {
            let unit = out.units.unit_of_subphase(sp)?;
            let support_cell = out.units.support_cell(unit);
            let basis_indices = basis.cell_bases(support_cell)?.to_vec();
            let mut cell_levels = Vec::with_capacity(basis_indices.len());
            let mut coefficient_ids = Vec::with_capacity(basis_indices.len());
            for &b in &basis_indices {
                let level = out.level(b, unit)?;
                cell_levels.push(level);
                coefficient_ids.push(out.coefficients.id(b, level)?);
            }

            let topology = mesh.cell_topology(subphase.cell)?;
            let nodes = mesh.cell_nodes(subphase.cell)?;
            let mut vertices = Vec::with_capacity(nodes.len());
            for (i, &node) in nodes.iter().enumerate() {
                let base = match base_cache.get(&(subphase.cell, i)) {
                    Some(base) => base.clone(),
                    None => {
                        let base = basis.interpolate(
                            mesh,
                            subphase.cell,
                            &topology.reference_vertices()[i],
                        )?;
                        base_cache.insert((subphase.cell, i), base.clone());
                        base
                    }
                };
                let enrichment = out.restrict(&base, unit)?;
                let key = (node, enrichment.coefficient_ids.clone());
                let v = match shared.get(&key) {
                    Some(&v) => v,
                    None => {
                        let v = out.vertices.len();
                        out.vertices.push(EnrichedVertex {
                            node,
                            node_id: mesh.node_id(node)?,
                            enrichment,
                        });
                        shared.insert(key, v);
                        v
                    }
                };
                vertices.push(v);
            }
            out.cells.push(EnrichedCell {
                subphase: sp,
                key: subphase.key,
                cell: subphase.cell,
                topology,
                phase: subphase.phase,
                unit,
                vertices,
                basis_indices,
                levels: cell_levels,
                coefficient_ids,
            });
        }
        log::debug!(
            "enriched interpolation mesh: {} cells, {} vertices, {} coefficients",
            out.cells.len(),
            out.vertices.len(),
            out.coefficients.total()
        );
        Ok(out)
    }

    pub fn rank(&self) -> EnrichmentRank {
        self.rank
    }

    pub fn units(&self) -> &EnrichmentUnits {
        &self.units
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    /// Subphase groups of a coarse enrichment.
    pub fn subphase_groups(&self) -> Result<&BsplineMeshInfo, MeshError> {
        self.groups
            .as_ref()
            .ok_or(MeshError::NotFinalized("subphase groups"))
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Enriched cells; cell `i` belongs to subphase `i`.
    pub fn cells(&self) -> &[EnrichedCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Result<&EnrichedCell, MeshError> {
        self.cells.get(index).ok_or(MeshError::IndexOutOfBounds {
            what: "enriched cell",
            index,
            len: self.cells.len(),
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[EnrichedVertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> Result<&EnrichedVertex, MeshError> {
        self.vertices.get(index).ok_or(MeshError::IndexOutOfBounds {
            what: "enriched vertex",
            index,
            len: self.vertices.len(),
        })
    }

    pub fn basis_levels(&self, basis: usize) -> Result<&BasisLevels, MeshError> {
        self.levels.get(basis).ok_or(MeshError::IndexOutOfBounds {
            what: "basis",
            index: basis,
            len: self.levels.len(),
        })
    }

    pub fn num_levels(&self, basis: usize) -> usize {
        self.levels.get(basis).map_or(0, |l| l.num_levels)
    }

    /// Level of `basis` on an enrichment unit.
    ///
    /// # Errors
    /// [`MeshError::MissingEnrichmentLevel`] if the unit is outside the
    /// basis's support.
    pub fn level(&self, basis: usize, unit: usize) -> Result<usize, MeshError> {
        self.basis_levels(basis)?
            .level_of(unit)
            .ok_or(MeshError::MissingEnrichmentLevel { basis, unit })
    }

    pub fn subphase_level(&self, basis: usize, subphase: usize) -> Result<usize, MeshError> {
        self.level(basis, self.units.unit_of_subphase(subphase)?)
    }

    /// Level of `basis` on element `element` of child mesh `child`.
    pub fn element_level(
        &self,
        cut: &CutMesh,
        child: usize,
        element: usize,
        basis: usize,
    ) -> Result<usize, MeshError> {
        let child = cut.child(child)?;
        let sp = cut.subphases().of_cell(child.parent()).start + child.element_subphase(element)?;
        self.subphase_level(basis, sp)
    }

    /// Background cells of an enrichment unit, ascending.
    pub fn unit_cells(&self, cut: &CutMesh, unit: usize) -> Result<Vec<usize>, MeshError> {
        match &self.groups {
            Some(info) => Ok(info.group(unit)?.cells(cut.subphases()).to_vec()),
            None => Ok(vec![cut.subphases().get(unit)?.cell]),
        }
    }

    /// Enrichment of an arbitrary point `xi` of the parent of `subphase`,
    /// such as an interface vertex of a child mesh.
    pub fn enrich_point<B: InterpolationBasis + ?Sized>(
        &self,
        mesh: &BackgroundMesh,
        basis: &B,
        subphase: usize,
        xi: &[f64; 3],
    ) -> Result<VertexEnrichment, MeshError> {
        let cell = self.cell(subphase)?;
        let base = basis.interpolate(mesh, cell.cell, xi)?;
        self.restrict(&base, cell.unit)
    }

    fn restrict(
        &self,
        base: &BaseInterpolation,
        unit: usize,
    ) -> Result<VertexEnrichment, MeshError> {
        let mut out = VertexEnrichment::default();
        for i in 0..base.len() {
            let w = base.weights[i];
            if self.condense && w == 0.0 {
                continue;
            }
            let b = base.basis_indices[i];
            let level = self.level(b, unit)?;
            out.basis_indices.push(b);
            out.basis_ids.push(base.basis_ids[i]);
            out.levels.push(level);
            out.coefficient_ids.push(self.coefficients.id(b, level)?);
            out.weights.push(w);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::algs::communicator::NoComm;
    use crate::algs::context::ParallelContext;
    use crate::background::basis::LagrangeBasis;
    use crate::background::meshgen::structured_quad_mesh;
    use crate::config::EnrichmentConfig;
    use crate::cut::model::DecompositionModel;
    use crate::enrich::engine::Enrichment;
    use crate::geometry::level_set::Plane;

    #[test]
    fn single_cut_quad_doubles_every_basis() {
        let mut mesh = structured_quad_mesh([0.0, 0.0], [1.0, 1.0], [1, 1]).unwrap();
        let plane = Plane::new([0.4, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        let ctx = ParallelContext::init(NoComm, Default::default()).unwrap();
        let cut = DecompositionModel::with_geometries(vec![Box::new(plane)], Default::default())
            .unwrap()
            .decompose(&mut mesh, &ctx)
            .unwrap();
        let basis = LagrangeBasis::new(&mesh).unwrap();
        let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
            .unwrap()
            .perform(&ctx)
            .unwrap();
        assert_eq!(enriched.num_cells(), 2);
        for b in 0..4 {
            assert_eq!(enriched.num_levels(b), 2);
        }
        assert_eq!(enriched.coefficients().total(), 8);
        assert_eq!(enriched.num_vertices(), 8);
        let (a, b) = (&enriched.cells()[0], &enriched.cells()[1]);
        assert_ne!(a.phase, b.phase);
        assert!(a.coefficient_ids.iter().all(|c| !b.coefficient_ids.contains(c)));
        // a nodal basis restricted at a node keeps only that node
        for v in enriched.vertices() {
            assert_eq!(v.enrichment.len(), 1);
            assert_eq!(v.enrichment.weights, vec![1.0]);
        }
        assert!(enriched.subphase_groups().is_err());
        assert!(matches!(
            enriched.level(0, 7),
            Err(crate::mesh_error::MeshError::MissingEnrichmentLevel { basis: 0, unit: 7 })
        ));
    }

    #[test]
    fn interface_points_are_enriched_on_demand() {
        let mut mesh = structured_quad_mesh([0.0, 0.0], [1.0, 1.0], [1, 1]).unwrap();
        let plane = Plane::new([0.3, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        let ctx = ParallelContext::init(NoComm, Default::default()).unwrap();
        let cut = DecompositionModel::with_geometries(vec![Box::new(plane)], Default::default())
            .unwrap()
            .decompose(&mut mesh, &ctx)
            .unwrap();
        let basis = LagrangeBasis::new(&mesh).unwrap();
        let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
            .unwrap()
            .perform(&ctx)
            .unwrap();
        let e = enriched
            .enrich_point(&mesh, &basis, 0, &[0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(e.len(), 4);
        assert!((e.weights.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        let child = &cut.children()[0];
        let level = enriched.element_level(&cut, 0, 0, 0).unwrap();
        let sp = child.element_subphase(0).unwrap();
        assert_eq!(level, enriched.subphase_level(0, sp).unwrap());
    }
}
