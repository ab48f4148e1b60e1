//! Per-cell enrichment-level fields for visualization and downstream tools.
//!
//! One integer field per basis function, named `{prefix}_{basis id}`, holding
//! the level of that basis on every enriched cell, or `-1` where the basis has
//! no support.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::background::basis::InterpolationBasis;
use crate::enrich::interpolation::EnrichedInterpolationMesh;
use crate::mesh_error::MeshError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFields {
    /// Global id of the parent cell of every enriched cell.
    pub cell_ids: Vec<u64>,
    pub subphase_ordinals: Vec<usize>,
    pub phases: Vec<usize>,
    pub fields: BTreeMap<String, Vec<i64>>,
}

impl EnrichmentFields {
    pub fn from_mesh<B: InterpolationBasis + ?Sized>(
        enriched: &EnrichedInterpolationMesh,
        basis: &B,
        prefix: &str,
    ) -> Result<Self, MeshError> {
        let n = enriched.num_cells();
        let mut out = Self {
            cell_ids: Vec::with_capacity(n),
            subphase_ordinals: Vec::with_capacity(n),
            phases: Vec::with_capacity(n),
            fields: BTreeMap::new(),
        };
        let mut columns: Vec<Vec<i64>> = vec![vec![-1; n]; basis.num_bases()];
        for (i, cell) in enriched.cells().iter().enumerate() {
            out.cell_ids.push(cell.key.cell.get());
            out.subphase_ordinals.push(cell.key.ordinal);
            out.phases.push(cell.phase);
            for (&b, &level) in cell.basis_indices.iter().zip(&cell.levels) {
                if let Some(col) = columns.get_mut(b) {
                    col[i] = level as i64;
                }
            }
        }
        for (b, col) in columns.into_iter().enumerate() {
            out.fields
                .insert(format!("{prefix}_{}", basis.basis_id(b)?), col);
        }
        Ok(out)
    }

    pub fn field(&self, name: &str) -> Option<&[i64]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn num_cells(&self) -> usize {
        self.cell_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::context::ParallelContext;
    use crate::background::basis::LagrangeBasis;
    use crate::background::meshgen::structured_quad_mesh;
    use crate::config::EnrichmentConfig;
    use crate::cut::model::DecompositionModel;
    use crate::enrich::engine::Enrichment;
    use crate::geometry::level_set::Plane;

    #[test]
    fn fields_mark_missing_support_and_survive_json() {
        let mut mesh = structured_quad_mesh([0.0, 0.0], [3.0, 1.0], [3, 1]).unwrap();
        let plane = Plane::new([1.5, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
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
        let fields = EnrichmentFields::from_mesh(&enriched, &basis, "lvl").unwrap();
        assert_eq!(fields.num_cells(), 4);
        assert_eq!(fields.fields.len(), basis.num_bases());
        // node 0 (id 1) only touches the leftmost cell
        let f = fields.field("lvl_1").unwrap();
        assert_eq!(f[0], 0);
        assert!(f[1..].iter().all(|&v| v == -1));

        let json = serde_json::to_string(&fields).unwrap();
        let back: EnrichmentFields = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fields);
    }
}
