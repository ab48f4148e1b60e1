//! One-shot consistency diagnostics of a decomposition and its enrichment.
//!
//! None of these checks is part of the production pipeline; they exist for
//! tests and for debugging a new geometry or mesh. Each returns the measured
//! quantity on success and [`MeshError::VerificationFailed`] with the first
//! offending entity otherwise.

use std::collections::{BTreeSet, HashMap};

use crate::algs::communicator::{tags, Communicator};
use crate::algs::context::ParallelContext;
use crate::algs::wire::{decode_records, encode_records, WireHdr, WireVertexSample};
use crate::background::basis::InterpolationBasis;
use crate::background::mesh::BackgroundMesh;
use crate::config::VerificationConfig;
use crate::cut::model::CutMesh;
use crate::cut::templates;
use crate::cut::vertex::VertexOrigin;
use crate::enrich::flood_fill::basis_support_cells;
use crate::enrich::interpolation::EnrichedInterpolationMesh;
use crate::geometry::shape;
use crate::mesh_error::MeshError;

fn failed(message: String) -> MeshError {
    MeshError::VerificationFailed(message)
}

/// Global volume of every phase; their sum must match the global volume of
/// the background cells. Collective.
pub fn check_volume_conservation<C: Communicator>(
    cut: &CutMesh,
    mesh: &BackgroundMesh,
    config: &VerificationConfig,
    ctx: &ParallelContext<C>,
) -> Result<Vec<f64>, MeshError> {
    let mut local = cut.phase_measures(mesh)?;
    let mut background = 0.0;
    for cell in mesh.owned_cells() {
        background += templates::cell_measure(mesh.cell_topology(cell)?, &mesh.cell_coords(cell)?)?;
    }
    local.push(background);
    let mut global = ctx.sum_f64(&local)?;
    let background = global.pop().unwrap_or(0.0);
    let cut_total: f64 = global.iter().sum();
    let scale = background.abs().max(f64::MIN_POSITIVE);
    if (cut_total - background).abs() > config.volume_tolerance * scale {
        return Err(failed(format!(
            "phase volumes sum to {cut_total}, background volume is {background}"
        )));
    }
    log::debug!("volume by phase: {global:?}");
    Ok(global)
}

/// Largest level-set residual at an interface vertex.
///
/// The residual is the parent's first-order interpolant of the geometry's
/// node values at the vertex, minus the threshold: the interface the
/// decomposition resolves.
pub fn check_interface_fidelity(
    cut: &CutMesh,
    mesh: &BackgroundMesh,
    config: &VerificationConfig,
) -> Result<f64, MeshError> {
    let engine = cut.engine();
    let threshold = engine.config().threshold;
    let mut worst: f64 = 0.0;
    for child in cut.children() {
        let nodes = mesh.cell_nodes(child.parent())?;
        for (local, &h) in child.vertex_handles().iter().enumerate() {
            let VertexOrigin::Interface { geometry, .. } = cut.vertices().get(h)?.origin else {
                continue;
            };
            let values = nodes
                .iter()
                .map(|&n| engine.evaluate_node_phase(n, geometry))
                .collect::<Result<Vec<_>, _>>()?;
            let phi = shape::interpolate(child.parent_topology(), &values, &child.param_coords(local)?)?;
            let r = (phi - threshold).abs();
            if r > config.interface_tolerance {
                return Err(failed(format!(
                    "interface vertex {h} of geometry {geometry} in cell {}: residual {r:e}",
                    child.parent_id()
                )));
            }
            worst = worst.max(r);
        }
    }
    Ok(worst)
}

/// Largest distance between a child vertex and the parent map of its
/// parametric coordinate.
pub fn check_parametric_round_trip(
    cut: &CutMesh,
    mesh: &BackgroundMesh,
    config: &VerificationConfig,
) -> Result<f64, MeshError> {
    let mut worst: f64 = 0.0;
    for child in cut.children() {
        let coords = mesh.cell_coords(child.parent())?;
        for (local, &h) in child.vertex_handles().iter().enumerate() {
            let x = shape::map_to_physical(child.parent_topology(), &coords, &child.param_coords(local)?)?;
            let d = shape::distance(&x, &cut.vertices().get(h)?.coords);
            if d > config.round_trip_tolerance {
                return Err(failed(format!(
                    "vertex {h} in cell {} is {d:e} away from its parametric image",
                    child.parent_id()
                )));
            }
            worst = worst.max(d);
        }
    }
    Ok(worst)
}

/// Largest mismatch between stored dx/dp and central differences of whole
/// re-decompositions.
///
/// `redecompose(adv, delta)` must rebuild the cut with design variable `adv`
/// shifted by `delta`. Every design variable appearing in a stored column is
/// shifted by `±step`; interface vertices are matched across the three cuts
/// by key, and a missing column counts as zero. The mismatch of a component
/// is measured relative to `1 + |fd|`.
pub fn check_sensitivities<F>(
    cut: &CutMesh,
    step: f64,
    config: &VerificationConfig,
    mut redecompose: F,
) -> Result<f64, MeshError>
where
    F: FnMut(usize, f64) -> Result<CutMesh, MeshError>,
{
    let engine = cut.engine();
    let mut stored = Vec::new();
    let mut advs = BTreeSet::new();
    for (h, v) in cut.vertices().created() {
        let Some(record) = engine.object(v.row)?.interface.as_ref() else {
            continue;
        };
        let Some(sens) = &record.sensitivity else {
            return Err(failed(format!("interface vertex {h} carries no dx/dp")));
        };
        advs.extend(sens.adv_indices.iter().copied());
        stored.push((h, v, sens));
    }
    let mut worst: f64 = 0.0;
    for adv in advs {
        let plus = redecompose(adv, step)?;
        let minus = redecompose(adv, -step)?;
        for &(h, v, sens) in &stored {
            let moved = |other: &CutMesh| -> Result<[f64; 3], MeshError> {
                let handle = other.vertices().find(&v.key).ok_or_else(|| {
                    failed(format!(
                        "interface vertex {h} vanishes when design variable {adv} moves"
                    ))
                })?;
                Ok(other.vertices().get(handle)?.coords)
            };
            let (xp, xm) = (moved(&plus)?, moved(&minus)?);
            let column = sens.column(adv).unwrap_or([0.0; 3]);
            for d in 0..3 {
                let fd = (xp[d] - xm[d]) / (2.0 * step);
                let r = (column[d] - fd).abs() / (1.0 + fd.abs());
                if r > config.sensitivity_tolerance {
                    return Err(failed(format!(
                        "interface vertex {h}, design variable {adv}, axis {d}: \
                         dx/dp {} against {fd} by differences",
                        column[d]
                    )));
                }
                worst = worst.max(r);
            }
        }
    }
    Ok(worst)
}

/// Every unit in a basis's support holds exactly one level of it, every level
/// is used, and every child element inherits the level of its subphase.
/// Returns the number of (basis, level) pairs.
pub fn check_enrichment_partition<B: InterpolationBasis + ?Sized>(
    enriched: &EnrichedInterpolationMesh,
    cut: &CutMesh,
    basis: &B,
) -> Result<usize, MeshError> {
    let units = enriched.units();
    let support = basis_support_cells(basis)?;
    let mut pairs = 0;
    for (b, cells) in support.iter().enumerate() {
        let levels = enriched.basis_levels(b)?;
        let mut expected: Vec<usize> = cells
            .iter()
            .flat_map(|&c| units.of_support_cell(c).iter().copied())
            .collect();
        expected.sort_unstable();
        expected.dedup();
        let mut seen = levels.support.clone();
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(failed(format!("basis {b}: a unit holds two levels")));
        }
        if seen != expected {
            return Err(failed(format!(
                "basis {b}: levels cover {} units, support has {}",
                seen.len(),
                expected.len()
            )));
        }
        let mut used = vec![false; levels.num_levels];
        for &l in &levels.levels {
            *used
                .get_mut(l)
                .ok_or_else(|| failed(format!("basis {b}: level {l} out of range")))? = true;
        }
        if let Some(l) = used.iter().position(|u| !u) {
            return Err(failed(format!("basis {b}: level {l} is empty")));
        }
        pairs += levels.num_levels;
    }

    for (idx, child) in cut.children().iter().enumerate() {
        let sc = basis.support_cell_of(child.parent())?;
        for &b in basis.cell_bases(sc)? {
            for e in 0..child.num_elements() {
                let level = enriched.element_level(cut, idx, e, b)?;
                let sp = cut.subphases().of_cell(child.parent()).start + child.element_subphase(e)?;
                if enriched.subphase_level(b, sp)? != level {
                    return Err(failed(format!(
                        "basis {b}: element {e} of cell {} disagrees with its subphase",
                        child.parent_id()
                    )));
                }
            }
        }
    }
    Ok(pairs)
}

/// Gather the coordinates of every created vertex to rank 0 and check that
/// all copies of one id agree. Collective; returns the number of distinct
/// ids on rank 0 and `None` elsewhere.
pub fn check_vertex_coordinates<C: Communicator>(
    cut: &CutMesh,
    config: &VerificationConfig,
    ctx: &ParallelContext<C>,
) -> Result<Option<usize>, MeshError> {
    let samples = cut
        .vertices()
        .created()
        .filter_map(|(_, v)| v.id.map(|id| WireVertexSample::new(id.get(), v.coords)))
        .collect::<Vec<_>>();
    let buf = encode_records(WireHdr::VERTEX_SAMPLE, &samples);
    let Some(parts) = ctx.gather_to_root(tags::DIAGNOSTICS, &buf)? else {
        return Ok(None);
    };
    let mut first: HashMap<u64, (usize, [f64; 3])> = HashMap::new();
    for (rank, part) in parts.iter().enumerate() {
        for s in decode_records::<WireVertexSample>(rank, WireHdr::VERTEX_SAMPLE, part)? {
            match first.get(&s.id()) {
                None => {
                    first.insert(s.id(), (rank, s.coords()));
                }
                Some(&(r0, x0)) => {
                    let d = shape::distance(&x0, &s.coords());
                    if d > config.coordinate_tolerance {
                        return Err(failed(format!(
                            "vertex {} differs by {d:e} between ranks {r0} and {rank}",
                            s.id()
                        )));
                    }
                }
            }
        }
    }
    Ok(Some(first.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::background::basis::LagrangeBasis;
    use crate::background::meshgen::structured_quad_mesh;
    use crate::config::{DecompositionConfig, EnrichmentConfig};
    use crate::cut::model::DecompositionModel;
    use crate::enrich::engine::Enrichment;
    use crate::geometry::level_set::Sphere;

    #[test]
    fn circle_on_quads_passes_every_check() {
        let mut mesh = structured_quad_mesh([-1.0, -1.0], [1.0, 1.0], [6, 6]).unwrap();
        let circle = Sphere::new([0.1, -0.05, 0.0], 0.6).unwrap();
        let ctx = ParallelContext::init(NoComm, Default::default()).unwrap();
        let cut = DecompositionModel::with_geometries(vec![Box::new(circle)], Default::default())
            .unwrap()
            .decompose(&mut mesh, &ctx)
            .unwrap();
        let cfg = VerificationConfig::default();
        let volumes = check_volume_conservation(&cut, &mesh, &cfg, &ctx).unwrap();
        assert!((volumes.iter().sum::<f64>() - 4.0).abs() < 1e-10);
        assert!(check_interface_fidelity(&cut, &mesh, &cfg).unwrap() <= 1e-8);
        assert!(check_parametric_round_trip(&cut, &mesh, &cfg).unwrap() <= 1e-10);
        assert!(check_vertex_coordinates(&cut, &cfg, &ctx).unwrap().unwrap() > 0);

        let basis = LagrangeBasis::new(&mesh).unwrap();
        let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
            .unwrap()
            .perform(&ctx)
            .unwrap();
        let pairs = check_enrichment_partition(&enriched, &cut, &basis).unwrap();
        assert_eq!(pairs as u64, enriched.coefficients().total());
    }

    fn decompose_circle(
        advs: [f64; 4],
        config: DecompositionConfig,
    ) -> Result<CutMesh, MeshError> {
        let ctx = ParallelContext::init(NoComm, Default::default())?;
        let mut mesh = structured_quad_mesh([0.0, 0.0], [1.0, 1.0], [4, 4])?;
        let circle = Sphere::new([advs[0], advs[1], advs[2]], advs[3])?;
        DecompositionModel::with_geometries(vec![Box::new(circle)], config)?
            .decompose(&mut mesh, &ctx)
    }

    #[test]
    fn circle_sensitivities_match_redecomposition() {
        let advs = [0.1, 0.05, 0.0, 0.63];
        let config = DecompositionConfig {
            compute_sensitivities: true,
            ..Default::default()
        };
        let cut = decompose_circle(advs, config).unwrap();
        assert!(cut.interface_vertices(0).count() > 0);
        let cfg = VerificationConfig::default();
        let r = check_sensitivities(&cut, 1e-6, &cfg, |adv, delta| {
            let mut shifted = advs;
            shifted[adv] += delta;
            decompose_circle(shifted, DecompositionConfig::default())
        })
        .unwrap();
        assert!(r <= cfg.sensitivity_tolerance);
    }

    #[test]
    fn wrong_sensitivities_are_reported() {
        let advs = [0.1, 0.05, 0.0, 0.63];
        let config = DecompositionConfig {
            compute_sensitivities: true,
            ..Default::default()
        };
        let cut = decompose_circle(advs, config).unwrap();
        // shifting twice as far doubles the differences
        let err = check_sensitivities(&cut, 1e-6, &VerificationConfig::default(), |adv, delta| {
            let mut shifted = advs;
            shifted[adv] += 2.0 * delta;
            decompose_circle(shifted, DecompositionConfig::default())
        })
        .unwrap_err();
        assert!(matches!(err, MeshError::VerificationFailed(_)));
    }

    #[test]
    fn interface_vertices_without_sensitivities_are_reported() {
        let cut = decompose_circle([0.1, 0.05, 0.0, 0.63], DecompositionConfig::default()).unwrap();
        let err = check_sensitivities(&cut, 1e-6, &VerificationConfig::default(), |_, _| {
            unreachable!("no design variable to shift")
        })
        .unwrap_err();
        assert!(matches!(err, MeshError::VerificationFailed(_)));
    }
}
