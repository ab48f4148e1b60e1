//! Two unit quads side by side: cut along their shared edge, and cut by a
//! saddle field that leaves three subphases in each quad.
//!
//! On this mesh the shared edge is the only facet between the quads and the
//! parent interpolant is linear along it, so it carries at most two
//! same-phase segments. Subphases of one phase inside one quad are never
//! adjacent, hence a shared-edge basis has `subphases - segments` levels.

use proptest::prelude::*;
use xfem_sieve::background::meshgen::structured_quad_mesh;
use xfem_sieve::prelude::*;
use xfem_sieve::verify;

fn decompose_and_enrich() -> (BackgroundMesh, CutMesh, LagrangeBasis, EnrichedInterpolationMesh) {
    let ctx = ParallelContext::init(NoComm, ParallelConfig::default()).unwrap();
    let mut mesh = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
    // phi = x - 1: the shared edge lies exactly on the threshold
    let plane = Plane::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
    let cut = DecompositionModel::with_geometries(vec![Box::new(plane)], DecompositionConfig::default())
        .unwrap()
        .decompose(&mut mesh, &ctx)
        .unwrap();
    let basis = LagrangeBasis::new(&mesh).unwrap();
    let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
        .unwrap()
        .perform(&ctx)
        .unwrap();
    (mesh, cut, basis, enriched)
}

#[test]
fn shared_edge_bases_get_two_levels() {
    let (mesh, _cut, basis, enriched) = decompose_and_enrich();
    // nodes 2 and 5 sit on x = 1
    for id in [2u64, 5] {
        let b = basis.basis_index(id).unwrap();
        assert_eq!(enriched.num_levels(b), 2, "basis {id}");
        let cells: Vec<usize> = mesh
            .node_cells(b)
            .unwrap()
            .to_vec();
        assert_eq!(cells, vec![0, 1]);
    }
    // the right column is uncut and outside
    for id in [3u64, 6] {
        assert_eq!(enriched.num_levels(basis.basis_index(id).unwrap()), 1);
    }
}

#[test]
fn one_enriched_cell_per_subphase() {
    let (_mesh, cut, _basis, enriched) = decompose_and_enrich();
    // ties go outside, so the left quad keeps an outside sliver along x = 1
    assert_eq!(cut.subphases().len(), 3);
    assert_eq!(enriched.num_cells(), cut.subphases().len());
    for (sp, cell) in enriched.cells().iter().enumerate() {
        assert_eq!(cell.subphase, sp);
        assert_eq!(cell.key, cut.subphases().get(sp).unwrap().key);
        assert_eq!(cell.vertices.len(), 4);
    }
    let phases: Vec<usize> = enriched.cells().iter().map(|c| c.phase).collect();
    assert_eq!(phases.iter().filter(|&&p| p == 0).count(), 1);
}

#[test]
fn outside_sliver_shares_levels_with_the_right_cell() {
    let (_mesh, cut, basis, enriched) = decompose_and_enrich();
    let right = cut.subphases().of_cell(1).start;
    let sliver = cut
        .subphases()
        .of_cell(0)
        .find(|&sp| cut.subphases().get(sp).unwrap().phase == 1)
        .unwrap();
    let b = basis.basis_index(2).unwrap();
    assert_eq!(
        enriched.subphase_level(b, sliver).unwrap(),
        enriched.subphase_level(b, right).unwrap()
    );
    let checked = verify::check_enrichment_partition(&enriched, &cut, &basis).unwrap();
    assert_eq!(checked as u64, enriched.coefficients().total());
    assert_eq!(enriched.coefficients().total(), 10);
}

#[test]
fn level_fields_export_to_json() {
    let (_mesh, _cut, basis, enriched) = decompose_and_enrich();
    let fields = EnrichmentFields::from_mesh(&enriched, &basis, "enrichment_level").unwrap();
    let json = serde_json::to_value(&fields).unwrap();
    let shared = json["fields"]["enrichment_level_2"].as_array().unwrap();
    assert_eq!(shared.len(), 3);
    let mut levels: Vec<i64> = shared.iter().map(|v| v.as_i64().unwrap()).collect();
    levels.sort_unstable();
    levels.dedup();
    assert_eq!(levels, vec![0, 1]);
    // node 1 has no support in the right quad
    let left = json["fields"]["enrichment_level_1"].as_array().unwrap();
    assert_eq!(left[2].as_i64(), Some(-1));
}

/// Node values in index order: bottom row x = 0, 1, 2, then the top row.
fn decompose_field(values: Vec<f64>) -> (CutMesh, LagrangeBasis, EnrichedInterpolationMesh) {
    let ctx = ParallelContext::init(NoComm, ParallelConfig::default()).unwrap();
    let mut mesh = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
    let field = DiscreteField::new("phi", values).unwrap();
    let cut = DecompositionModel::with_geometries(vec![Box::new(field)], DecompositionConfig::default())
        .unwrap()
        .decompose(&mut mesh, &ctx)
        .unwrap();
    let basis = LagrangeBasis::new(&mesh).unwrap();
    let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
        .unwrap()
        .perform(&ctx)
        .unwrap();
    (cut, basis, enriched)
}

#[test]
fn saddles_give_six_enriched_cells() {
    // both quads average to +0.5, so each keeps one outside region joined
    // through its centre and two isolated inside corners
    let (cut, basis, enriched) = decompose_field(vec![-1.0, 2.0, -1.0, 2.0, -1.0, 2.0]);
    assert_eq!(cut.subphases().len(), 6);
    assert_eq!(cut.subphases().of_cell(0).len(), 3);
    assert_eq!(cut.subphases().of_cell(1).len(), 3);
    assert_eq!(enriched.num_cells(), 6);
    for (sp, cell) in enriched.cells().iter().enumerate() {
        assert_eq!(cell.subphase, sp);
    }
    let inside = enriched.cells().iter().filter(|c| c.phase == 0).count();
    assert_eq!(inside, 4);

    // the shared edge changes sign once: two segments glue six subphases
    // into four regions
    for id in [2u64, 5] {
        assert_eq!(enriched.num_levels(basis.basis_index(id).unwrap()), 4, "basis {id}");
    }
    // corner bases see three disconnected regions of their own quad
    for id in [1u64, 3, 4, 6] {
        assert_eq!(enriched.num_levels(basis.basis_index(id).unwrap()), 3, "basis {id}");
    }
    let pairs = verify::check_enrichment_partition(&enriched, &cut, &basis).unwrap();
    assert_eq!(pairs as u64, enriched.coefficients().total());
}

fn signed(magnitude: f64, negative: bool) -> f64 {
    if negative { -magnitude } else { magnitude }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn shared_edge_levels_count_subphases_minus_segments(
        magnitudes in prop::array::uniform6(0.1f64..1.0),
        negative in prop::array::uniform6(any::<bool>()),
    ) {
        let values: Vec<f64> = magnitudes
            .iter()
            .zip(negative)
            .map(|(&m, n)| signed(m, n))
            .collect();
        let (cut, basis, enriched) = decompose_field(values.clone());
        // shared-edge nodes are indices 1 (y = 0) and 4 (y = 1)
        let segments = if (values[1] < 0.0) == (values[4] < 0.0) { 1 } else { 2 };
        let subphases = cut.subphases().len();
        for id in [2u64, 5] {
            let levels = enriched.num_levels(basis.basis_index(id).unwrap());
            prop_assert_eq!(levels, subphases - segments);
        }
        prop_assert_eq!(enriched.num_cells(), subphases);
    }
}
