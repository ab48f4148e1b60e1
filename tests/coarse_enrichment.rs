//! Enrichment on a 2×2 coarse basis over a 4×4 background mesh.

use xfem_sieve::background::meshgen::structured_quad_mesh;
use xfem_sieve::prelude::*;
use xfem_sieve::verify;

struct Setup {
    mesh: BackgroundMesh,
    cut: CutMesh,
    basis: CoarseLagrangeBasis,
    enriched: EnrichedInterpolationMesh,
}

fn setup() -> Setup {
    let ctx = ParallelContext::init(NoComm, ParallelConfig::default()).unwrap();
    let mut mesh = structured_quad_mesh([0.0, 0.0], [2.0, 2.0], [4, 4]).unwrap();
    // cuts the second background column, inside the left coarse column
    let plane = Plane::new([0.7, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
    let cut = DecompositionModel::with_geometries(vec![Box::new(plane)], DecompositionConfig::default())
        .unwrap()
        .decompose(&mut mesh, &ctx)
        .unwrap();
    let grid = CoarseGrid {
        min: [0.0, 0.0, 0.0],
        max: [2.0, 2.0, 0.0],
        cells: [2, 2, 1],
    };
    let basis = CoarseLagrangeBasis::new(&mesh, grid).unwrap();
    let config = EnrichmentConfig {
        rank: EnrichmentRank::Coarse,
        ..EnrichmentConfig::default()
    };
    let enriched = Enrichment::new(&cut, &mesh, &basis, config)
        .unwrap()
        .perform(&ctx)
        .unwrap();
    Setup {
        mesh,
        cut,
        basis,
        enriched,
    }
}

fn coarse_basis(basis: &CoarseLagrangeBasis, i: u64, j: u64) -> usize {
    basis.basis_index(i + 3 * j + 1).unwrap()
}

#[test]
fn cut_coarse_cells_hold_two_groups() {
    let s = setup();
    let info = s.enriched.subphase_groups().unwrap();
    assert_eq!(info.num_groups(), 6);
    assert_eq!(s.enriched.units().len(), 6);
    for sc in 0..s.basis.num_support_cells() {
        let (lo, _) = s.basis.cell_bounds(sc).unwrap();
        let expected = if lo[0] < 0.5 { 2 } else { 1 };
        assert_eq!(info.groups_of_bspline_cell(sc).len(), expected, "coarse cell {sc}");
    }
}

#[test]
fn levels_follow_the_coarse_columns() {
    let s = setup();
    for j in 0..3 {
        assert_eq!(s.enriched.num_levels(coarse_basis(&s.basis, 0, j)), 2);
        assert_eq!(s.enriched.num_levels(coarse_basis(&s.basis, 1, j)), 2);
        assert_eq!(s.enriched.num_levels(coarse_basis(&s.basis, 2, j)), 1);
    }
    assert_eq!(s.enriched.coefficients().total(), 15);
    let pairs = verify::check_enrichment_partition(&s.enriched, &s.cut, &s.basis).unwrap();
    assert_eq!(pairs, 15);
}

#[test]
fn enriched_cells_carry_the_coarse_bases() {
    let s = setup();
    assert_eq!(s.enriched.num_cells(), s.cut.subphases().len());
    for cell in s.enriched.cells() {
        assert_eq!(cell.basis_indices.len(), 4);
        assert_eq!(cell.coefficient_ids.len(), 4);
    }
}

#[test]
fn only_the_sliver_group_reaches_the_right_side() {
    let s = setup();
    let info = s.enriched.subphase_groups().unwrap();
    // coarse cell 0 spans [0, 1]²; background cell 0 lies in its left column
    let bounds = s.basis.cell_bounds(0).unwrap();
    let topology = s.basis.topology();
    let groups = info.groups_of_bspline_cell(0);
    assert_eq!(groups.len(), 2);
    for &g in groups {
        let group = info.group(g).unwrap();
        let sides = group
            .ligament_side_ordinals(&s.cut, &s.mesh, topology, bounds)
            .unwrap();
        let holds_left_column = group.cells(s.cut.subphases()).contains(&0);
        if holds_left_column {
            assert!(sides.contains(&3));
            assert!(!sides.contains(&1));
        } else {
            assert!(sides.contains(&1));
            assert!(!sides.contains(&3));
        }
    }
}
