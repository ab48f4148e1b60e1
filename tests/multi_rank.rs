//! Decomposition and enrichment split over two in-process ranks must agree
//! with the serial run on everything that is global.

use std::collections::BTreeMap;
use std::thread;

use xfem_sieve::background::meshgen::{StructuredBox, StructuredCellType};
use xfem_sieve::prelude::*;
use xfem_sieve::verify;

type CellCoefficients = BTreeMap<(u64, usize), BTreeMap<u64, u64>>;

struct RankResult {
    cells: CellCoefficients,
    total: u64,
    num_owned: usize,
    num_global_vertices: usize,
    phase_volumes: Vec<f64>,
    distinct_ids: Option<usize>,
}

fn grid() -> StructuredBox {
    StructuredBox::new_2d(6, 4, [-1.0, -1.0], [1.0, 1.0], StructuredCellType::Quadrilateral)
        .unwrap()
}

fn circle() -> Box<dyn Geometry> {
    // crosses the x = 0 column boundary between the two ranks
    Box::new(Sphere::new([0.05, 0.02, 0.0], 0.6).unwrap())
}

fn run<C: Communicator>(comm: C, size: usize) -> RankResult {
    let rank = comm.rank();
    let ctx = ParallelContext::init(comm, ParallelConfig::default()).unwrap();
    let mut mesh = grid().build_partitioned(rank, size).unwrap();
    let cut = DecompositionModel::with_geometries(vec![circle()], DecompositionConfig::default())
        .unwrap()
        .decompose(&mut mesh, &ctx)
        .unwrap();
    let basis = LagrangeBasis::new(&mesh).unwrap();
    let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
        .unwrap()
        .perform(&ctx)
        .unwrap();

    let mut cells = CellCoefficients::new();
    for cell in enriched.cells() {
        let mut by_basis = BTreeMap::new();
        for (&b, &c) in cell.basis_indices.iter().zip(&cell.coefficient_ids) {
            by_basis.insert(basis.basis_id(b).unwrap(), c);
        }
        cells.insert((cell.key.cell.get(), cell.key.ordinal), by_basis);
    }
    let cfg = VerificationConfig::default();
    let phase_volumes = verify::check_volume_conservation(&cut, &mesh, &cfg, &ctx).unwrap();
    let distinct_ids = verify::check_vertex_coordinates(&cut, &cfg, &ctx).unwrap();
    RankResult {
        cells,
        total: enriched.coefficients().total(),
        num_owned: enriched.coefficients().num_owned(),
        num_global_vertices: cut.id_summary().num_global,
        phase_volumes,
        distinct_ids,
    }
}

fn run_two_ranks() -> Vec<RankResult> {
    let handles: Vec<_> = LocalComm::world(2)
        .into_iter()
        .map(|comm| thread::spawn(move || run(comm, 2)))
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn shared_cells_see_identical_coefficients() {
    let results = run_two_ranks();
    let mut compared = 0;
    for (key, coeffs) in &results[0].cells {
        if let Some(other) = results[1].cells.get(key) {
            assert_eq!(coeffs, other, "subphase {key:?}");
            compared += 1;
        }
    }
    // two aura columns of four cells, at least one subphase each
    assert!(compared >= 8);
}

#[test]
fn global_counts_match_the_serial_run() {
    let serial = run(NoComm, 1);
    let results = run_two_ranks();
    for r in &results {
        assert_eq!(r.total, serial.total);
        assert_eq!(r.num_global_vertices, serial.num_global_vertices);
        for (a, b) in r.phase_volumes.iter().zip(&serial.phase_volumes) {
            assert!((a - b).abs() < 1e-10);
        }
    }
    let owned: usize = results.iter().map(|r| r.num_owned).sum();
    assert_eq!(owned as u64, serial.total);
}

#[test]
fn created_vertices_agree_across_ranks() {
    let serial = run(NoComm, 1);
    let results = run_two_ranks();
    assert_eq!(results[0].distinct_ids, Some(serial.num_global_vertices));
    assert_eq!(results[1].distinct_ids, None);
}

#[test]
fn every_subphase_sees_the_serial_bases() {
    let serial = run(NoComm, 1);
    let results = run_two_ranks();
    for r in &results {
        for (key, coeffs) in &r.cells {
            let expected = &serial.cells[key];
            // numbering differs between runs; the bases present must not
            assert!(coeffs.keys().eq(expected.keys()), "subphase {key:?}");
            assert!(coeffs.values().all(|&c| c < r.total));
        }
    }
}
