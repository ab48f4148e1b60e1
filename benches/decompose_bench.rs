use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use xfem_sieve::background::meshgen::{structured_hex_mesh, structured_quad_mesh};
use xfem_sieve::prelude::*;

fn context() -> ParallelContext<NoComm> {
    ParallelContext::init(NoComm, ParallelConfig::default()).expect("serial context")
}

fn circle() -> Vec<Box<dyn Geometry>> {
    vec![Box::new(Sphere::new([0.03, -0.02, 0.0], 0.61).expect("valid circle"))]
}

fn bench_decompose(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompose");
    let ctx = context();

    for &n in &[16usize, 32, 64] {
        group.bench_with_input(BenchmarkId::new("quad_circle", n), &n, |b, &n| {
            b.iter(|| {
                let mut mesh = structured_quad_mesh([-1.0, -1.0], [1.0, 1.0], [n, n]).unwrap();
                let cut = DecompositionModel::with_geometries(circle(), DecompositionConfig::default())
                    .unwrap()
                    .decompose(&mut mesh, &ctx)
                    .unwrap();
                black_box(cut.subphases().len());
            });
        });
    }

    for &n in &[4usize, 8] {
        group.bench_with_input(BenchmarkId::new("hex_sphere", n), &n, |b, &n| {
            b.iter(|| {
                let mut mesh =
                    structured_hex_mesh([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0], [n, n, n]).unwrap();
                let sphere = Sphere::new([0.03, -0.02, 0.01], 0.61).unwrap();
                let cut = DecompositionModel::with_geometries(
                    vec![Box::new(sphere)],
                    DecompositionConfig::default(),
                )
                .unwrap()
                .decompose(&mut mesh, &ctx)
                .unwrap();
                black_box(cut.subphases().len());
            });
        });
    }

    group.finish();
}

fn bench_enrich(c: &mut Criterion) {
    let mut group = c.benchmark_group("enrich");
    let ctx = context();

    for &n in &[16usize, 32, 64] {
        let mut mesh = structured_quad_mesh([-1.0, -1.0], [1.0, 1.0], [n, n]).unwrap();
        let cut = DecompositionModel::with_geometries(circle(), DecompositionConfig::default())
            .unwrap()
            .decompose(&mut mesh, &ctx)
            .unwrap();
        let basis = LagrangeBasis::new(&mesh).unwrap();

        group.bench_with_input(BenchmarkId::new("background", n), &n, |b, _| {
            b.iter(|| {
                let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())
                    .unwrap()
                    .perform(&ctx)
                    .unwrap();
                black_box(enriched.coefficients().total());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decompose, bench_enrich);
criterion_main!(benches);
