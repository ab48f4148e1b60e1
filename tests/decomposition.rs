use xfem_sieve::background::meshgen::{structured_hex_mesh, structured_quad_mesh, StructuredBox, StructuredCellType};
use xfem_sieve::cut::vertex::VertexOrigin;
use xfem_sieve::prelude::*;
use xfem_sieve::verify;

fn serial() -> ParallelContext<NoComm> {
    ParallelContext::init(NoComm, ParallelConfig::default()).unwrap()
}

fn decompose(mesh: &mut BackgroundMesh, geometries: Vec<Box<dyn Geometry>>) -> CutMesh {
    DecompositionModel::with_geometries(geometries, DecompositionConfig::default())
        .unwrap()
        .decompose(mesh, &serial())
        .unwrap()
}

#[test]
fn circle_on_quads_conserves_area() {
    let mut mesh = structured_quad_mesh([-1.0, -1.0], [1.0, 1.0], [8, 8]).unwrap();
    let cut = decompose(&mut mesh, vec![Box::new(Sphere::new([0.05, 0.02, 0.0], 0.63).unwrap())]);
    let cfg = VerificationConfig::default();
    let v = verify::check_volume_conservation(&cut, &mesh, &cfg, &serial()).unwrap();
    assert!((v[0] + v[1] - 4.0).abs() < 1e-10);
    let exact = std::f64::consts::PI * 0.63 * 0.63;
    assert!((v[0] - exact).abs() < 0.03 * exact);
    verify::check_interface_fidelity(&cut, &mesh, &cfg).unwrap();
    verify::check_parametric_round_trip(&cut, &mesh, &cfg).unwrap();
}

#[test]
fn triangle_background_is_cut_without_templates() {
    let mut mesh = StructuredBox::new_2d(4, 4, [0.0, 0.0], [1.0, 1.0], StructuredCellType::Triangle)
        .unwrap()
        .build()
        .unwrap();
    // x + y = 0.55, never through a node
    let plane = Plane::new([0.3, 0.25, 0.0], [1.0, 1.0, 0.0]).unwrap();
    let cut = decompose(&mut mesh, vec![Box::new(plane)]);
    assert!(!cut.children().is_empty());
    for (_, v) in cut.vertices().created() {
        assert!(matches!(v.origin, VertexOrigin::Interface { .. }));
    }
    let cfg = VerificationConfig::default();
    let v = verify::check_volume_conservation(&cut, &mesh, &cfg, &serial()).unwrap();
    assert!((v[0] - 0.5 * 0.55 * 0.55).abs() < 1e-12);
}

#[test]
fn two_planes_give_four_phases() {
    let mut mesh = structured_quad_mesh([0.0, 0.0], [1.0, 1.0], [5, 5]).unwrap();
    let vertical = Plane::new([0.33, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
    let horizontal = Plane::new([0.0, 0.61, 0.0], [0.0, 1.0, 0.0]).unwrap();
    let cut = decompose(&mut mesh, vec![Box::new(vertical), Box::new(horizontal)]);
    assert_eq!(cut.num_phases(), 4);
    let m = cut.phase_measures(&mesh).unwrap();
    // bit g set when outside geometry g
    let expected = [0.33 * 0.61, 0.67 * 0.61, 0.33 * 0.39, 0.67 * 0.39];
    for (got, want) in m.iter().zip(expected) {
        assert!((got - want).abs() < 1e-10, "{got} vs {want}");
    }
    // the cell holding the crossing point sees both interfaces
    let both = cut
        .children()
        .iter()
        .filter(|c| c.num_subphases() == 4)
        .count();
    assert_eq!(both, 1);
}

#[test]
fn sphere_in_hexes_conserves_volume() {
    let exact = 4.0 / 3.0 * std::f64::consts::PI * 0.31f64.powi(3);
    let mut errors = Vec::new();
    for n in [8, 16] {
        let mut mesh = structured_hex_mesh([0.0; 3], [1.0; 3], [n, n, n]).unwrap();
        let sphere = Sphere::new([0.52, 0.47, 0.5], 0.31).unwrap();
        let cut = decompose(&mut mesh, vec![Box::new(sphere)]);
        let cfg = VerificationConfig::default();
        let v = verify::check_volume_conservation(&cut, &mesh, &cfg, &serial()).unwrap();
        assert!((v[0] + v[1] - 1.0).abs() < 1e-10);
        assert!(verify::check_interface_fidelity(&cut, &mesh, &cfg).unwrap() <= 1e-8);
        assert!(verify::check_parametric_round_trip(&cut, &mesh, &cfg).unwrap() <= 1e-10);
        for child in cut.children() {
            assert_eq!(child.topology(), CellTopology::Tet4);
            for e in 0..child.num_elements() {
                assert!(child.element_param_measure(e).unwrap() > 0.0);
            }
        }
        errors.push((v[0] - exact).abs() / exact);
    }
    // the trilinear interface of a sphere with r/h = 2.5 misses about 8% of
    // its volume, and the gap shrinks with h^2
    assert!(errors[1] < 0.05, "{errors:?}");
    assert!(errors[1] < 0.5 * errors[0], "{errors:?}");
}

#[test]
fn created_vertices_get_ids_above_the_background() {
    let mut mesh = structured_quad_mesh([0.0, 0.0], [3.0, 2.0], [3, 2]).unwrap();
    let cut = decompose(&mut mesh, vec![Box::new(Plane::new([1.3, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap())]);
    let summary = cut.id_summary();
    assert_eq!(summary.first_id, mesh.max_local_node_id() + 1);
    let mut ids: Vec<u64> = cut
        .vertices()
        .created()
        .map(|(_, v)| v.id.unwrap().get())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), summary.num_local);
    assert!(ids.iter().all(|&id| id >= summary.first_id));
}

#[test]
fn second_decomposition_is_rejected() {
    let mut mesh = structured_quad_mesh([0.0, 0.0], [1.0, 1.0], [2, 2]).unwrap();
    let _cut = decompose(&mut mesh, vec![Box::new(Plane::new([0.4, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap())]);
    let again = DecompositionModel::with_geometries(
        vec![Box::new(Plane::new([0.6, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap())],
        DecompositionConfig::default(),
    )
    .unwrap()
    .decompose(&mut mesh, &serial());
    assert!(matches!(again, Err(MeshError::AlreadyFinalized(_))));
}

#[test]
fn nodes_on_a_large_threshold_are_still_pushed_outside() {
    let thr = 1e5;
    let config = DecompositionConfig {
        threshold: thr,
        ..Default::default()
    };
    let mut mesh = structured_quad_mesh([0.0, 0.0], [1.0, 1.0], [1, 1]).unwrap();
    let field = DiscreteField::new("offset", vec![thr - 1.0, thr, thr + 1.0, thr]).unwrap();
    let cut = DecompositionModel::with_geometries(vec![Box::new(field)], config)
        .unwrap()
        .decompose(&mut mesh, &serial())
        .unwrap();
    assert!(cut.interface_vertices(0).count() > 0);
    let cfg = VerificationConfig::default();
    assert!(verify::check_interface_fidelity(&cut, &mesh, &cfg).unwrap() <= cfg.interface_tolerance);
    let v = verify::check_volume_conservation(&cut, &mesh, &cfg, &serial()).unwrap();
    assert!((v[0] + v[1] - 1.0).abs() < 1e-10);
    // the interpolant is thr - 1 + x + y: inside is the triangle below x + y = 1
    assert!((v[0] - 0.5).abs() < 1e-6, "{}", v[0]);
}
