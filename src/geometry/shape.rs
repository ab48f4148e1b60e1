//! Shape functions and parametric ↔ physical mappings for first-order cells.
//!
//! Coordinates are carried as `[f64; 3]` and padded with zeros in 2D. The
//! vertex ordering and parametric domains are those of [`CellTopology`].

use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;

/// Evaluate the shape functions of `topology` at the parametric point `xi`.
pub fn shape_values(topology: CellTopology, xi: &[f64; 3]) -> Vec<f64> {
    match topology {
        CellTopology::Tri3 => vec![1.0 - xi[0] - xi[1], xi[0], xi[1]],
        CellTopology::Tet4 => vec![1.0 - xi[0] - xi[1] - xi[2], xi[0], xi[1], xi[2]],
        CellTopology::Quad4 => topology
            .reference_vertices()
            .iter()
            .map(|v| 0.25 * (1.0 + v[0] * xi[0]) * (1.0 + v[1] * xi[1]))
            .collect(),
        CellTopology::Hex8 => topology
            .reference_vertices()
            .iter()
            .map(|v| 0.125 * (1.0 + v[0] * xi[0]) * (1.0 + v[1] * xi[1]) * (1.0 + v[2] * xi[2]))
            .collect(),
    }
}

/// Parametric gradients of the shape functions of `topology` at `xi`.
pub fn shape_gradients(topology: CellTopology, xi: &[f64; 3]) -> Vec<[f64; 3]> {
    match topology {
        CellTopology::Tri3 => vec![[-1.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        CellTopology::Tet4 => vec![
            [-1.0, -1.0, -1.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ],
        CellTopology::Quad4 => topology
            .reference_vertices()
            .iter()
            .map(|v| {
                let (a, b) = (1.0 + v[0] * xi[0], 1.0 + v[1] * xi[1]);
                [0.25 * v[0] * b, 0.25 * v[1] * a, 0.0]
            })
            .collect(),
        CellTopology::Hex8 => topology
            .reference_vertices()
            .iter()
            .map(|v| {
                let (a, b, c) = (
                    1.0 + v[0] * xi[0],
                    1.0 + v[1] * xi[1],
                    1.0 + v[2] * xi[2],
                );
                [
                    0.125 * v[0] * b * c,
                    0.125 * v[1] * a * c,
                    0.125 * v[2] * a * b,
                ]
            })
            .collect(),
    }
}

/// Directional derivative of the shape functions at `xi` along `dir`.
pub fn shape_derivatives_along(topology: CellTopology, xi: &[f64; 3], dir: &[f64; 3]) -> Vec<f64> {
    shape_gradients(topology, xi)
        .into_iter()
        .map(|g| dot(g, *dir))
        .collect()
}

/// Interpolate nodal `values` at `xi` with the shape functions of `topology`.
pub fn interpolate(topology: CellTopology, values: &[f64], xi: &[f64; 3]) -> Result<f64, MeshError> {
    check_len(topology, values.len())?;
    Ok(shape_values(topology, xi)
        .iter()
        .zip(values)
        .map(|(n, v)| n * v)
        .sum())
}

/// Map a parametric point to physical space.
pub fn map_to_physical(
    topology: CellTopology,
    vertices: &[[f64; 3]],
    xi: &[f64; 3],
) -> Result<[f64; 3], MeshError> {
    check_len(topology, vertices.len())?;
    let mut x = [0.0; 3];
    for (n, v) in shape_values(topology, xi).iter().zip(vertices) {
        for d in 0..3 {
            x[d] += n * v[d];
        }
    }
    Ok(x)
}

/// Signed measure of a straight simplex: area for 3 vertices, volume for 4.
pub fn simplex_measure(vertices: &[[f64; 3]]) -> Result<f64, MeshError> {
    match vertices.len() {
        3 => {
            let a = sub(vertices[1], vertices[0]);
            let b = sub(vertices[2], vertices[0]);
            Ok(0.5 * (a[0] * b[1] - a[1] * b[0]))
        }
        4 => {
            let a = sub(vertices[1], vertices[0]);
            let b = sub(vertices[2], vertices[0]);
            let c = sub(vertices[3], vertices[0]);
            Ok(dot(a, cross(b, c)) / 6.0)
        }
        n => Err(MeshError::InvalidGeometry(format!(
            "simplex with {n} vertices is not supported"
        ))),
    }
}

/// Linear interpolation between two points.
pub fn lerp(a: &[f64; 3], b: &[f64; 3], t: f64) -> [f64; 3] {
    [
        a[0] + t * (b[0] - a[0]),
        a[1] + t * (b[1] - a[1]),
        a[2] + t * (b[2] - a[2]),
    ]
}

/// Arithmetic mean of a set of points.
pub fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    let mut c = [0.0; 3];
    for p in points {
        for d in 0..3 {
            c[d] += p[d];
        }
    }
    let n = points.len().max(1) as f64;
    [c[0] / n, c[1] / n, c[2] / n]
}

/// Euclidean distance.
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d = sub(*a, *b);
    dot(d, d).sqrt()
}

fn check_len(topology: CellTopology, len: usize) -> Result<(), MeshError> {
    if len != topology.num_vertices() {
        return Err(MeshError::InvalidGeometry(format!(
            "vertex count mismatch for {topology:?}: expected {}, got {len}",
            topology.num_vertices()
        )));
    }
    Ok(())
}

#[inline]
fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CellTopology; 4] = [
        CellTopology::Tri3,
        CellTopology::Quad4,
        CellTopology::Tet4,
        CellTopology::Hex8,
    ];

    #[test]
    fn partition_of_unity_and_kronecker() {
        for topo in ALL {
            let refs = topo.reference_vertices();
            for (i, v) in refs.iter().enumerate() {
                let n = shape_values(topo, v);
                for (j, nj) in n.iter().enumerate() {
                    let want = if i == j { 1.0 } else { 0.0 };
                    assert!((nj - want).abs() < 1e-14);
                }
            }
            let s: f64 = shape_values(topo, &topo.reference_center()).iter().sum();
            assert!((s - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn gradients_match_finite_differences() {
        let xi = [0.3, -0.2, 0.1];
        let h = 1e-7;
        for topo in ALL {
            let grads = shape_gradients(topo, &xi);
            assert_eq!(grads.len(), topo.num_vertices());
            for d in 0..topo.dimension() {
                let (mut plus, mut minus) = (xi, xi);
                plus[d] += h;
                minus[d] -= h;
                let (np, nm) = (shape_values(topo, &plus), shape_values(topo, &minus));
                for (i, g) in grads.iter().enumerate() {
                    let fd = (np[i] - nm[i]) / (2.0 * h);
                    assert!((g[d] - fd).abs() < 1e-7, "{topo:?} node {i} dir {d}");
                }
            }
            let total: f64 = shape_derivatives_along(topo, &xi, &[1.0, 1.0, 1.0]).iter().sum();
            assert!(total.abs() < 1e-14);
        }
    }

    #[test]
    fn quad_maps_center_to_centroid() {
        let verts = [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let x = map_to_physical(CellTopology::Quad4, &verts, &[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(x, [1.0, 0.5, 0.0]);
    }

    #[test]
    fn simplex_measures() {
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!((simplex_measure(&tri).unwrap() - 0.5).abs() < 1e-15);
        let tet = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        assert!((simplex_measure(&tet).unwrap() - 1.0 / 6.0).abs() < 1e-15);
    }

    #[test]
    fn interpolate_rejects_wrong_length() {
        assert!(interpolate(CellTopology::Quad4, &[1.0, 2.0], &[0.0; 3]).is_err());
    }
}
