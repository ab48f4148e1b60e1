//! Conforming splits of a simplex crossed by one interface.
//!
//! The splits only decide connectivity. Quadrilateral faces that appear on a
//! simplex side are always cut by the diagonal through their smallest vertex
//! key, so two neighbours that see the same face choose the same diagonal
//! without talking to each other, on any rank.

use crate::mesh_error::MeshError;

/// Rotations and reflections of a prism that bring vertex `m` to position 0
/// while keeping the vertical edges `(i, i + 3)`.
const PRISM_INDIRECTION: [[usize; 6]; 6] = [
    [0, 1, 2, 3, 4, 5],
    [1, 2, 0, 4, 5, 3],
    [2, 0, 1, 5, 3, 4],
    [3, 5, 4, 0, 2, 1],
    [4, 3, 5, 1, 0, 2],
    [5, 4, 3, 2, 1, 0],
];

/// Split a simplex by the sign pattern `below` of its vertices.
///
/// `cut` returns the interface vertex on the edge between two vertices of
/// opposite sign; `key` orders vertices for diagonal choices. Returns the
/// sub-simplices, unoriented, or the element itself when it is not crossed.
pub fn split_simplex<K: Ord>(
    element: &[usize],
    below: &[bool],
    cut: impl Fn(usize, usize) -> Option<usize>,
    key: impl Fn(usize) -> K,
) -> Result<Vec<Vec<usize>>, MeshError> {
    if element.len() != below.len() {
        return Err(MeshError::DimensionMismatch {
            expected: element.len(),
            found: below.len(),
        });
    }
    let k = below.iter().filter(|b| **b).count();
    if k == 0 || k == element.len() {
        return Ok(vec![element.to_vec()]);
    }
    let edge = |a: usize, b: usize| {
        cut(a, b).ok_or_else(|| {
            MeshError::InvalidGeometry(format!("missing interface vertex on edge ({a}, {b})"))
        })
    };
    match element.len() {
        3 => {
            let i = lone_vertex(below);
            let (a, b, c) = (element[i], element[(i + 1) % 3], element[(i + 2) % 3]);
            let (pab, pac) = (edge(a, b)?, edge(a, c)?);
            let mut out = vec![vec![a, pab, pac]];
            out.extend(split_quad([pab, b, c, pac], &key));
            Ok(out)
        }
        4 if k == 1 || k == 3 => {
            let i = lone_vertex(below);
            let a = element[i];
            let rest: Vec<usize> = (0..4).filter(|&j| j != i).map(|j| element[j]).collect();
            let (b, c, d) = (rest[0], rest[1], rest[2]);
            let (pab, pac, pad) = (edge(a, b)?, edge(a, c)?, edge(a, d)?);
            let mut out = vec![vec![a, pab, pac, pad]];
            out.extend(split_prism([pab, pac, pad, b, c, d], &key));
            Ok(out)
        }
        4 => {
            let side: Vec<usize> = (0..4).filter(|&j| below[j]).map(|j| element[j]).collect();
            let other: Vec<usize> = (0..4).filter(|&j| !below[j]).map(|j| element[j]).collect();
            let (a, b, c, d) = (side[0], side[1], other[0], other[1]);
            let (pac, pad, pbc, pbd) = (edge(a, c)?, edge(a, d)?, edge(b, c)?, edge(b, d)?);
            let mut out = split_prism([a, pac, pad, b, pbc, pbd], &key);
            out.extend(split_prism([c, pac, pbc, d, pad, pbd], &key));
            Ok(out)
        }
        n => Err(MeshError::InvalidGeometry(format!(
            "cannot split a simplex with {n} vertices"
        ))),
    }
}

/// Index of the vertex whose sign differs from all the others.
fn lone_vertex(below: &[bool]) -> usize {
    let k = below.iter().filter(|b| **b).count();
    let lone_is_below = k == 1;
    below
        .iter()
        .position(|&b| b == lone_is_below)
        .unwrap_or(0)
}

/// Two triangles of the quad `[q0, q1, q2, q3]` (cyclic order), cut along the
/// diagonal through the smallest key.
pub fn split_quad<K: Ord>(quad: [usize; 4], key: impl Fn(usize) -> K) -> Vec<Vec<usize>> {
    let min = (0..4).min_by_key(|&i| key(quad[i])).unwrap_or(0);
    let [q0, q1, q2, q3] = quad;
    if min % 2 == 0 {
        vec![vec![q0, q1, q2], vec![q0, q2, q3]]
    } else {
        vec![vec![q0, q1, q3], vec![q1, q2, q3]]
    }
}

/// Three tetrahedra of the prism `[v0, v1, v2 | v3, v4, v5]`, whose vertical
/// edges are `(vi, vi+3)`. Every quad face is cut through its smallest key.
pub fn split_prism<K: Ord>(prism: [usize; 6], key: impl Fn(usize) -> K) -> Vec<Vec<usize>> {
    let keys: Vec<K> = prism.iter().map(|&v| key(v)).collect();
    let m = (0..6).min_by(|&i, &j| keys[i].cmp(&keys[j])).unwrap_or(0);
    let perm = PRISM_INDIRECTION[m];
    let v = perm.map(|i| prism[i]);
    let k = |i: usize| &keys[perm[i]];
    let through_v1_v5 = std::cmp::min(k(1), k(5)) < std::cmp::min(k(2), k(4));
    if through_v1_v5 {
        vec![
            vec![v[0], v[1], v[2], v[5]],
            vec![v[0], v[1], v[5], v[4]],
            vec![v[0], v[4], v[5], v[3]],
        ]
    } else {
        vec![
            vec![v[0], v[1], v[2], v[4]],
            vec![v[0], v[4], v[2], v[5]],
            vec![v[0], v[4], v[5], v[3]],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::shape::simplex_measure;
    use std::collections::{BTreeMap, HashSet};

    fn total_measure(elements: &[Vec<usize>], pts: &BTreeMap<usize, [f64; 3]>) -> f64 {
        elements
            .iter()
            .map(|e| {
                let p: Vec<[f64; 3]> = e.iter().map(|v| pts[v]).collect();
                simplex_measure(&p).unwrap().abs()
            })
            .sum()
    }

    #[test]
    fn triangle_split_conserves_area() {
        let mut pts = BTreeMap::from([
            (0, [0.0, 0.0, 0.0]),
            (1, [1.0, 0.0, 0.0]),
            (2, [0.0, 1.0, 0.0]),
        ]);
        pts.insert(10, [0.3, 0.0, 0.0]);
        pts.insert(11, [0.0, 0.3, 0.0]);
        let cut = |a: usize, b: usize| match (a.min(b), a.max(b)) {
            (0, 1) => Some(10),
            (0, 2) => Some(11),
            _ => None,
        };
        let out = split_simplex(&[0, 1, 2], &[true, false, false], cut, |v| v).unwrap();
        assert_eq!(out.len(), 3);
        assert!((total_measure(&out, &pts) - 0.5).abs() < 1e-14);
        assert_eq!(out[0], vec![0, 10, 11]);
    }

    #[test]
    fn uncut_simplex_is_returned_as_is() {
        let out = split_simplex(&[4, 5, 6], &[false; 3], |_, _| None, |v| v).unwrap();
        assert_eq!(out, vec![vec![4, 5, 6]]);
    }

    #[test]
    fn tet_splits_conserve_volume() {
        let base = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        for pattern in [
            [true, false, false, false],
            [false, true, true, true],
            [true, true, false, false],
            [true, false, true, false],
        ] {
            let mut pts: BTreeMap<usize, [f64; 3]> = (0..4).map(|i| (i, base[i])).collect();
            let mut cuts = BTreeMap::new();
            for a in 0..4 {
                for b in a + 1..4 {
                    if pattern[a] != pattern[b] {
                        let h = 10 + cuts.len();
                        pts.insert(h, crate::geometry::shape::lerp(&base[a], &base[b], 0.4));
                        cuts.insert((a, b), h);
                    }
                }
            }
            let cut = |a: usize, b: usize| cuts.get(&(a.min(b), a.max(b))).copied();
            let out = split_simplex(&[0, 1, 2, 3], &pattern, cut, |v| v).unwrap();
            let expected = if pattern.iter().filter(|b| **b).count() == 2 { 6 } else { 4 };
            assert_eq!(out.len(), expected);
            assert!((total_measure(&out, &pts) - 1.0 / 6.0).abs() < 1e-14);
            for e in &out {
                let distinct: HashSet<_> = e.iter().collect();
                assert_eq!(distinct.len(), 4);
            }
        }
    }

    #[test]
    fn prism_diagonals_pass_through_smallest_key() {
        // keys chosen so vertex 4 is the smallest
        let keys = [5, 3, 6, 2, 0, 1];
        let tets = split_prism([0, 1, 2, 3, 4, 5], |v| keys[v]);
        assert_eq!(tets.len(), 3);
        // quad face (0, 1, 4, 3) must be cut along 4-0
        let faces_with_0_and_4 = tets
            .iter()
            .filter(|t| t.contains(&0) && t.contains(&4))
            .count();
        assert!(faces_with_0_and_4 >= 1);
        assert!(!tets.iter().any(|t| t.contains(&1) && t.contains(&3)));
    }

    #[test]
    fn quad_diagonal_follows_smallest_key() {
        assert_eq!(split_quad([7, 3, 9, 8], |v| v), vec![vec![7, 3, 8], vec![3, 9, 8]]);
        assert_eq!(split_quad([2, 3, 9, 8], |v| v), vec![vec![2, 3, 9], vec![2, 9, 8]]);
    }
}
