//! Reference subdivision templates of intersected parent cells.
//!
//! Templates depend on topology only: `Quad4` → 4 `Tri3` around the cell
//! centre, `Hex8` → 24 `Tet4` (one per face edge, joining the face centre and
//! the cell centre). Simplices are their own template. Shared sides produce
//! the same sub-facets from both sides, so templated neighbours conform.

use crate::geometry::shape;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;

/// A vertex of a template element.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TemplatePoint {
    /// Parent vertex, by local index.
    Parent(usize),
    /// Centre of a parent side, by side ordinal.
    FaceCenter(usize),
    CellCenter,
}

/// Template elements of a parent topology.
pub fn template_elements(topology: CellTopology) -> Vec<Vec<TemplatePoint>> {
    use TemplatePoint::*;
    match topology {
        CellTopology::Tri3 => vec![vec![Parent(0), Parent(1), Parent(2)]],
        CellTopology::Tet4 => vec![vec![Parent(0), Parent(1), Parent(2), Parent(3)]],
        CellTopology::Quad4 => topology
            .sides()
            .iter()
            .map(|s| vec![Parent(s[0]), Parent(s[1]), CellCenter])
            .collect(),
        CellTopology::Hex8 => {
            let mut out = Vec::with_capacity(24);
            for (f, face) in topology.sides().iter().enumerate() {
                for i in 0..face.len() {
                    let a = face[i];
                    let b = face[(i + 1) % face.len()];
                    out.push(vec![Parent(a), Parent(b), FaceCenter(f), CellCenter]);
                }
            }
            out
        }
    }
}

/// Parametric coordinates of a template point.
pub fn template_point_coords(topology: CellTopology, point: TemplatePoint) -> Result<[f64; 3], MeshError> {
    let refs = topology.reference_vertices();
    match point {
        TemplatePoint::Parent(v) => refs.get(v).copied().ok_or(MeshError::IndexOutOfBounds {
            what: "parent vertex",
            index: v,
            len: refs.len(),
        }),
        TemplatePoint::FaceCenter(s) => {
            let side = topology.sides().get(s).ok_or(MeshError::IndexOutOfBounds {
                what: "parent side",
                index: s,
                len: topology.num_sides(),
            })?;
            let pts: Vec<[f64; 3]> = side.iter().map(|&v| refs[v]).collect();
            Ok(shape::centroid(&pts))
        }
        TemplatePoint::CellCenter => Ok(topology.reference_center()),
    }
}

/// Put a simplex in positive orientation with respect to `coords`.
pub fn orient(element: &mut [usize], coords: impl Fn(usize) -> [f64; 3]) -> Result<(), MeshError> {
    let pts: Vec<[f64; 3]> = element.iter().map(|&v| coords(v)).collect();
    if shape::simplex_measure(&pts)? < 0.0 {
        let n = element.len();
        element.swap(n - 2, n - 1);
    }
    Ok(())
}

/// Measure of a straight-sided first-order cell, by its template simplices.
pub fn cell_measure(topology: CellTopology, vertices: &[[f64; 3]]) -> Result<f64, MeshError> {
    if vertices.len() != topology.num_vertices() {
        return Err(MeshError::InvalidGeometry(format!(
            "{topology:?} needs {} vertices, got {}",
            topology.num_vertices(),
            vertices.len()
        )));
    }
    let point = |p: TemplatePoint| -> [f64; 3] {
        match p {
            TemplatePoint::Parent(v) => vertices[v],
            TemplatePoint::FaceCenter(s) => {
                let pts: Vec<[f64; 3]> = topology.sides()[s].iter().map(|&v| vertices[v]).collect();
                shape::centroid(&pts)
            }
            TemplatePoint::CellCenter => shape::centroid(vertices),
        }
    };
    template_elements(topology)
        .into_iter()
        .map(|el| {
            let pts: Vec<[f64; 3]> = el.into_iter().map(point).collect();
            shape::simplex_measure(&pts).map(f64::abs)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_sizes() {
        assert_eq!(template_elements(CellTopology::Tri3).len(), 1);
        assert_eq!(template_elements(CellTopology::Quad4).len(), 4);
        assert_eq!(template_elements(CellTopology::Tet4).len(), 1);
        assert_eq!(template_elements(CellTopology::Hex8).len(), 24);
    }

    #[test]
    fn hex_template_fills_reference_cell() {
        let refs = CellTopology::Hex8.reference_vertices();
        let vol = cell_measure(CellTopology::Hex8, refs).unwrap();
        assert!((vol - 8.0).abs() < 1e-12);
        let quad = cell_measure(CellTopology::Quad4, CellTopology::Quad4.reference_vertices()).unwrap();
        assert!((quad - 4.0).abs() < 1e-12);
    }

    #[test]
    fn face_center_of_hex_bottom() {
        let c = template_point_coords(CellTopology::Hex8, TemplatePoint::FaceCenter(4)).unwrap();
        assert_eq!(c, [0.0, 0.0, -1.0]);
    }

    #[test]
    fn orient_flips_negative_simplex() {
        let pts = [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
        let mut el = [0, 1, 2];
        orient(&mut el, |v| pts[v]).unwrap();
        assert_eq!(el, [0, 2, 1]);
    }
}
