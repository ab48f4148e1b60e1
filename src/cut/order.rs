//! Second-order view of the child meshes.
//!
//! Adds one node at the parametric midpoint of every child edge and maps it
//! through the parent, so curved (bilinear/trilinear) parents keep their
//! shape. Element node order is the corners followed by the edge midpoints in
//! [`CellTopology::edges`](crate::topology::cell_type::CellTopology::edges) order (Tri6 and Tet10 layouts).

use std::collections::HashMap;

use crate::background::mesh::BackgroundMesh;
use crate::cut::model::CutMesh;
use crate::cut::vertex::VertexKey;
use crate::geometry::shape;
use crate::mesh_error::MeshError;

/// A node of a quadratic element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuadraticNode {
    /// A cut-mesh vertex handle.
    Vertex(usize),
    /// Index into [`SecondOrderMesh::midpoints`].
    Midpoint(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Midpoint {
    /// Sorted keys of the edge endpoints.
    pub edge: (VertexKey, VertexKey),
    pub coords: [f64; 3],
}

#[derive(Clone, Debug, Default)]
pub struct SecondOrderMesh {
    pub midpoints: Vec<Midpoint>,
    /// `(child, element, nodes)` per child element.
    pub elements: Vec<(usize, usize, Vec<QuadraticNode>)>,
}

impl SecondOrderMesh {
    pub fn nodes_per_element(dimension: usize) -> usize {
        if dimension == 2 { 6 } else { 10 }
    }
}

/// Build quadratic connectivity for every child mesh. Midpoints on edges
/// shared between children are created once.
pub fn convert_to_second_order(
    cut: &CutMesh,
    mesh: &BackgroundMesh,
) -> Result<SecondOrderMesh, MeshError> {
    let mut out = SecondOrderMesh::default();
    let mut by_edge: HashMap<(VertexKey, VertexKey), usize> = HashMap::new();
    for (idx, child) in cut.children().iter().enumerate() {
        let parent_coords = mesh.cell_coords(child.parent())?;
        let edges = child.topology().edges();
        for e in 0..child.num_elements() {
            let local = child.element(e)?;
            let mut nodes: Vec<QuadraticNode> = local
                .iter()
                .map(|&l| child.vertex_handle(l).map(QuadraticNode::Vertex))
                .collect::<Result<_, _>>()?;
            for &[i, j] in edges {
                let (a, b) = (child.vertex_handle(local[i])?, child.vertex_handle(local[j])?);
                let key = VertexKey::edge(&cut.vertices().get(a)?.key, &cut.vertices().get(b)?.key);
                let m = match by_edge.get(&key) {
                    Some(&m) => m,
                    None => {
                        let xi = shape::lerp(
                            &child.param_coords(local[i])?,
                            &child.param_coords(local[j])?,
                            0.5,
                        );
                        let coords =
                            shape::map_to_physical(child.parent_topology(), &parent_coords, &xi)?;
                        let m = out.midpoints.len();
                        out.midpoints.push(Midpoint {
                            edge: key.clone(),
                            coords,
                        });
                        by_edge.insert(key, m);
                        m
                    }
                };
                nodes.push(QuadraticNode::Midpoint(m));
            }
            out.elements.push((idx, e, nodes));
        }
    }
    log::debug!(
        "second-order view: {} elements, {} midpoints",
        out.elements.len(),
        out.midpoints.len()
    );
    Ok(out)
}
