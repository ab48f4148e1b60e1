//! Rank-wide arena of cut-mesh vertices.
//!
//! Every vertex referenced by a child mesh lives in one [`VertexTable`] and is
//! addressed by an integer handle. Handles of background nodes equal their
//! background node index; created vertices follow in creation order. Each
//! vertex carries a [`VertexKey`] that identifies it identically on every
//! rank, so global ids can be agreed on without exchanging coordinates.

use crate::mesh_error::MeshError;
use crate::topology::point::PointId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rank-independent identity of a vertex.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VertexKey {
    /// A background node, by global id.
    Background(u64),
    /// Centre of a parent side, by its sorted node ids.
    FaceCenter(Vec<u64>),
    /// Centre of a parent cell, by cell id.
    CellCenter(u64),
    /// Intersection of an edge with a geometry's interface. Endpoints are sorted.
    Interface {
        geometry: u32,
        edge: Box<(VertexKey, VertexKey)>,
    },
}

impl VertexKey {
    pub fn interface(geometry: usize, a: &VertexKey, b: &VertexKey) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        VertexKey::Interface {
            geometry: geometry as u32,
            edge: Box::new((lo.clone(), hi.clone())),
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, VertexKey::Interface { .. })
    }

    pub fn background_id(&self) -> Option<u64> {
        match self {
            VertexKey::Background(id) => Some(*id),
            _ => None,
        }
    }

    /// Edge key of a vertex pair, independent of order.
    pub fn edge(a: &VertexKey, b: &VertexKey) -> (VertexKey, VertexKey) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }
}

/// How a vertex came to be.
#[derive(Clone, Debug, PartialEq)]
pub enum VertexOrigin {
    Background { node: usize },
    /// Face or cell centre inserted by a subdivision template.
    Template,
    /// Placed on edge `(a, b)` (vertex handles) at `fraction` from `a`.
    Interface {
        geometry: usize,
        edge: [usize; 2],
        fraction: f64,
    },
}

#[derive(Clone, Debug)]
pub struct CutVertex {
    pub key: VertexKey,
    pub coords: [f64; 3],
    /// Row in the geometry engine's phase table.
    pub row: usize,
    pub origin: VertexOrigin,
    pub id: Option<PointId>,
    pub owner: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct VertexTable {
    vertices: Vec<CutVertex>,
    index: HashMap<VertexKey, usize>,
    num_background: usize,
}

impl VertexTable {
    /// Table seeded with the background nodes; handle `n` is node `n`.
    pub fn with_background(
        nodes: impl IntoIterator<Item = (PointId, [f64; 3], usize)>,
    ) -> Self {
        let mut table = Self::default();
        for (n, (id, coords, owner)) in nodes.into_iter().enumerate() {
            let key = VertexKey::Background(id.get());
            table.index.insert(key.clone(), n);
            table.vertices.push(CutVertex {
                key,
                coords,
                row: n,
                origin: VertexOrigin::Background { node: n },
                id: Some(id),
                owner: Some(owner),
            });
        }
        table.num_background = table.vertices.len();
        table
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn num_background(&self) -> usize {
        self.num_background
    }

    pub fn get(&self, handle: usize) -> Result<&CutVertex, MeshError> {
        self.vertices.get(handle).ok_or(MeshError::IndexOutOfBounds {
            what: "cut vertex",
            index: handle,
            len: self.vertices.len(),
        })
    }

    pub fn find(&self, key: &VertexKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Insert a vertex unless one with the same key exists; returns the handle
    /// and whether it was created.
    pub fn get_or_insert_with(
        &mut self,
        key: VertexKey,
        make: impl FnOnce() -> Result<CutVertex, MeshError>,
    ) -> Result<(usize, bool), MeshError> {
        if let Some(&h) = self.index.get(&key) {
            return Ok((h, false));
        }
        let vertex = make()?;
        debug_assert_eq!(vertex.key, key);
        let h = self.vertices.len();
        self.index.insert(key, h);
        self.vertices.push(vertex);
        Ok((h, true))
    }

    /// Vertices created by the decomposition, in handle order.
    pub fn created(&self) -> impl Iterator<Item = (usize, &CutVertex)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .skip(self.num_background)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CutVertex)> + '_ {
        self.vertices.iter().enumerate()
    }

    pub fn set_global_id(&mut self, handle: usize, id: PointId, owner: usize) -> Result<(), MeshError> {
        let len = self.vertices.len();
        let v = self.vertices.get_mut(handle).ok_or(MeshError::IndexOutOfBounds {
            what: "cut vertex",
            index: handle,
            len,
        })?;
        v.id = Some(id);
        v.owner = Some(owner);
        Ok(())
    }

    /// Global id of a vertex; created vertices have one only after identification.
    pub fn global_id(&self, handle: usize) -> Result<PointId, MeshError> {
        self.get(handle)?
            .id
            .ok_or(MeshError::NotFinalized("cut vertex global id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_key_ignores_edge_direction() {
        let a = VertexKey::Background(3);
        let b = VertexKey::CellCenter(9);
        assert_eq!(VertexKey::interface(0, &a, &b), VertexKey::interface(0, &b, &a));
        assert_ne!(VertexKey::interface(0, &a, &b), VertexKey::interface(1, &a, &b));
    }

    #[test]
    fn key_order_is_total_and_stable() {
        let mut keys = vec![
            VertexKey::CellCenter(1),
            VertexKey::Background(5),
            VertexKey::FaceCenter(vec![1, 2, 3, 4]),
            VertexKey::Background(2),
        ];
        keys.sort();
        assert_eq!(keys[0], VertexKey::Background(2));
        assert_eq!(keys[3], VertexKey::CellCenter(1));
    }

    #[test]
    fn dedup_by_key() {
        let p = |id| PointId::new(id).unwrap();
        let mut t = VertexTable::with_background([(p(1), [0.0; 3], 0), (p(2), [1.0, 0.0, 0.0], 0)]);
        let key = VertexKey::CellCenter(7);
        let make = || {
            Ok(CutVertex {
                key: VertexKey::CellCenter(7),
                coords: [0.5, 0.5, 0.0],
                row: 2,
                origin: VertexOrigin::Template,
                id: None,
                owner: None,
            })
        };
        assert_eq!(t.get_or_insert_with(key.clone(), make).unwrap(), (2, true));
        assert_eq!(t.get_or_insert_with(key, make).unwrap(), (2, false));
        assert_eq!(t.created().count(), 1);
        assert!(t.global_id(2).is_err());
        assert_eq!(t.global_id(1).unwrap(), p(2));
    }
}
