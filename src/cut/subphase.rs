//! Subphases: facet-connected same-phase regions of a parent cell.
//!
//! An intersected parent holds one subphase per connected component of its
//! child elements with equal phase; an uncut parent is a single subphase.
//! [`SubphaseKey`] is `(parent cell id, ordinal)` and is the same on every
//! rank that holds the parent.

use crate::algs::flood_fill::flood_fill;
use crate::cut::child_mesh::ChildMesh;
use crate::mesh_error::MeshError;
use crate::topology::point::PointId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubphaseKey {
    pub cell: PointId,
    pub ordinal: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subphase {
    pub key: SubphaseKey,
    /// Background cell index of the parent.
    pub cell: usize,
    pub phase: usize,
    /// Child mesh index, `None` for an uncut parent.
    pub child: Option<usize>,
}

/// Flood-fill the elements of `child` into subphases and record them on it.
pub fn assign_subphases(child: &mut ChildMesh) -> Result<usize, MeshError> {
    let n = child.num_elements();
    let phases = (0..n)
        .map(|e| child.element_phase(e))
        .collect::<Result<Vec<_>, _>>()?;
    let neighbors = child.element_neighbors();
    let (labels, count) = flood_fill(
        n,
        |e| neighbors[e].iter().copied(),
        |_| true,
        |a, b| phases[a] == phases[b],
    );
    let element_subphase: Vec<usize> = labels.into_iter().map(|l| l.unwrap_or(0)).collect();
    let mut subphase_phase = vec![0; count];
    for (e, &sp) in element_subphase.iter().enumerate() {
        subphase_phase[sp] = phases[e];
    }
    child.set_subphases(element_subphase, subphase_phase)?;
    Ok(count)
}

/// All subphases known to a rank, ordered by background cell then ordinal.
#[derive(Clone, Debug, Default)]
pub struct SubphaseTable {
    subphases: Vec<Subphase>,
    by_key: HashMap<SubphaseKey, usize>,
    /// First subphase of each background cell; `len = num_cells + 1`.
    cell_offsets: Vec<usize>,
}

impl SubphaseTable {
    /// Build from per-cell subphase lists, given in background cell order.
    pub fn from_cells(cells: Vec<Vec<Subphase>>) -> Result<Self, MeshError> {
        let mut table = Self {
            cell_offsets: Vec::with_capacity(cells.len() + 1),
            ..Default::default()
        };
        table.cell_offsets.push(0);
        for list in cells {
            for sp in list {
                let idx = table.subphases.len();
                if let Some(first) = table.by_key.insert(sp.key, idx) {
                    return Err(MeshError::DuplicateSubphase {
                        subphase: sp.key.ordinal,
                        first,
                        second: idx,
                    });
                }
                table.subphases.push(sp);
            }
            table.cell_offsets.push(table.subphases.len());
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.subphases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subphases.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Subphase, MeshError> {
        self.subphases.get(index).ok_or(MeshError::IndexOutOfBounds {
            what: "subphase",
            index,
            len: self.subphases.len(),
        })
    }

    pub fn index_of(&self, key: &SubphaseKey) -> Result<usize, MeshError> {
        self.by_key
            .get(key)
            .copied()
            .ok_or(MeshError::UnknownSubphase {
                cell: key.cell.get(),
                ordinal: key.ordinal as u64,
            })
    }

    /// Subphase indices of background cell `cell`.
    pub fn of_cell(&self, cell: usize) -> std::ops::Range<usize> {
        match (self.cell_offsets.get(cell), self.cell_offsets.get(cell + 1)) {
            (Some(&lo), Some(&hi)) => lo..hi,
            _ => 0..0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Subphase)> + '_ {
        self.subphases.iter().enumerate()
    }
}
