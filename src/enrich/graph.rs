//! CSR facet-adjacency graph of subphases.
//!
//! Two subphases are adjacent when a child facet (or a whole parent side of
//! an uncut cell) of one coincides with a facet of the other. Neighbour lists
//! are sorted and symmetric, without self loops:
//!
//! * `xadj[i] .. xadj[i+1]` indexes the neighbours of subphase `i`
//! * `adjncy` holds the concatenated neighbour lists

use std::collections::{BTreeSet, HashMap};

use crate::background::mesh::BackgroundMesh;
use crate::debug_invariants::DebugInvariants;
use crate::cut::model::CutMesh;
use crate::mesh_error::MeshError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubphaseGraph {
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
}

/// What a cell presents on one of its sides.
enum SideView {
    /// Uncut cell: the single subphase covers the whole side.
    Whole(usize),
    /// Cut cell: subphase of every child facet, keyed by sorted vertex handles.
    Facets(HashMap<Vec<usize>, usize>),
}

impl SubphaseGraph {
    /// Symmetric CSR graph over `n` nodes from an undirected edge list.
    pub fn from_edges(n: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for (a, b) in edges {
            if a != b && a < n && b < n {
                adj[a].insert(b);
                adj[b].insert(a);
            }
        }
        let mut xadj = Vec::with_capacity(n + 1);
        let mut adjncy = Vec::new();
        xadj.push(0);
        for list in adj {
            adjncy.extend(list);
            xadj.push(adjncy.len());
        }
        Self { xadj, adjncy }
    }

    /// Facet adjacency of every subphase of `cut`.
    pub fn build(cut: &CutMesh, mesh: &BackgroundMesh) -> Result<Self, MeshError> {
        let table = cut.subphases();
        let mut edges = Vec::new();

        for cell in 0..mesh.num_cells() {
            let Some(child) = cut.child_of(cell) else {
                continue;
            };
            let base = table.of_cell(cell).start;
            for (e, nbrs) in child.element_neighbors().iter().enumerate() {
                let sa = child.element_subphase(e)?;
                for &f in nbrs {
                    let sb = child.element_subphase(f)?;
                    if sa != sb {
                        edges.push((base + sa, base + sb));
                    }
                }
            }
        }

        for cell in 0..mesh.num_cells() {
            for side in 0..mesh.cell_topology(cell)?.num_sides() {
                let Some(nb) = mesh.facet_neighbor(cell, side) else {
                    continue;
                };
                if nb.cell < cell {
                    continue;
                }
                let lhs = side_view(cut, cell, side)?;
                let rhs = side_view(cut, nb.cell, nb.side)?;
                match (lhs, rhs) {
                    (SideView::Whole(a), SideView::Whole(b)) => edges.push((a, b)),
                    (SideView::Whole(a), SideView::Facets(f))
                    | (SideView::Facets(f), SideView::Whole(a)) => {
                        edges.extend(f.into_values().map(|sp| (a, sp)));
                    }
                    (SideView::Facets(l), SideView::Facets(r)) => {
                        for (key, sa) in l {
                            match r.get(&key) {
                                Some(&sb) => edges.push((sa, sb)),
                                None => log::trace!(
                                    "cells {cell}/{}: child facet {key:?} has no match",
                                    nb.cell
                                ),
                            }
                        }
                    }
                }
            }
        }
        let graph = Self::from_edges(table.len(), edges);
        graph.debug_assert_invariants();
        log::debug!(
            "subphase graph: {} subphases, {} edges",
            graph.num_nodes(),
            graph.num_edges()
        );
        Ok(graph)
    }

    pub fn num_nodes(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    /// Undirected edge count.
    pub fn num_edges(&self) -> usize {
        self.adjncy.len() / 2
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        match (self.xadj.get(i), self.xadj.get(i + 1)) {
            (Some(&lo), Some(&hi)) => &self.adjncy[lo..hi],
            _ => &[],
        }
    }

    /// Graph of the classes of `map` (node → class); classes are adjacent
    /// when any of their members are.
    pub fn quotient(&self, map: &[usize], num_classes: usize) -> Self {
        let edges = (0..self.num_nodes()).flat_map(|i| {
            self.neighbors(i)
                .iter()
                .filter(move |&&j| j > i)
                .map(move |&j| (map[i], map[j]))
        });
        Self::from_edges(num_classes, edges)
    }
}

impl DebugInvariants for SubphaseGraph {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        if self.xadj.first() != Some(&0) || self.xadj.last() != Some(&self.adjncy.len()) {
            return Err(MeshError::InvalidGeometry(
                "subphase graph offsets do not span the adjacency".into(),
            ));
        }
        for i in 0..self.num_nodes() {
            let nbrs = self.neighbors(i);
            if nbrs.windows(2).any(|w| w[0] >= w[1]) || nbrs.contains(&i) {
                return Err(MeshError::InvalidGeometry(format!(
                    "subphase {i}: neighbours {nbrs:?} are not sorted and loop-free"
                )));
            }
            if let Some(&j) = nbrs.iter().find(|&&j| self.neighbors(j).binary_search(&i).is_err()) {
                return Err(MeshError::InvalidGeometry(format!(
                    "subphase edge {i} -> {j} has no reverse"
                )));
            }
        }
        Ok(())
    }
}

fn side_view(cut: &CutMesh, cell: usize, side: usize) -> Result<SideView, MeshError> {
    let range = cut.subphases().of_cell(cell);
    match cut.child_of(cell) {
        None => Ok(SideView::Whole(range.start)),
        Some(child) => {
            let mut facets = HashMap::new();
            for (e, key) in child.side_facets(side)? {
                facets.insert(key, range.start + child.element_subphase(e)?);
            }
            Ok(SideView::Facets(facets))
        }
    }
}
