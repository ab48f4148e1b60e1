//! Per-basis flood fill: enrichment levels of one basis function.
//!
//! The units in a basis's support are visited in key order; every
//! facet-connected same-phase component gets the next level. A unit therefore
//! has exactly one level per basis, and the levels partition the support.

use std::collections::HashMap;

use crate::algs::flood_fill::flood_fill;
use crate::background::basis::InterpolationBasis;
use crate::enrich::engine::EnrichmentUnits;
use crate::mesh_error::MeshError;

/// Levels of one basis over the units of its support.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasisLevels {
    pub basis: usize,
    /// Support units, ascending by key.
    pub support: Vec<usize>,
    /// Level of `support[i]`.
    pub levels: Vec<usize>,
    pub num_levels: usize,
    /// Smallest-key unit of every level.
    pub representatives: Vec<usize>,
}

impl BasisLevels {
    pub fn level_of(&self, unit: usize) -> Option<usize> {
        self.support
            .iter()
            .position(|&u| u == unit)
            .map(|i| self.levels[i])
    }

    /// Units holding `level`, ascending by key.
    pub fn units_of_level(&self, level: usize) -> impl Iterator<Item = usize> + '_ {
        self.support
            .iter()
            .zip(&self.levels)
            .filter(move |(_, l)| **l == level)
            .map(|(u, _)| *u)
    }
}

/// Support cells of every basis, inverted from `cell_bases`.
pub fn basis_support_cells<B: InterpolationBasis + ?Sized>(
    basis: &B,
) -> Result<Vec<Vec<usize>>, MeshError> {
    let mut support = vec![Vec::new(); basis.num_bases()];
    for cell in 0..basis.num_support_cells() {
        for &b in basis.cell_bases(cell)? {
            let len = support.len();
            support
                .get_mut(b)
                .ok_or(MeshError::IndexOutOfBounds {
                    what: "basis",
                    index: b,
                    len,
                })?
                .push(cell);
        }
    }
    Ok(support)
}

/// Levels of basis `basis`, whose support is `support_cells`.
pub fn flood_fill_basis(
    basis: usize,
    units: &EnrichmentUnits,
    support_cells: &[usize],
) -> BasisLevels {
    let mut support: Vec<usize> = support_cells
        .iter()
        .flat_map(|&c| units.of_support_cell(c).iter().copied())
        .collect();
    support.sort_by_key(|&u| units.key(u));
    support.dedup();
    let position: HashMap<usize, usize> =
        support.iter().enumerate().map(|(i, &u)| (u, i)).collect();

    let (labels, num_levels) = flood_fill(
        support.len(),
        |i| {
            units
                .graph
                .neighbors(support[i])
                .iter()
                .filter_map(|u| position.get(u).copied())
                .collect::<Vec<_>>()
        },
        |_| true,
        |a, b| units.phase(support[a]) == units.phase(support[b]),
    );
    let levels: Vec<usize> = labels.into_iter().map(|l| l.unwrap_or(0)).collect();
    let mut representatives = vec![usize::MAX; num_levels];
    for (i, &l) in levels.iter().enumerate() {
        if representatives[l] == usize::MAX {
            representatives[l] = support[i];
        }
    }
    BasisLevels {
        basis,
        support,
        levels,
        num_levels,
        representatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::engine::UnitKey;
    use crate::enrich::graph::SubphaseGraph;

    fn key(cell: u64, ordinal: u64) -> UnitKey {
        UnitKey { cell, ordinal }
    }

    /// Two support cells: cell 0 holds units 0 (phase 0) and 1 (phase 1),
    /// cell 1 holds units 2 (phase 1) and 3 (phase 0). Only 1 and 2 touch.
    fn units() -> EnrichmentUnits {
        let graph = SubphaseGraph::from_edges(4, [(0, 1), (1, 2), (2, 3)]);
        EnrichmentUnits::new(
            vec![key(1, 0), key(1, 1), key(2, 1), key(2, 0)],
            vec![0, 0, 1, 1],
            vec![0, 1, 1, 0],
            vec![0, 1, 2, 3],
            graph,
            2,
        )
        .unwrap()
    }

    #[test]
    fn disconnected_regions_of_one_phase_get_separate_levels() {
        let units = units();
        let levels = flood_fill_basis(7, &units, &[0, 1]);
        assert_eq!(levels.basis, 7);
        // key order: (1,0) (1,1) (2,0) (2,1)
        assert_eq!(levels.support, vec![0, 1, 3, 2]);
        assert_eq!(levels.levels, vec![0, 1, 2, 1]);
        assert_eq!(levels.num_levels, 3);
        assert_eq!(levels.representatives, vec![0, 1, 3]);
        assert_eq!(levels.level_of(2), Some(1));
        assert_eq!(levels.level_of(9), None);
        assert_eq!(levels.units_of_level(1).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn support_restricts_the_fill() {
        let units = units();
        let levels = flood_fill_basis(0, &units, &[1]);
        assert_eq!(levels.support, vec![3, 2]);
        assert_eq!(levels.num_levels, 2);
        assert_eq!(levels.representatives, vec![3, 2]);
    }
}
