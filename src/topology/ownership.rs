//! Ownership metadata for background nodes and cells.
//!
//! The [`PointOwnership`] map records the owning rank of a global id and
//! whether the entity is a ghost (aura copy) on the current rank. Background
//! basis ownership, and therefore the rank that decides enriched coefficient
//! ids, is read from here.

use crate::mesh_error::MeshError;
use crate::topology::point::PointId;

#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OwnershipEntry {
    pub owner: usize,
    pub is_ghost: bool,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PointOwnership {
    my_rank: usize,
    entries: Vec<Option<OwnershipEntry>>,
}

impl PointOwnership {
    /// Create an empty ownership map for `my_rank`.
    pub fn new(my_rank: usize) -> Self {
        Self {
            my_rank,
            entries: Vec::new(),
        }
    }

    /// Rank this map was built for.
    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    /// Insert or update the owner of `point`; ghostness follows from `my_rank`.
    pub fn set_owner(&mut self, point: PointId, owner: usize) {
        let idx = point.index();
        if idx >= self.entries.len() {
            self.entries.resize(idx + 1, None);
        }
        self.entries[idx] = Some(OwnershipEntry {
            owner,
            is_ghost: owner != self.my_rank,
        });
    }

    /// Retrieve the ownership entry for a point.
    pub fn entry(&self, point: PointId) -> Option<OwnershipEntry> {
        self.entries.get(point.index()).copied().flatten()
    }

    /// Retrieve the owning rank or return an error if missing.
    pub fn owner(&self, point: PointId) -> Result<usize, MeshError> {
        self.entry(point)
            .map(|entry| entry.owner)
            .ok_or(MeshError::MissingOwnership(point))
    }

    /// Returns true if the point is owned by this rank.
    pub fn is_owned(&self, point: PointId) -> bool {
        self.entry(point).is_some_and(|entry| !entry.is_ghost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(id: u64) -> PointId {
        PointId::new(id).unwrap()
    }

    #[test]
    fn ghostness_follows_rank() {
        let mut own = PointOwnership::new(1);
        own.set_owner(pt(1), 0);
        own.set_owner(pt(3), 1);
        assert!(!own.is_owned(pt(1)));
        assert!(own.is_owned(pt(3)));
        assert!(own.entry(pt(1)).is_some_and(|e| e.is_ghost));
        assert!(!own.is_owned(pt(2)));
    }

    #[test]
    fn later_owner_replaces_earlier() {
        let mut own = PointOwnership::new(0);
        own.set_owner(pt(2), 3);
        own.set_owner(pt(2), 0);
        assert_eq!(own.owner(pt(2)).unwrap(), 0);
        assert!(own.is_owned(pt(2)));
    }

    #[test]
    fn missing_owner_is_an_error() {
        let own = PointOwnership::new(0);
        assert_eq!(own.owner(pt(5)), Err(MeshError::MissingOwnership(pt(5))));
    }
}
