//! `PointId`: a strong, zero-cost handle for global mesh ids
//!
//! Background nodes, background cells, and vertices created by the cut-mesh
//! decomposition are all identified across ranks by a `PointId`. The wrapper
//! around `NonZeroU64` reserves 0 as an invalid or sentinel value.

use crate::mesh_error::MeshError;
use std::{fmt, num::NonZeroU64};

/// Global identifier of a node, cell, or cut vertex.
///
/// # Memory layout
/// This type is `repr(transparent)`, meaning it has the same ABI and
/// alignment as its single field (`NonZeroU64`) and can be put on the wire
/// exactly like a `u64`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct PointId(NonZeroU64);

impl PointId {
    /// Creates a new `PointId` from a raw `u64` value.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidPointId`] if `raw == 0`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use xfem_sieve::topology::point::PointId;
    /// let p = PointId::new(1).unwrap();
    /// assert_eq!(p.get(), 1);
    /// ```
    #[inline]
    pub fn new(raw: u64) -> Result<Self, MeshError> {
        NonZeroU64::new(raw)
            .map(PointId)
            .ok_or(MeshError::InvalidPointId)
    }

    /// Returns the inner `u64` value of this `PointId`.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Zero-based position derived from the id (`id - 1`).
    #[inline]
    pub fn index(self) -> usize {
        (self.get() - 1) as usize
    }
}

// -----------------------------------------------------------------------------
// Formatting traits
// -----------------------------------------------------------------------------

/// Custom `Debug` implementation to display as `PointId(raw_value)`.
impl fmt::Debug for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PointId").field(&self.get()).finish()
    }
}

/// Prints only the raw integer.
impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
