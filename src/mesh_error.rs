//! MeshError: unified error type for xfem-sieve public APIs
//!
//! Every fallible operation in the decomposition and enrichment pipeline
//! returns this type. Precondition violations are reported immediately; the
//! library never retries or silently repairs malformed input.

use crate::topology::cell_type::CellTopology;
use crate::topology::point::PointId;
use thiserror::Error;

/// Unified error type for decomposition and enrichment operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    /// Attempted to construct a PointId with a zero value (invalid).
    #[error("PointId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidPointId,
    /// An index into an internal table was out of range.
    #[error("{what} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// Every node of an entity lies exactly on the threshold.
    #[error("degenerate entity: every node of {nodes:?} lies on the threshold of geometry {geometry}")]
    DegenerateEntity { nodes: Vec<usize>, geometry: usize },
    /// A cell topology is not handled by the requested operation.
    #[error("unsupported cell topology {0:?}")]
    UnsupportedTopology(CellTopology),
    /// Malformed geometric input.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Spatial dimension disagreement between collaborators.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An object was used before its admission/finalization step.
    #[error("{0} used before it was finalized")]
    NotFinalized(&'static str),
    /// An object was mutated after it was finalized.
    #[error("{0} is finalized and can no longer be modified")]
    AlreadyFinalized(&'static str),
    /// Attempted to admit a subphase group without subphases.
    #[error("subphase group for B-spline cell {bspline_cell} is empty")]
    EmptyGroup { bspline_cell: usize },
    /// A subphase was admitted to two subphase groups.
    #[error("subphase {subphase} belongs to groups {first} and {second}")]
    DuplicateSubphase {
        subphase: usize,
        first: usize,
        second: usize,
    },
    /// A subphase was never admitted to any subphase group.
    #[error("subphase {0} is not part of any subphase group")]
    UnassignedSubphase(usize),
    /// A node id was not found in the background mesh.
    #[error("node {0} not found in background mesh")]
    MissingNode(PointId),
    /// A cell id was not found in the background mesh.
    #[error("cell {0} not found in background mesh")]
    MissingCell(PointId),
    /// A point lacks ownership metadata.
    #[error("point {0} has no ownership entry")]
    MissingOwnership(PointId),
    /// A basis id is not known on this rank.
    #[error("basis {0} is not known on this rank")]
    UnknownBasis(u64),
    /// A subphase key is not known on this rank.
    #[error("subphase (cell {cell}, ordinal {ordinal}) is not known on this rank")]
    UnknownSubphase { cell: u64, ordinal: u64 },
    /// An enrichment level was requested for a unit outside the basis support.
    #[error("basis {basis} has no enrichment level on unit {unit}")]
    MissingEnrichmentLevel { basis: usize, unit: usize },
    /// Communication failure with a neighbor rank.
    #[error("communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A blocking receive exceeded the configured timeout.
    #[error("timed out waiting for rank {neighbor} (tag {tag})")]
    CommTimeout { neighbor: usize, tag: u16 },
    /// Received buffer size did not match the expected record layout.
    #[error("buffer from rank {neighbor}: expected a multiple of {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// Encoding or decoding of a wire payload failed.
    #[error("wire encoding error: {0}")]
    Wire(String),
    /// A diagnostic check did not hold.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

impl From<bincode::Error> for MeshError {
    fn from(err: bincode::Error) -> Self {
        MeshError::Wire(err.to_string())
    }
}
