//! Background mesh collaborator: storage, structured generators, and the
//! basis interpolation accessors the enrichment engine consumes.

pub mod basis;
pub mod mesh;
pub mod meshgen;

pub use basis::{BaseInterpolation, CoarseGrid, CoarseLagrangeBasis, InterpolationBasis, LagrangeBasis};
pub use mesh::{BackgroundMesh, BackgroundMeshBuilder, FacetNeighbor};
pub use meshgen::{StructuredBox, StructuredCellType};
