//! Cut-mesh decomposition of intersected background cells.
//!
//! - [`vertex`]: rank-wide vertex arena and deterministic vertex keys
//! - [`child_mesh`]: simplex sub-mesh of one parent cell
//! - [`templates`], [`conform`]: template subdivision and conforming splits
//! - [`subphase`]: facet-connected same-phase regions
//! - [`global_ids`]: collective id agreement for created vertices
//! - [`model`]: the decomposition driver and its [`CutMesh`] output
//! - [`order`]: quadratic (Tri6/Tet10) view of the child meshes

pub mod child_mesh;
pub mod conform;
pub mod global_ids;
pub mod model;
pub mod order;
pub mod subphase;
pub mod templates;
pub mod vertex;

pub use child_mesh::ChildMesh;
pub use model::{CutMesh, DecompositionModel};
pub use subphase::{Subphase, SubphaseKey, SubphaseTable};
pub use vertex::{CutVertex, VertexKey, VertexOrigin, VertexTable};
