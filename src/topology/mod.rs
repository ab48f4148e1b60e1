//! Topology primitives shared by the background mesh and the cut mesh.
//!
//! - [`point::PointId`]: global ids for nodes, cells, and cut vertices
//! - [`cell_type::CellTopology`]: reference-element tables (vertices, sides, edges)
//! - [`ownership::PointOwnership`]: owning rank and ghost flags per id

pub mod cell_type;
pub mod ownership;
pub mod point;

pub use cell_type::CellTopology;
pub use ownership::PointOwnership;
pub use point::PointId;
