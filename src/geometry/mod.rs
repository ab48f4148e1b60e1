//! Level-set geometries and the engine that classifies and intersects with them.
//!
//! - [`level_set`]: the [`Geometry`](level_set::Geometry) trait with analytic and discrete fields
//! - [`engine`]: phase table, edge intersections, and interface sensitivities
//! - [`shape`]: first-order shape functions and parametric mappings

pub mod engine;
pub mod level_set;
pub mod shape;

pub use engine::{GeometryEngine, IntersectionRecord, PhaseTable, Sensitivity};
pub use level_set::{DiscreteField, Geometry, NodeSample, Plane, Sphere};
