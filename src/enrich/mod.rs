//! Basis enrichment over the subphases of a cut mesh.

pub mod coefficients;
pub mod engine;
pub mod export;
pub mod flood_fill;
pub mod graph;
pub mod groups;
pub mod interpolation;

pub use coefficients::CoefficientTable;
pub use engine::{Enrichment, EnrichmentUnits, UnitKey};
pub use export::EnrichmentFields;
pub use flood_fill::BasisLevels;
pub use graph::SubphaseGraph;
pub use groups::{BsplineMeshInfo, SubphaseGroup};
pub use interpolation::{EnrichedCell, EnrichedInterpolationMesh, EnrichedVertex, VertexEnrichment};
