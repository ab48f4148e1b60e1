#![cfg_attr(docsrs, feature(doc_cfg))]
//! # xfem-sieve
//!
//! xfem-sieve is the geometry-driven decomposition and basis-enrichment core of
//! an immersed-boundary finite element code. Given a background mesh and one or
//! more level-set geometries it cuts every crossed cell into a conforming
//! simplex child mesh, groups the child elements into subphases, and assigns
//! each background basis function one enrichment level per disconnected
//! material region in its support.
//!
//! ## Features
//! - Analytic (plane, sphere) and discrete (node-sampled) level sets with dx/dp
//! - Quad4/Hex8 template subdivision and conforming Tri3/Tet4 cutting
//! - Rank-independent vertex keys and collective global id assignment
//! - Subphase graph, per-basis flood fill, and subphase groups on coarse bases
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Pipeline
//!
//! ```rust
//! use xfem_sieve::prelude::*;
//! use xfem_sieve::background::meshgen::structured_quad_mesh;
//!
//! # fn main() -> Result<(), MeshError> {
//! let ctx = ParallelContext::init(NoComm, ParallelConfig::default())?;
//! let mut mesh = structured_quad_mesh([0.0, 0.0], [2.0, 1.0], [2, 1])?;
//! let plane = Plane::new([0.7, 0.0, 0.0], [1.0, 0.0, 0.0])?;
//! let cut = DecompositionModel::with_geometries(vec![Box::new(plane)], DecompositionConfig::default())?
//!     .decompose(&mut mesh, &ctx)?;
//! let basis = LagrangeBasis::new(&mesh)?;
//! let enriched = Enrichment::new(&cut, &mesh, &basis, EnrichmentConfig::default())?.perform(&ctx)?;
//! assert_eq!(enriched.num_cells(), cut.subphases().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Determinism
//!
//! Child meshes are built cell-locally, created vertices are named by
//! [`cut::VertexKey`], and every flood fill visits its nodes in key order, so
//! ranks holding the same cells build identical subphases and levels without
//! communicating. Only vertex ids and coefficient ids are agreed collectively.

pub mod algs;
pub mod background;
pub mod config;
pub mod cut;
pub mod debug_invariants;
pub mod enrich;
pub mod geometry;
pub mod mesh_error;
pub mod topology;
pub mod verify;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::context::ParallelContext;
    pub use crate::background::basis::{
        BaseInterpolation, CoarseGrid, CoarseLagrangeBasis, InterpolationBasis, LagrangeBasis,
    };
    pub use crate::background::mesh::{BackgroundMesh, BackgroundMeshBuilder};
    pub use crate::config::{
        DecompositionConfig, EnrichmentConfig, EnrichmentRank, ParallelConfig, VerificationConfig,
    };
    pub use crate::cut::{CutMesh, DecompositionModel, SubphaseKey};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::enrich::{
        EnrichedInterpolationMesh, Enrichment, EnrichmentFields, VertexEnrichment,
    };
    pub use crate::geometry::level_set::{DiscreteField, Geometry, Plane, Sphere};
    pub use crate::mesh_error::MeshError;
    pub use crate::topology::cell_type::CellTopology;
    pub use crate::topology::point::PointId;
}
