//! Typed configuration for the decomposition, enrichment, and parallel layers.
//!
//! Every struct is validated once at construction of the component that uses
//! it; numeric kernels never look up settings by name.

use crate::mesh_error::MeshError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of the geometry engine and decomposition driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Level-set value separating inside (below) from outside (above).
    pub threshold: f64,
    /// Offset applied to node values exactly equal to the threshold, relative
    /// to `max(|threshold|, 1)`.
    pub tie_perturbation: f64,
    /// Minimum distance of an intersection from an edge endpoint, in the
    /// edge-local coordinate `[-1, 1]`.
    pub edge_perturbation: f64,
    /// Central-difference step for discrete-geometry sensitivities.
    pub fd_step: f64,
    /// Compute dx/dp at every interface vertex.
    pub compute_sensitivities: bool,
    /// Residual tolerance of the parent-interpolant root refinement.
    pub root_tolerance: f64,
    /// Iteration cap of the parent-interpolant root refinement.
    pub root_max_iterations: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            tie_perturbation: 1e-12,
            edge_perturbation: 1e-10,
            fd_step: 1e-6,
            compute_sensitivities: false,
            root_tolerance: 1e-13,
            root_max_iterations: 60,
        }
    }
}

impl DecompositionConfig {
    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), MeshError> {
        if !self.threshold.is_finite() {
            return Err(MeshError::InvalidConfig("threshold must be finite".into()));
        }
        if !(self.tie_perturbation > 0.0) {
            return Err(MeshError::InvalidConfig(
                "tie_perturbation must be positive".into(),
            ));
        }
        if !(self.edge_perturbation > 0.0 && self.edge_perturbation < 1.0) {
            return Err(MeshError::InvalidConfig(
                "edge_perturbation must lie in (0, 1)".into(),
            ));
        }
        if !(self.fd_step > 0.0) {
            return Err(MeshError::InvalidConfig("fd_step must be positive".into()));
        }
        if !(self.root_tolerance > 0.0) || self.root_max_iterations == 0 {
            return Err(MeshError::InvalidConfig(
                "root refinement needs a positive tolerance and at least one iteration".into(),
            ));
        }
        Ok(())
    }
}

/// Which discretization the enrichment is expressed on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum EnrichmentRank {
    /// Flood fill over subphases with the background basis.
    #[default]
    Background,
    /// Flood fill over subphase groups of a coarser (B-spline) basis.
    Coarse,
}

/// Settings of the enrichment engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub rank: EnrichmentRank,
    /// Drop vertex-enrichment entries whose weight is exactly zero.
    pub condense_zero_weights: bool,
    /// Prefix of the per-basis enrichment-level field names.
    pub field_prefix: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            rank: EnrichmentRank::Background,
            condense_zero_weights: true,
            field_prefix: "enrichment_level".into(),
        }
    }
}

impl EnrichmentConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.field_prefix.is_empty() {
            return Err(MeshError::InvalidConfig(
                "field_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Settings of the parallel context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Upper bound on a single blocking receive. `None` blocks indefinitely.
    pub recv_timeout: Option<Duration>,
}

impl ParallelConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.recv_timeout.is_some_and(|t| t.is_zero()) {
            return Err(MeshError::InvalidConfig(
                "recv_timeout must be non-zero when set".into(),
            ));
        }
        Ok(())
    }
}

/// Tolerances of the diagnostic checks in [`crate::verify`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Relative mismatch allowed between cut and uncut volume.
    pub volume_tolerance: f64,
    /// Absolute level-set residual allowed at interface vertices.
    pub interface_tolerance: f64,
    /// Physical distance allowed by the parametric round trip.
    pub round_trip_tolerance: f64,
    /// Mismatch allowed between dx/dp and central differences of
    /// re-decompositions, relative to `1 + |difference|`.
    pub sensitivity_tolerance: f64,
    /// Distance allowed between copies of one vertex on different ranks.
    pub coordinate_tolerance: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            volume_tolerance: 1e-10,
            interface_tolerance: 1e-8,
            round_trip_tolerance: 1e-10,
            sensitivity_tolerance: 1e-5,
            coordinate_tolerance: 1e-12,
        }
    }
}

impl VerificationConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        let all = [
            self.volume_tolerance,
            self.interface_tolerance,
            self.round_trip_tolerance,
            self.sensitivity_tolerance,
            self.coordinate_tolerance,
        ];
        if all.iter().any(|t| !(*t >= 0.0) || !t.is_finite()) {
            return Err(MeshError::InvalidConfig(
                "verification tolerances must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}
