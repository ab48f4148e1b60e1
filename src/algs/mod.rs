//! Rank-level algorithms shared by the decomposition and enrichment layers.

pub mod communicator;
pub mod context;
pub mod flood_fill;
pub mod wire;

pub use communicator::{CommTag, Communicator, LocalComm, NoComm};
pub use context::ParallelContext;
pub use flood_fill::flood_fill;
