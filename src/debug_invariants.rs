use crate::mesh_error::MeshError;

/// Structural self-checks of the pipeline's intermediate objects.
pub trait DebugInvariants {
    /// Validate invariants and return the first violation.
    fn validate_invariants(&self) -> Result<(), MeshError>;

    /// Panic on a violation in debug builds or with `check-invariants`.
    fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = self.validate_invariants() {
            panic!("[invariants] {e}");
        }
    }
}

/// Run a fallible check and panic on error when invariant checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
