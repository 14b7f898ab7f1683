//! Typed failures that callers may want to tell apart. They travel inside
//! `eyre::Report` and can be recovered with `downcast_ref`.

use std::fmt;

/// The SCF loop hit its iteration limit.
#[derive(Debug, Clone, PartialEq)]
pub struct NoScfConvergence {
    pub iterations: usize,
    pub error: f64,
}

impl fmt::Display for NoScfConvergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCF did not converge in {} iterations (error = {:.3e})",
            self.iterations, self.error
        )
    }
}

impl std::error::Error for NoScfConvergence {}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectronCountError(pub String);

impl fmt::Display for ElectronCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Electron count error: {}", self.0)
    }
}

impl std::error::Error for ElectronCountError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionError(pub String);

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Orbital projection failed: {}", self.0)
    }
}

impl std::error::Error for ProjectionError {}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityMatrixError(pub String);

impl fmt::Display for DensityMatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid density matrix: {}", self.0)
    }
}

impl std::error::Error for DensityMatrixError {}
