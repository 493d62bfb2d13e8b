// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for pmhmc stepping and forward-model operations.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (quadrature non-convergence, geometry
//! mismatch) rather than parsing opaque strings.

use std::fmt;

/// Errors arising from time integration or solver construction.
#[derive(Debug, Clone)]
pub enum PmhmcError {
    /// Adaptive quadrature exhausted its subdivision budget before reaching
    /// the absolute-error target. Carries the interval and the best error
    /// estimate achieved.
    QuadratureNonConvergence {
        /// Lower integration bound.
        lo: f64,
        /// Upper integration bound.
        hi: f64,
        /// Smallest absolute-error estimate reached before giving up.
        best_error: f64,
    },

    /// Solver construction rejected inconsistent geometry (mesh size,
    /// particle grid, box size, domain count).
    ConfigMismatch(String),
}

impl fmt::Display for PmhmcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuadratureNonConvergence { lo, hi, best_error } => write!(
                f,
                "Quadrature failed to converge on [{lo}, {hi}]: best error estimate {best_error:e}"
            ),
            Self::ConfigMismatch(msg) => write!(f, "Inconsistent solver configuration: {msg}"),
        }
    }
}

impl std::error::Error for PmhmcError {}
