// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized numerical tolerances with justification.
//!
//! Every threshold used by the integrators and the test suite is defined
//! here with documentation of its origin. No ad-hoc magic numbers.

/// Absolute-error target for the kick/drift time integrals.
///
/// The integrands `1/Q(a)` and `a/Q(a)` are smooth on (0, 1]; a 15-point
/// Kronrod rule resolves them to near machine precision after a handful of
/// bisections. 1e-8 matches the accuracy the stepping scheme needs: time
/// integrals enter positions multiplied by velocities of order unity, so
/// 1e-8 keeps the integration error far below the force error of a PM step.
pub const QUADRATURE_EPSABS: f64 = 1e-8;

/// Subdivision budget for adaptive quadrature.
///
/// 5000 intervals is orders of magnitude beyond what the growth and
/// stepping integrands need (typically < 20); exhausting it indicates a
/// divergent integrand (e.g. `nLPT = 0` in non-standard mode), which is a
/// caller precondition violation surfaced as an error.
pub const QUADRATURE_LIMIT: usize = 5000;

/// Tolerance for operations that should be exact in f64 arithmetic.
///
/// f64 has ~15.9 significant digits; 1e-10 allows several digits of
/// accumulated rounding in compositions of exact operations (e.g. paint
/// then readout, FFT round trips on small meshes).
pub const EXACT_F64: f64 = 1e-10;

/// Tolerance for results limited by the quadrature target rather than f64.
///
/// Growth factors and time integrals are computed to `QUADRATURE_EPSABS`;
/// derived quantities amplify that by background factors of order E(a)
/// (large at small scale factors), so comparisons between independently
/// integrated quantities get two orders of headroom.
pub const INTEGRATED_F64: f64 = 1e-6;

/// Relative tolerance for the finite-difference HMC force check.
///
/// The analytic force differentiates the *spectrally smoothed* density
/// while the finite difference sees the exact CIC-painted chi-square; the
/// discrepancy is bounded by the CIC window and the spectral-derivative
/// error, both O((k dx)^2) — a few percent at the lowest mesh modes.
pub const FORCE_FD_REL: f64 = 0.1;
