// SPDX-License-Identifier: AGPL-3.0-only

//! FLRW background cosmology and perturbation growth factors.
//!
//! All growth quantities derive from the exact LCDM integral solution of the
//! linear growth equation,
//!
//!   D(a) ∝ E(a) · ∫₀ᵃ da' / (a' E(a'))³,
//!
//! normalized so D1(1) = 1, with the second-order factor in the standard
//! Ωm(a)^(-1/143) approximation (Bouchet et al. 1995, A&A 296, 575). The
//! 3/7 second-order prefactor is folded into `growth_factor2`, so the 2LPT
//! displacement is simply x = q + D1·dx1 + D2·dx2 with the solver's
//! same-kernel dx1/dx2 convention (both are −∇∇⁻² of their sources).
//!
//! Time-integral conventions follow the COLA time variable: `q_factor(a)`
//! is a² da/dt in H0 = 1 units, and the `*_v` quantities are Q·d/da
//! derivatives ("growth-rate units" — converted to km/s only at snapshot
//! time, by 100/a).
//!
//! Scale factors must lie in (0, 1]; a ≤ 0 or a > 1 is a caller
//! precondition violation.

use crate::error::PmhmcError;
use crate::quadrature::integrate;
use crate::tolerances::{QUADRATURE_EPSABS, QUADRATURE_LIMIT};

/// Density parameters of a (possibly curved) FLRW background.
///
/// OmegaK = 1 - omega_m - omega_lambda is implicit. Immutable for the
/// duration of a run.
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Cosmology {
    /// Matter density parameter at a = 1.
    pub omega_m: f64,
    /// Cosmological-constant density parameter at a = 1.
    pub omega_lambda: f64,
}

impl Cosmology {
    /// Flat LCDM: omega_lambda = 1 - omega_m.
    pub fn flat_lcdm(omega_m: f64) -> Self {
        Self {
            omega_m,
            omega_lambda: 1.0 - omega_m,
        }
    }

    /// Curvature density parameter.
    #[must_use]
    pub fn omega_k(&self) -> f64 {
        1.0 - self.omega_m - self.omega_lambda
    }

    /// Dimensionless Hubble rate E(a) = H(a)/H0.
    #[must_use]
    pub fn e_of_a(&self, a: f64) -> f64 {
        (self.omega_m / (a * a * a) + self.omega_k() / (a * a) + self.omega_lambda).sqrt()
    }

    /// dE/da, analytic.
    fn e_prime(&self, a: f64) -> f64 {
        let a2 = a * a;
        (-3.0 * self.omega_m / (a2 * a2) - 2.0 * self.omega_k() / (a2 * a))
            / (2.0 * self.e_of_a(a))
    }

    /// Q(a) = a² da/dt = a³ E(a), the COLA time-variable factor.
    #[must_use]
    pub fn q_factor(&self, a: f64) -> f64 {
        a * a * a * self.e_of_a(a)
    }

    /// Matter fraction at scale factor a: Ωm(a) = Ωm / (a³ E(a)²).
    #[must_use]
    pub fn omega_a(&self, a: f64) -> f64 {
        let e = self.e_of_a(a);
        self.omega_m / (a * a * a * e * e)
    }

    /// G(a) = ∫₀ᵃ da' / (a' E(a'))³. The integrand goes to zero like
    /// a'^(3/2) at the lower bound, so the integral is well behaved.
    fn growth_integral(&self, a: f64) -> Result<f64, PmhmcError> {
        let c = *self;
        integrate(
            move |ap| {
                let ae = ap * c.e_of_a(ap);
                1.0 / (ae * ae * ae)
            },
            0.0,
            a,
            QUADRATURE_EPSABS,
            QUADRATURE_LIMIT,
        )
    }

    /// Unnormalized growing mode D(a) = E(a)·G(a).
    fn growth_unnormalized(&self, a: f64) -> Result<f64, PmhmcError> {
        Ok(self.e_of_a(a) * self.growth_integral(a)?)
    }

    /// Linear growth factor D1(a), normalized to D1(1) = 1.
    ///
    /// Strictly increasing on (0, 1] for any matter-bearing cosmology.
    pub fn growth_factor(&self, a: f64) -> Result<f64, PmhmcError> {
        Ok(self.growth_unnormalized(a)? / self.growth_unnormalized(1.0)?)
    }

    /// Q(a)·dD1/da in the D1(1) = 1 normalization.
    ///
    /// dD/da = E'(a)·G(a) + 1/(a³E(a)²) by the product rule on D = E·G;
    /// E' is analytic so only G needs quadrature.
    pub fn d_prime_q(&self, a: f64) -> Result<f64, PmhmcError> {
        let e = self.e_of_a(a);
        let d_unnorm_prime = self.e_prime(a) * self.growth_integral(a)? + 1.0 / (a * a * a * e * e);
        Ok(self.q_factor(a) * d_unnorm_prime / self.growth_unnormalized(1.0)?)
    }

    /// Second-order growth factor D2(a) = (3/7)·D1(a)²·Ωm(a)^(-1/143).
    ///
    /// The 3/7 prefactor is part of the definition here; the 2LPT solver
    /// produces raw second-order displacements (same −∇∇⁻² kernel as first
    /// order) and this factor carries the whole amplitude.
    pub fn growth_factor2(&self, a: f64) -> Result<f64, PmhmcError> {
        let d1 = self.growth_factor(a)?;
        Ok((3.0 / 7.0) * d1 * d1 * self.omega_a(a).powf(-1.0 / 143.0))
    }

    /// Q(a)·dD2/da via the f2 ≈ 2·Ωm(a)^(6/11) growth-rate approximation:
    /// Q·dD2/da = Q·(D2/a)·2·Ωm(a)^(6/11).
    pub fn growth_factor2v(&self, a: f64) -> Result<f64, PmhmcError> {
        let d2 = self.growth_factor2(a)?;
        Ok(self.q_factor(a) * (d2 / a) * 2.0 * self.omega_a(a).powf(6.0 / 11.0))
    }
}
