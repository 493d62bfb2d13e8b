// SPDX-License-Identifier: AGPL-3.0-only

//! Leapfrog (KDK) time integration with growth-factor weighting.
//!
//! Kick and drift advance a particle ensemble between two scale factors
//! using time integrals over the background expansion. Two time-dependence
//! conventions are supported: the standard integrals of `1/Q(a)` (drift)
//! and `a/Q(a)` (kick), and a non-standard generalization that assumes the
//! velocity time dependence v ∝ B·a^nLPT (see Tassev, Zaldarriaga &
//! Eisenstein 2013, §A.3). The kick and drift also carry a COLA
//! compatibility mode that steps the residual against the 2LPT trajectory
//! rather than absolute values.
//!
//! `nLPT` must be nonzero in non-standard mode; values approaching zero
//! are numerically valid but ill-conditioned. That is a caller
//! responsibility, not validated here — a divergent integrand surfaces as
//! a quadrature failure.

use rayon::prelude::*;

use crate::cosmology::Cosmology;
use crate::error::PmhmcError;
use crate::quadrature::integrate;
use crate::store::ParticleStore;
use crate::tolerances::{QUADRATURE_EPSABS, QUADRATURE_LIMIT};

/// Velocity time-dependence convention for the stepping integrals.
#[derive(Clone, Copy, Debug)]
pub enum TimeDependence {
    /// Standard quadrature of the exact integrands.
    Standard,
    /// v ∝ B·a^nLPT ansatz; sane exponents lie in (-4, 3.5), nonzero.
    NonStandard {
        /// The ansatz exponent.
        n_lpt: f64,
    },
}

/// gpQ(a) = a^nLPT.
fn gp_q(a: f64, n_lpt: f64) -> f64 {
    a.powf(n_lpt)
}

/// d(gpQ)/da = nLPT·a^(nLPT-1).
fn der_gp_q(a: f64, n_lpt: f64) -> f64 {
    n_lpt * a.powf(n_lpt - 1.0)
}

/// Kick/drift time-integral evaluator.
#[derive(Clone, Copy, Debug)]
pub struct TimeIntegral {
    cosmology: Cosmology,
    dependence: TimeDependence,
}

impl TimeIntegral {
    /// Evaluator for the given background and time-dependence convention.
    #[must_use]
    pub fn new(cosmology: Cosmology, dependence: TimeDependence) -> Self {
        Self {
            cosmology,
            dependence,
        }
    }

    /// Drift time integral from `ai` to `af`, referenced at `a_ref`.
    ///
    /// Standard: ∫ da / Q(a). Non-standard: ∫ gpQ(a)/Q(a) da / gpQ(a_ref).
    pub fn sq(&self, ai: f64, af: f64, a_ref: f64) -> Result<f64, PmhmcError> {
        let c = self.cosmology;
        match self.dependence {
            TimeDependence::Standard => integrate(
                move |a| 1.0 / c.q_factor(a),
                ai,
                af,
                QUADRATURE_EPSABS,
                QUADRATURE_LIMIT,
            ),
            TimeDependence::NonStandard { n_lpt } => {
                let raw = integrate(
                    move |a| gp_q(a, n_lpt) / c.q_factor(a),
                    ai,
                    af,
                    QUADRATURE_EPSABS,
                    QUADRATURE_LIMIT,
                )?;
                Ok(raw / gp_q(a_ref, n_lpt))
            }
        }
    }

    /// Kick time integral from `ai` to `af`, referenced at `a_ref`.
    ///
    /// Standard: ∫ a/Q(a) da. Non-standard: the closed form
    /// (gpQ(af) − gpQ(ai))·a_ref / (Q(a_ref)·DERgpQ(a_ref)).
    pub fn sphi(&self, ai: f64, af: f64, a_ref: f64) -> Result<f64, PmhmcError> {
        let c = self.cosmology;
        match self.dependence {
            TimeDependence::Standard => integrate(
                move |a| a / c.q_factor(a),
                ai,
                af,
                QUADRATURE_EPSABS,
                QUADRATURE_LIMIT,
            ),
            TimeDependence::NonStandard { n_lpt } => Ok((gp_q(af, n_lpt) - gp_q(ai, n_lpt))
                * a_ref
                / (c.q_factor(a_ref) * der_gp_q(a_ref, n_lpt))),
        }
    }
}

/// Stepping mode: plain PM or COLA residual stepping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMode {
    /// Absolute positions and velocities.
    Pm,
    /// Residuals against the 2LPT trajectory; requires LPT displacement
    /// storage on the ensembles.
    Cola,
}

/// Leapfrog stepper over an ensemble pair.
///
/// Each operation reads the input ensemble and writes the output ensemble;
/// the two must never alias (ping-pong). All particle loops are
/// data-parallel with no cross-particle ordering.
#[derive(Clone, Copy, Debug)]
pub struct Stepper {
    /// Background cosmology.
    pub cosmology: Cosmology,
    /// Stepping mode.
    pub mode: StepMode,
    integral: TimeIntegral,
}

impl Stepper {
    /// A stepper for the given background, mode, and time convention.
    #[must_use]
    pub fn new(cosmology: Cosmology, mode: StepMode, dependence: TimeDependence) -> Self {
        Self {
            cosmology,
            mode,
            integral: TimeIntegral::new(cosmology, dependence),
        }
    }

    /// The time-integral evaluator this stepper uses.
    #[must_use]
    pub fn time_integral(&self) -> TimeIntegral {
        self.integral
    }

    /// Kick: advance velocities from `a_v(pi)` to `af` using the
    /// acceleration stored at `a_x(pi)`. Writes `po.v`, stamps
    /// `po.a_v = af`, and carries `a_x` through unchanged; no other output
    /// field is touched.
    pub fn kick(&self, pi: &ParticleStore, po: &mut ParticleStore, af: f64) -> Result<(), PmhmcError> {
        debug_assert_eq!(pi.np, po.np, "ping-pong ensembles must match");
        let ai = pi.a_v;
        let ac = pi.a_x;
        let om143 = self.cosmology.omega_a(ac).powf(1.0 / 143.0);
        let dda = self.integral.sphi(ai, af, ac)?;
        let growth1 = self.cosmology.growth_factor(ac)?;
        let omega_m = self.cosmology.omega_m;

        let q2 = 1.5 * omega_m * growth1 * growth1 * (1.0 + 7.0 / 3.0 * om143);
        let q1 = 1.5 * omega_m * growth1;

        let cola = match self.mode {
            StepMode::Cola => Some(pi.lpt_disp()),
            StepMode::Pm => None,
        };

        po.v
            .par_chunks_mut(3)
            .enumerate()
            .for_each(|(i, v_out)| {
                for d in 0..3 {
                    let j = i * 3 + d;
                    let mut ax = -1.5 * omega_m * pi.acc[j];
                    if let Some((dx1, dx2)) = cola {
                        ax -= dx1[j] * q1 + dx2[j] * q2;
                    }
                    v_out[d] = pi.v[j] + ax * dda;
                }
            });

        po.a_v = af;
        po.a_x = pi.a_x;
        Ok(())
    }

    /// Drift: advance positions from `a_x(pi)` to `af` using the velocity
    /// at `a_v(pi)`. Writes `po.x`, stamps `po.a_x = af`, and carries `a_v`
    /// through unchanged; no other output field is touched.
    pub fn drift(&self, pi: &ParticleStore, po: &mut ParticleStore, af: f64) -> Result<(), PmhmcError> {
        debug_assert_eq!(pi.np, po.np, "ping-pong ensembles must match");
        let ai = pi.a_x;
        let ac = pi.a_v;
        let dyyy = self.integral.sq(ai, af, ac)?;
        let da1 = self.cosmology.growth_factor(af)? - self.cosmology.growth_factor(ai)?;
        let da2 = self.cosmology.growth_factor2(af)? - self.cosmology.growth_factor2(ai)?;

        let cola = match self.mode {
            StepMode::Cola => Some(pi.lpt_disp()),
            StepMode::Pm => None,
        };

        po.x
            .par_chunks_mut(3)
            .enumerate()
            .for_each(|(i, x_out)| {
                for d in 0..3 {
                    let j = i * 3 + d;
                    x_out[d] = pi.x[j] + pi.v[j] * dyyy;
                    if let Some((dx1, dx2)) = cola {
                        x_out[d] += dx1[j] * da1 + dx2[j] * da2;
                    }
                }
            });

        po.a_x = af;
        po.a_v = pi.a_v;
        Ok(())
    }

    /// Interpolate an observation snapshot at `aout`: kick and drift a
    /// throwaway chain to `aout`, restore the residual LPT velocity in
    /// COLA mode, convert velocities to km/s (H0 = 100 km/s/(h⁻¹Mpc)),
    /// and copy ids. `p` is not mutated; `po` is a fully-populated
    /// independent ensemble at the output epoch.
    pub fn set_snapshot(
        &self,
        p: &ParticleStore,
        po: &mut ParticleStore,
        aout: f64,
    ) -> Result<(), PmhmcError> {
        debug_assert_eq!(p.np, po.np, "ping-pong ensembles must match");
        let vfac = 100.0 / aout;
        let dv = self.cosmology.d_prime_q(aout)?;
        let dv2 = self.cosmology.growth_factor2v(aout)?;

        self.kick(p, po, aout)?;
        self.drift(p, po, aout)?;

        let cola = match self.mode {
            StepMode::Cola => Some(p.lpt_disp()),
            StepMode::Pm => None,
        };

        po.v
            .par_chunks_mut(3)
            .enumerate()
            .for_each(|(i, v_out)| {
                for d in 0..3 {
                    if let Some((dx1, dx2)) = cola {
                        v_out[d] += dx1[i * 3 + d] * dv + dx2[i * 3 + d] * dv2;
                    }
                    v_out[d] *= vfac;
                }
            });

        po.id.copy_from_slice(&p.id);
        po.a_x = aout;
        po.a_v = aout;
        Ok(())
    }
}
