// SPDX-License-Identifier: AGPL-3.0-only

//! Validation binary: growth factors, stepping bookkeeping, and the
//! zero-overdensity chi-square scenario.
//!
//! Reference values:
//!   - EdS growth: D1(a) = a exactly for Omega_m = 1
//!   - LCDM Omega_m = 0.3 growth at a = 0.5: D1 ~ 0.61 (standard linear
//!     growth tables, e.g. Lahav & Suto, Living Rev. Rel. 7 (2004) 8)
//!   - 32³ mesh, 100 h⁻¹Mpc box, Omega_m = 0.3, zero initial overdensity:
//!     particles stay on the Lagrangian grid and the painted density is
//!     exactly the mean, so the self-misfit vanishes

use pmhmc::cosmology::Cosmology;
use pmhmc::hmc::{HmcConfig, HmcZa};
use pmhmc::steps::{StepMode, Stepper, TimeDependence, TimeIntegral};
use pmhmc::store::ParticleStore;
use pmhmc::tolerances;
use pmhmc::validation::ValidationHarness;

fn main() {
    let mut harness = ValidationHarness::new("validate_pmhmc");

    growth_checks(&mut harness);
    stepping_checks(&mut harness);
    chisq_scenario(&mut harness);

    harness.finish();
}

fn growth_checks(harness: &mut ValidationHarness) {
    println!("  ── Growth factors ──");
    let eds = Cosmology::flat_lcdm(1.0);
    for &a in &[0.1, 0.5, 1.0] {
        let d = eds.growth_factor(a).expect("EdS growth");
        harness.check_abs(
            &format!("EdS D1({a}) = a"),
            d,
            a,
            tolerances::INTEGRATED_F64,
        );
    }

    let lcdm = Cosmology::flat_lcdm(0.3);
    let d_half = lcdm.growth_factor(0.5).expect("LCDM growth");
    harness.check_rel("LCDM Omega_m=0.3 D1(0.5)", d_half, 0.61, 0.02);

    // monotonicity probe: largest non-increasing step over a coarse grid
    let mut worst = f64::NEG_INFINITY;
    let mut prev = 0.0;
    for i in 1..=32 {
        let a = i as f64 / 32.0;
        let d = lcdm.growth_factor(a).expect("LCDM growth");
        worst = worst.max(prev - d);
        prev = d;
    }
    harness.check_upper("growth monotonic (max backward step)", worst, 0.0);
}

fn stepping_checks(harness: &mut ValidationHarness) {
    println!("  ── Leapfrog stepping ──");
    let cosmology = Cosmology::flat_lcdm(0.3);
    let ti = TimeIntegral::new(cosmology, TimeDependence::Standard);

    harness.check_abs(
        "Sq(a, a, aRef) = 0",
        ti.sq(0.5, 0.5, 0.4).expect("sq"),
        0.0,
        f64::EPSILON,
    );
    harness.check_abs(
        "Sphi(a, a, aRef) = 0",
        ti.sphi(0.5, 0.5, 0.4).expect("sphi"),
        0.0,
        f64::EPSILON,
    );

    let stepper = Stepper::new(cosmology, StepMode::Pm, TimeDependence::Standard);
    let mut pi = ParticleStore::new_pm(64);
    pi.a_x = 0.3;
    pi.a_v = 0.3;
    let mut po = pi.clone();
    stepper.kick(&pi, &mut po, 0.35).expect("kick");
    harness.check_abs("kick advances a_v", po.a_v, 0.35, f64::EPSILON);
    harness.check_abs("kick leaves a_x", po.a_x, 0.3, f64::EPSILON);
    stepper.drift(&po, &mut pi, 0.4).expect("drift");
    harness.check_abs("drift advances a_x", pi.a_x, 0.4, f64::EPSILON);
    harness.check_abs("drift leaves a_v", pi.a_v, 0.35, f64::EPSILON);
}

fn chisq_scenario(harness: &mut ValidationHarness) {
    println!("  ── Zero-overdensity scenario (32³, 100 h⁻¹Mpc, Omega_m 0.3) ──");
    let config = HmcConfig::basic(32, 32, 100.0, 0.3);
    let mut context = HmcZa::new(config).expect("context");
    let delta = context.solver().mesh.spectral_field();
    context.evolve(&delta).expect("evolve");

    // particles must sit on the unperturbed Lagrangian grid
    let store = &context.solver().store;
    let mut max_offset = 0.0f64;
    for j in 0..store.np * 3 {
        max_offset = max_offset.max((store.x[j] - store.q[j]).abs());
    }
    harness.check_upper(
        "particles on Lagrangian grid (max |x-q|)",
        max_offset,
        tolerances::EXACT_F64,
    );

    let data = context.rho_final().to_vec();
    let sigma = vec![1.0; data.len()];
    harness.check_abs(
        "chisq self-comparison",
        context.chisq(&data, &sigma),
        0.0,
        f64::EPSILON,
    );

    let uniform = vec![1.0; data.len()];
    harness.check_upper(
        "model density is the mean (chisq vs uniform)",
        context.chisq(&uniform, &sigma),
        tolerances::EXACT_F64,
    );
}
