// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: leapfrog stepping composed with the 2LPT forward
//! model, verifying that the public API composes correctly across module
//! boundaries.

use pmhmc::cosmology::Cosmology;
use pmhmc::ic::fill_gaussian;
use pmhmc::lpt::TwoLptSolver;
use pmhmc::steps::{StepMode, Stepper, TimeDependence};
use pmhmc::store::ParticleStore;

fn cosmo() -> Cosmology {
    Cosmology::flat_lcdm(0.3)
}

#[test]
fn kdk_sequence_keeps_epochs_interleaved() {
    let stepper = Stepper::new(cosmo(), StepMode::Pm, TimeDependence::Standard);
    let mut a = ParticleStore::new_pm(27);
    a.a_x = 0.2;
    a.a_v = 0.2;
    let mut b = a.clone();

    // K(0.25) D(0.3) K(0.3): the classic half-offset pattern
    stepper.kick(&a, &mut b, 0.25).unwrap();
    assert_eq!((b.a_x, b.a_v), (0.2, 0.25));
    stepper.drift(&b, &mut a, 0.3).unwrap();
    assert_eq!((a.a_x, a.a_v), (0.3, 0.25));
    // drift does not move velocity state; carry it for the next kick
    a.v.copy_from_slice(&b.v);
    stepper.kick(&a, &mut b, 0.3).unwrap();
    assert_eq!((b.a_x, b.a_v), (0.3, 0.3));
}

#[test]
fn cola_drift_reproduces_closed_form_advance() {
    // A zero-residual COLA ensemble drifted from a1 to a2 must land exactly
    // on the closed-form 2LPT trajectory at a2: the drift's growth-factor
    // increments are the discrete form of the forward model's advance.
    let c = cosmo();
    let (a1, a2) = (0.3, 0.7);

    let mut solver = TwoLptSolver::new(8, 8, 100.0, 2);
    let delta_k = fill_gaussian(&solver.mesh, 99, |k| 80.0 * k.powf(-1.0));
    solver.solve(&delta_k, [0.0; 3]);
    solver.evolve(a1, &c).unwrap();

    // residual frame: particle rides the 2LPT trajectory, zero residual
    let mut pi = solver.store.clone();
    pi.v.iter_mut().for_each(|v| *v = 0.0);
    pi.a_x = a1;
    pi.a_v = a1;
    let mut po = pi.clone();

    let stepper = Stepper::new(c, StepMode::Cola, TimeDependence::Standard);
    stepper.drift(&pi, &mut po, a2).unwrap();

    let mut reference = TwoLptSolver::new(8, 8, 100.0, 2);
    reference.solve(&delta_k, [0.0; 3]);
    reference.evolve(a2, &c).unwrap();

    for j in 0..pi.np * 3 {
        assert!(
            (po.x[j] - reference.store.x[j]).abs() < 1e-10,
            "COLA drift lands on the 2LPT trajectory at index {j}: {} vs {}",
            po.x[j],
            reference.store.x[j]
        );
    }
}

#[test]
fn snapshot_is_independent_of_source_ensemble() {
    let c = cosmo();
    let mut solver = TwoLptSolver::new(8, 8, 100.0, 1);
    let delta_k = fill_gaussian(&solver.mesh, 5, |k| 50.0 * k.powf(-1.0));
    solver.solve(&delta_k, [0.0; 3]);
    solver.evolve(0.5, &c).unwrap();

    // residual frame for COLA snapshot interpolation
    let mut p = solver.store.clone();
    p.v.iter_mut().for_each(|v| *v = 0.0);

    let stepper = Stepper::new(c, StepMode::Cola, TimeDependence::Standard);
    let mut snap = p.clone();
    let before_x = p.x.clone();
    let before_v = p.v.clone();
    stepper.set_snapshot(&p, &mut snap, 0.6).unwrap();

    assert_eq!(p.x, before_x, "snapshot does not mutate the source");
    assert_eq!(p.v, before_v, "snapshot does not mutate the source");
    assert_eq!(snap.a_x, 0.6);
    assert_eq!(snap.a_v, 0.6);
    assert_eq!(snap.id, p.id, "ids carried through");

    // velocities are in km/s at snapshot time: residual zero, so the whole
    // velocity is the restored LPT term, finite for a perturbed field
    let vmax = snap.v.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(vmax > 0.0, "snapshot carries LPT velocities");
}

#[test]
fn nonstandard_stepping_tracks_standard_for_small_steps() {
    // Across a fine step the nLPT ansatz and the exact integrals agree
    // closely; a coarse whole-history step does not (that is the point of
    // the ansatz). Probe the fine-step regime.
    let c = cosmo();
    let std = Stepper::new(c, StepMode::Pm, TimeDependence::Standard);
    let non = Stepper::new(c, StepMode::Pm, TimeDependence::NonStandard { n_lpt: 2.5 });

    let mut pi = ParticleStore::new_pm(1);
    pi.a_x = 0.50;
    pi.a_v = 0.505;
    pi.v[0] = 1.0;
    let mut po_std = pi.clone();
    let mut po_non = pi.clone();

    std.drift(&pi, &mut po_std, 0.51).unwrap();
    non.drift(&pi, &mut po_non, 0.51).unwrap();

    let (dx_std, dx_non) = (po_std.x[0], po_non.x[0]);
    assert!(dx_std > 0.0 && dx_non > 0.0);
    assert!(
        ((dx_std - dx_non) / dx_std).abs() < 1e-3,
        "fine-step agreement: {dx_std} vs {dx_non}"
    );
}
