// SPDX-License-Identifier: AGPL-3.0-only

//! Gaussian random initial conditions.
//!
//! Fills a Fourier-space overdensity from a pluggable power-spectrum
//! callback `P(k) -> f64`. White noise is drawn in real space from a seeded
//! LCG + Box–Muller generator (deterministic: the same seed always yields
//! the same field) and shaped per mode, which keeps the Hermitian symmetry
//! of a real field for free.
//!
//! Amplitude convention: ⟨|δ(k)|²⟩ = P(k)·norm²/V, so the standard
//! power-spectrum estimator |δ(k)|²·V/norm² recovers P(k).

use rustfft::num_complex::Complex64;

use crate::mesh::Mesh;

/// LCG step mapping state to a uniform deviate in [0, 1).
fn lcg_next(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    (*state >> 33) as f64 / (1u64 << 31) as f64
}

/// Unit-variance white noise on the mesh, Box–Muller from the seeded LCG.
fn white_noise(n_cells: usize, seed: u64) -> Vec<f64> {
    let mut rng_state = seed;
    let mut noise = Vec::with_capacity(n_cells);
    while noise.len() < n_cells {
        let u1 = lcg_next(&mut rng_state).max(1e-15);
        let u2 = lcg_next(&mut rng_state);
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        noise.push(r * theta.cos());
        if noise.len() < n_cells {
            noise.push(r * theta.sin());
        }
    }
    noise
}

/// Fill a Fourier-space Gaussian overdensity with power spectrum `power`.
///
/// The zero mode is always zero (the overdensity has no mean).
pub fn fill_gaussian(mesh: &Mesh, seed: u64, power: impl Fn(f64) -> f64) -> Vec<Complex64> {
    let nc = mesh.nc();
    let noise = white_noise(mesh.n_cells(), seed);
    let mut delta_k = mesh.spectral_field();
    mesh.r2c(&noise, &mut delta_k);

    let k = mesh.wavenumbers();
    let volume = mesh.boxsize().powi(3);
    let norm = mesh.norm();

    for ix in 0..nc {
        for iy in 0..nc {
            for iz in 0..nc {
                let idx = mesh.cell_index(ix, iy, iz);
                let kk = k[ix] * k[ix] + k[iy] * k[iy] + k[iz] * k[iz];
                if kk == 0.0 {
                    delta_k[idx] = Complex64::new(0.0, 0.0);
                } else {
                    // <|white_k|^2> = norm; scale to <|delta_k|^2> = P norm^2 / V
                    delta_k[idx] *= (power(kk.sqrt()) * norm / volume).sqrt();
                }
            }
        }
    }
    delta_k
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_law(k: f64) -> f64 {
        1e3 * k.powf(-1.5)
    }

    #[test]
    fn same_seed_is_deterministic() {
        let mesh = Mesh::new(8, 100.0);
        let a = fill_gaussian(&mesh, 42, power_law);
        let b = fill_gaussian(&mesh, 42, power_law);
        assert_eq!(a, b, "same seed gives identical fields");
    }

    #[test]
    fn different_seeds_differ() {
        let mesh = Mesh::new(8, 100.0);
        let a = fill_gaussian(&mesh, 42, power_law);
        let b = fill_gaussian(&mesh, 43, power_law);
        assert_ne!(a, b);
    }

    #[test]
    fn zero_mode_removed() {
        let mesh = Mesh::new(8, 100.0);
        let delta = fill_gaussian(&mesh, 7, power_law);
        assert_eq!(delta[0], Complex64::new(0.0, 0.0), "no mean overdensity");
    }

    #[test]
    fn field_is_hermitian() {
        let nc = 8;
        let mesh = Mesh::new(nc, 100.0);
        let delta = fill_gaussian(&mesh, 11, power_law);
        for ix in 0..nc {
            for iy in 0..nc {
                for iz in 0..nc {
                    let m = delta[mesh.cell_index(ix, iy, iz)];
                    let conj = delta
                        [mesh.cell_index((nc - ix) % nc, (nc - iy) % nc, (nc - iz) % nc)];
                    assert!(
                        (m - conj.conj()).norm() < 1e-6 * m.norm().max(1.0),
                        "delta(-k) = conj(delta(k)) at ({ix},{iy},{iz})"
                    );
                }
            }
        }
    }

    #[test]
    fn inverse_transform_is_real() {
        let mesh = Mesh::new(8, 100.0);
        let mut delta = fill_gaussian(&mesh, 3, power_law);
        let mut out = mesh.real_field();
        // c2r discards the imaginary part; verify it was negligible by
        // checking Parseval consistency between k-space and x-space power
        let k_power: f64 = delta.iter().map(|c| c.norm_sqr()).sum();
        mesh.c2r(&mut delta, &mut out);
        let x_power: f64 = out.iter().map(|v| v * v).sum::<f64>() / mesh.norm();
        assert!(
            ((k_power - x_power) / k_power).abs() < 1e-9,
            "Parseval: {k_power} vs {x_power}"
        );
    }

    #[test]
    fn mean_power_tracks_spectrum() {
        // average |delta_k|^2 V / norm^2 over a k-shell ~ P(k)
        let nc = 16;
        let mesh = Mesh::new(nc, 100.0);
        let delta = fill_gaussian(&mesh, 1234, |_| 50.0);
        let volume = mesh.boxsize().powi(3);
        let norm2 = mesh.norm() * mesh.norm();
        let est: f64 = delta[1..].iter().map(|c| c.norm_sqr() * volume / norm2).sum::<f64>()
            / (delta.len() - 1) as f64;
        assert!(
            (est / 50.0 - 1.0).abs() < 0.1,
            "flat-spectrum estimator within cosmic variance: {est}"
        );
    }
}
