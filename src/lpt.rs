// SPDX-License-Identifier: AGPL-3.0-only

//! Second-order Lagrangian perturbation theory forward model.
//!
//! From a Fourier-space initial overdensity the solver computes per-particle
//! first-order (Zel'dovich) displacements dx1 = −∇∇⁻²δ (continuity fixes
//! the sign: ∇·dx1 = −δ, displacement points toward overdensities) and
//! second-order displacements dx2 = −∇∇⁻²δ₂ with the standard source
//! δ₂ = Σ_{a<b} (φ,aa·φ,bb − φ,ab²), then advances particles in closed form:
//!
//!   x = q + D1(a)·dx1 + D2(a)·dx2
//!   v =     Dv1(a)·dx1 + Dv2(a)·dx2      (growth-rate units)
//!
//! — an "infinite step" application of the drift logic at zero residual
//! velocity, not an iterative leapfrog. The growth-factor algebra (including
//! the -3/7 second-order amplitude) lives in [`crate::cosmology`].
//!
//! All mesh fields follow the convention that a real field equals
//! `c2r(field_k) / norm`; the displacement readout divides by `norm` at the
//! call site accordingly.

use rayon::prelude::*;
use rustfft::num_complex::Complex64;

use crate::cosmology::Cosmology;
use crate::domain::{DomainSlabs, GhostZone};
use crate::error::PmhmcError;
use crate::mesh::Mesh;
use crate::store::{Displacements, ParticleStore};

/// Apply the differentiation transfer Γ_d(k) = −i·k_d·in(k).
///
/// A 90°-rotated per-mode multiply; the Nyquist plane of axis `axis` is
/// zeroed (odd operator on a self-conjugate plane).
pub fn apply_diff_transfer(mesh: &Mesh, from: &[Complex64], to: &mut [Complex64], axis: usize) {
    let nc = mesh.nc();
    let kd = mesh.diff_wavenumbers();
    to.par_chunks_mut(nc * nc)
        .zip(from.par_chunks(nc * nc))
        .enumerate()
        .for_each(|(ix, (to_plane, from_plane))| {
            for iy in 0..nc {
                for iz in 0..nc {
                    let idx = iy * nc + iz;
                    let k = kd[[ix, iy, iz][axis]];
                    let v = from_plane[idx];
                    // -i k: (re, im) -> (im * k, -re * k)
                    to_plane[idx] = Complex64::new(v.im * k, -v.re * k);
                }
            }
        });
}

/// Apply the forward displacement transfer out(k) = i·k_d/|k|²·in(k)
/// (the d-component of −∇∇⁻², continuity sign), |k|² = 0 mode → zero.
pub fn apply_displacement_transfer(
    mesh: &Mesh,
    from: &[Complex64],
    to: &mut [Complex64],
    axis: usize,
) {
    let nc = mesh.nc();
    let kd = mesh.diff_wavenumbers();
    let k = mesh.wavenumbers();
    to.par_chunks_mut(nc * nc)
        .zip(from.par_chunks(nc * nc))
        .enumerate()
        .for_each(|(ix, (to_plane, from_plane))| {
            for iy in 0..nc {
                for iz in 0..nc {
                    let idx = iy * nc + iz;
                    let kk = k[ix] * k[ix] + k[iy] * k[iy] + k[iz] * k[iz];
                    if kk == 0.0 {
                        to_plane[idx] = Complex64::new(0.0, 0.0);
                    } else {
                        let f = kd[[ix, iy, iz][axis]] / kk;
                        let v = from_plane[idx];
                        // i k/k²: (re, im) -> (-im * f, re * f)
                        to_plane[idx] = Complex64::new(-v.im * f, v.re * f);
                    }
                }
            }
        });
}

/// Apply the adjoint displacement transfer out(k) = −i·k_d/|k|²·in(k)
/// (a Poisson-kernel-weighted rotation, the conjugate of
/// [`apply_displacement_transfer`]), |k|² = 0 mode → zero. This is the
/// transfer the HMC force chain pulls particle gradients back through.
pub fn apply_force_2lpt_transfer(
    mesh: &Mesh,
    from: &[Complex64],
    to: &mut [Complex64],
    axis: usize,
) {
    let nc = mesh.nc();
    let kd = mesh.diff_wavenumbers();
    let k = mesh.wavenumbers();
    to.par_chunks_mut(nc * nc)
        .zip(from.par_chunks(nc * nc))
        .enumerate()
        .for_each(|(ix, (to_plane, from_plane))| {
            for iy in 0..nc {
                for iz in 0..nc {
                    let idx = iy * nc + iz;
                    let kk = k[ix] * k[ix] + k[iy] * k[iy] + k[iz] * k[iz];
                    if kk == 0.0 {
                        to_plane[idx] = Complex64::new(0.0, 0.0);
                    } else {
                        let f = kd[[ix, iy, iz][axis]] / kk;
                        let v = from_plane[idx];
                        // -i k/k²: (re, im) -> (im * f, -re * f)
                        to_plane[idx] = Complex64::new(v.im * f, -v.re * f);
                    }
                }
            }
        });
}

/// Apply the tidal-tensor transfer out(k) = −k_a·k_b/|k|²·in(k)
/// (second derivatives of the inverse-Poisson potential), zero mode → 0.
fn apply_tidal_transfer(
    mesh: &Mesh,
    from: &[Complex64],
    to: &mut [Complex64],
    axis_a: usize,
    axis_b: usize,
) {
    let nc = mesh.nc();
    let k = mesh.wavenumbers();
    to.par_chunks_mut(nc * nc)
        .zip(from.par_chunks(nc * nc))
        .enumerate()
        .for_each(|(ix, (to_plane, from_plane))| {
            for iy in 0..nc {
                for iz in 0..nc {
                    let idx = iy * nc + iz;
                    let kk = k[ix] * k[ix] + k[iy] * k[iy] + k[iz] * k[iz];
                    if kk == 0.0 {
                        to_plane[idx] = Complex64::new(0.0, 0.0);
                    } else {
                        let ka = k[[ix, iy, iz][axis_a]];
                        let kb = k[[ix, iy, iz][axis_b]];
                        to_plane[idx] = from_plane[idx] * (-ka * kb / kk);
                    }
                }
            }
        });
}

/// 2LPT forward-model context: mesh, slab decomposition, and the particle
/// ensemble it evolves. Owns its storage; operations borrow it for the
/// call duration.
pub struct TwoLptSolver {
    /// Mesh geometry and transforms.
    pub mesh: Mesh,
    /// Slab decomposition used for all ghost-aware paint/readout.
    pub slabs: DomainSlabs,
    /// The particle ensemble (always carries LPT displacement storage).
    pub store: ParticleStore,
    /// Particle grid cells per axis (np = nc³).
    pub nc: usize,
}

impl TwoLptSolver {
    /// A solver with an `nmesh`-per-axis mesh and an `nc`-per-axis particle
    /// grid over a box of side `boxsize`, decomposed into `ndomains` slabs.
    #[must_use]
    pub fn new(nmesh: usize, nc: usize, boxsize: f64, ndomains: usize) -> Self {
        let mesh = Mesh::new(nmesh, boxsize);
        let slabs = DomainSlabs::new(nmesh, ndomains);
        let mut store = ParticleStore::new_lpt(nc * nc * nc);
        store.set_lagrangian_grid(nc, boxsize, [0.0; 3]);
        Self {
            mesh,
            slabs,
            store,
            nc,
        }
    }

    /// Reset particles to the Lagrangian grid (optional uniform `shift`)
    /// and fill `dx1`/`dx2` from the Fourier-space overdensity `delta_k`.
    ///
    /// Does not mutate `delta_k`.
    pub fn solve(&mut self, delta_k: &[Complex64], shift: [f64; 3]) {
        self.store
            .set_lagrangian_grid(self.nc, self.mesh.boxsize(), shift);

        let norm = self.mesh.norm();
        let mut work_k = self.mesh.spectral_field();
        let mut work_x = self.mesh.real_field();

        // Displacements are read at Lagrangian positions; ghosts keyed by q.
        let mut zone = GhostZone::by_lagrangian(&self.mesh, &self.slabs, &self.store);

        // First order: dx1_d = IFFT(i k_d / k² · δ) / norm at q
        {
            let (dx1, _) = self.store.lpt_disp_mut();
            for d in 0..3 {
                apply_displacement_transfer(&self.mesh, delta_k, &mut work_k, d);
                self.mesh.c2r(&mut work_k, &mut work_x);
                zone.readout_axis(&self.mesh, &work_x, dx1, d, 1.0 / norm);
                zone.reduce_axis(dx1, d);
            }
        }

        // Second order: six tidal fields, pointwise source, then the same
        // inverse-Poisson gradient
        let pairs = [(0, 0), (1, 1), (2, 2), (0, 1), (0, 2), (1, 2)];
        let mut phi: Vec<Vec<f64>> = Vec::with_capacity(6);
        for &(a, b) in &pairs {
            apply_tidal_transfer(&self.mesh, delta_k, &mut work_k, a, b);
            let mut phi_x = self.mesh.real_field();
            self.mesh.c2r(&mut work_k, &mut phi_x);
            phi_x.par_iter_mut().for_each(|v| *v /= norm);
            phi.push(phi_x);
        }

        let mut delta2_x = self.mesh.real_field();
        delta2_x
            .par_iter_mut()
            .enumerate()
            .for_each(|(c, v)| {
                *v = phi[0][c] * phi[1][c] + phi[0][c] * phi[2][c] + phi[1][c] * phi[2][c]
                    - phi[3][c] * phi[3][c]
                    - phi[4][c] * phi[4][c]
                    - phi[5][c] * phi[5][c];
            });

        let mut delta2_k = self.mesh.spectral_field();
        self.mesh.r2c(&delta2_x, &mut delta2_k);

        let (_, dx2) = self.store.lpt_disp_mut();
        for d in 0..3 {
            apply_displacement_transfer(&self.mesh, &delta2_k, &mut work_k, d);
            self.mesh.c2r(&mut work_k, &mut work_x);
            zone.readout_axis(&self.mesh, &work_x, dx2, d, 1.0 / norm);
            zone.reduce_axis(dx2, d);
        }
    }

    /// Closed-form advance to `aout`: positions from the growth-weighted
    /// displacement combination, velocities in growth-rate units. Stamps
    /// both epochs to `aout`.
    pub fn evolve(&mut self, aout: f64, cosmology: &Cosmology) -> Result<(), PmhmcError> {
        let d1 = cosmology.growth_factor(aout)?;
        let d2 = cosmology.growth_factor2(aout)?;
        let dv1 = cosmology.d_prime_q(aout)?;
        let dv2 = cosmology.growth_factor2v(aout)?;

        let ParticleStore { q, x, v, disp, .. } = &mut self.store;
        let Displacements::Lpt { dx1, dx2 } = disp else {
            panic!("2LPT solver store always carries displacements")
        };
        let (dx1, dx2) = (dx1.as_slice(), dx2.as_slice());
        let q: &[f64] = q;

        x.par_chunks_mut(3)
            .zip(v.par_chunks_mut(3))
            .enumerate()
            .for_each(|(i, (x_out, v_out))| {
                for d in 0..3 {
                    let j = i * 3 + d;
                    x_out[d] = q[j] + d1 * dx1[j] + d2 * dx2[j];
                    v_out[d] = dv1 * dx1[j] + dv2 * dx2[j];
                }
            });

        self.store.a_x = aout;
        self.store.a_v = aout;
        Ok(())
    }
}
