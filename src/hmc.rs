// SPDX-License-Identifier: AGPL-3.0-only

//! Chi-square misfit and its Fourier-space gradient (HMC force).
//!
//! The solver context owns a 2LPT forward model, a mesh, and the scratch
//! buffers reused across repeated `evolve`/`chisq`/`force` calls within one
//! inference run — `evolve` caches the forward-model density so the misfit
//! and the gradient of the same initial condition share one forward pass.
//!
//! The force back-propagates the pointwise density residual through the
//! painting/FFT chain: residual → diff transfer (−i·k_d) → readout onto
//! particles (ghost-aware) → paint at Lagrangian positions → inverse-Poisson
//! transfer (−i·k_d/k²) → accumulate. Each transfer stage divides by the
//! mesh `norm()` exactly once; omitting one silently rescales the gradient
//! by the cell count.
//!
//! The density filter chain (Gaussian smoothing, low-pass cut, CIC
//! deconvolution) is diagonal and real in Fourier space, hence
//! self-adjoint: the force applies the identical chain to the residual,
//! keeping gradient and misfit exactly consistent.

use rayon::prelude::*;
use rustfft::num_complex::Complex64;

use crate::cosmology::Cosmology;
use crate::domain::GhostZone;
use crate::error::PmhmcError;
use crate::lpt::{apply_diff_transfer, apply_force_2lpt_transfer, TwoLptSolver};
use crate::mesh::Mesh;
use crate::store::ParticleStore;

/// Configuration of an HMC solver context.
#[derive(Clone, Debug)]
#[must_use]
pub struct HmcConfig {
    /// Mesh cells per axis.
    pub nmesh: usize,
    /// Particle grid cells per axis (np = nc³).
    pub nc: usize,
    /// Periodic box side (h⁻¹ Mpc).
    pub boxsize: f64,
    /// Matter density parameter (flat LCDM).
    pub omega_m: f64,
    /// Forward-model output epoch.
    pub aout: f64,
    /// Gaussian smoothing scale applied to the model density; 0 disables.
    pub sml: f64,
    /// Low-pass threshold: modes with |k| > kth are cut; 0 disables.
    pub kth: f64,
    /// Deconvolve the CIC assignment window from the model density.
    pub decic: bool,
    /// Displace positions by the line-of-sight velocity (plane-parallel
    /// redshift-space distortion along z).
    pub include_rsd: bool,
    /// Slab domain count for ghost-aware paint/readout.
    pub ndomains: usize,
}

impl HmcConfig {
    /// A plain configuration: no filters, no RSD, output at a = 1,
    /// domain count matched to the worker-thread pool.
    pub fn basic(nmesh: usize, nc: usize, boxsize: f64, omega_m: f64) -> Self {
        Self {
            nmesh,
            nc,
            boxsize,
            omega_m,
            aout: 1.0,
            sml: 0.0,
            kth: 0.0,
            decic: false,
            include_rsd: false,
            ndomains: rayon::current_num_threads().clamp(1, nmesh.max(1)),
        }
    }

    /// Total particle count.
    #[must_use]
    pub fn np(&self) -> usize {
        self.nc * self.nc * self.nc
    }

    /// Painting weight that makes the mean painted density 1 for any
    /// mesh/particle-grid ratio: (nmesh/nc)³.
    #[must_use]
    pub fn mean_paint_weight(&self) -> f64 {
        let r = self.nmesh as f64 / self.nc as f64;
        r * r * r
    }

    fn validate(&self) -> Result<(), PmhmcError> {
        let fail = |msg: &str| Err(PmhmcError::ConfigMismatch(msg.into()));
        if self.nmesh < 2 {
            return fail("nmesh must be at least 2");
        }
        if self.nc < 1 {
            return fail("nc must be positive");
        }
        if !(self.boxsize > 0.0) {
            return fail("boxsize must be positive");
        }
        if !(self.omega_m > 0.0 && self.omega_m <= 1.0) {
            return fail("omega_m must lie in (0, 1]");
        }
        if !(self.aout > 0.0 && self.aout <= 1.0) {
            return fail("aout must lie in (0, 1]");
        }
        if self.ndomains < 1 || self.ndomains > self.nmesh {
            return fail("ndomains must lie in 1..=nmesh");
        }
        if self.sml < 0.0 || self.kth < 0.0 {
            return fail("filter scales must be non-negative");
        }
        Ok(())
    }
}

/// HMC solver context: forward model, cached state, and misfit/gradient
/// operations. Created once per inference run; buffers are released on
/// drop.
pub struct HmcZa {
    config: HmcConfig,
    cosmology: Cosmology,
    solver: TwoLptSolver,
    /// Current initial condition (Fourier space), cached by `evolve`.
    delta_ic_k: Vec<Complex64>,
    /// Forward-model density (x-space), cached by `evolve`.
    rho_final_x: Vec<f64>,
    evolved: bool,
}

/// sinc(x) = sin(x)/x with the removable singularity filled.
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        x.sin() / x
    }
}

impl HmcZa {
    /// Build a context, allocating particle and mesh storage.
    pub fn new(config: HmcConfig) -> Result<Self, PmhmcError> {
        config.validate()?;
        let cosmology = Cosmology::flat_lcdm(config.omega_m);
        let solver = TwoLptSolver::new(config.nmesh, config.nc, config.boxsize, config.ndomains);
        let delta_ic_k = solver.mesh.spectral_field();
        let rho_final_x = solver.mesh.real_field();
        Ok(Self {
            config,
            cosmology,
            solver,
            delta_ic_k,
            rho_final_x,
            evolved: false,
        })
    }

    /// The configuration this context was built with.
    #[must_use]
    pub fn config(&self) -> &HmcConfig {
        &self.config
    }

    /// The background cosmology.
    #[must_use]
    pub fn cosmology(&self) -> &Cosmology {
        &self.cosmology
    }

    /// The forward-model solver (mesh, slabs, particle ensemble).
    #[must_use]
    pub fn solver(&self) -> &TwoLptSolver {
        &self.solver
    }

    /// The cached forward-model density; valid after `evolve`.
    #[must_use]
    pub fn rho_final(&self) -> &[f64] {
        &self.rho_final_x
    }

    /// The cached initial condition; valid after `evolve`.
    #[must_use]
    pub fn delta_ic(&self) -> &[Complex64] {
        &self.delta_ic_k
    }

    /// Run the 2LPT forward model from `delta_ic` to the configured output
    /// epoch and cache the filtered model density.
    pub fn evolve(&mut self, delta_ic: &[Complex64]) -> Result<(), PmhmcError> {
        self.delta_ic_k.copy_from_slice(delta_ic);
        self.solver.solve(delta_ic, [0.0; 3]);
        self.solver.evolve(self.config.aout, &self.cosmology)?;

        if self.config.include_rsd {
            // plane-parallel distortion along z: the velocity is in
            // growth-rate units, a/Q converts it to a comoving displacement
            let rsd = self.config.aout / self.cosmology.q_factor(self.config.aout);
            let ParticleStore { x, v, .. } = &mut self.solver.store;
            let v: &[f64] = v;
            x.par_chunks_mut(3).enumerate().for_each(|(i, x_out)| {
                x_out[2] += v[i * 3 + 2] * rsd;
            });
        }

        let mesh = &self.solver.mesh;
        let zone = GhostZone::by_position(mesh, &self.solver.slabs, &self.solver.store);
        let weight = self.config.mean_paint_weight();
        let mut work_x = mesh.real_field();
        zone.paint(mesh, &mut work_x, |_| weight);

        let mut work_k = mesh.spectral_field();
        mesh.r2c(&work_x, &mut work_k);
        Self::apply_density_filters(&self.config, mesh, &mut work_k);
        mesh.c2r(&mut work_k, &mut self.rho_final_x);
        let norm = mesh.norm();
        self.rho_final_x.par_iter_mut().for_each(|v| *v /= norm);

        self.evolved = true;
        Ok(())
    }

    /// Chi-square misfit of the cached model density against `data_x`
    /// with pointwise scatter `sigma_x` (strictly positive wherever data
    /// is defined — caller precondition). Summed in a fixed domain-major
    /// order, so the reduction is deterministic.
    #[must_use]
    pub fn chisq(&self, data_x: &[f64], sigma_x: &[f64]) -> f64 {
        assert!(self.evolved, "evolve must run before chisq");
        self.rho_final_x
            .iter()
            .zip(data_x)
            .zip(sigma_x)
            .map(|((rho, data), sigma)| {
                let r = (rho - data) / sigma;
                r * r
            })
            .sum()
    }

    /// Gradient of the chi-square with respect to the initial Fourier-space
    /// overdensity, written to `f_k` (the Zel'dovich-term contribution).
    ///
    /// In the mode-pair real parametrization (perturbing δ(k) and its
    /// Hermitian mirror together), `f_k` relates to the misfit by
    /// dχ²/dRe δ(k) = −2·Re f_k(k) and dχ²/dIm δ(k) = −2·Im f_k(k):
    /// `f_k` descends the misfit, as a sampler's force term should.
    pub fn force(
        &mut self,
        data_x: &[f64],
        sigma_x: &[f64],
        f_k: &mut [Complex64],
    ) -> Result<(), PmhmcError> {
        assert!(self.evolved, "evolve must run before force");
        let mesh = &self.solver.mesh;
        let norm = mesh.norm();

        // residual scaled by 1/sigma²: d(chisq)/d(rho) up to the global 2
        let mut residual_x = mesh.real_field();
        residual_x
            .par_iter_mut()
            .enumerate()
            .for_each(|(c, r)| *r = (self.rho_final_x[c] - data_x[c]) / (sigma_x[c] * sigma_x[c]));

        let mut rhod_k = mesh.spectral_field();
        mesh.r2c(&residual_x, &mut rhod_k);
        // the filter chain is diagonal and real, hence self-adjoint:
        // re-applying it keeps the gradient consistent with evolve
        Self::apply_density_filters(&self.config, mesh, &mut rhod_k);

        let mut work_k = mesh.spectral_field();
        let mut work_x = mesh.real_field();

        // Stage 1: residual gradient field, read onto particles at their
        // Eulerian positions. The painting weight rescales d(rho)/d(x).
        let scale = self.config.mean_paint_weight() / norm;
        {
            let mut zone = GhostZone::by_position(mesh, &self.solver.slabs, &self.solver.store);
            for d in 0..3 {
                apply_diff_transfer(mesh, &rhod_k, &mut work_k, d);
                mesh.c2r(&mut work_k, &mut work_x);
                zone.readout_axis(mesh, &work_x, &mut self.solver.store.acc, d, scale);
                zone.reduce_axis(&mut self.solver.store.acc, d);
            }
        }

        // Stage 2: paint the per-particle gradient at Lagrangian positions
        // and pull it back through the inverse-Poisson displacement kernel.
        let zone_q = GhostZone::by_lagrangian(mesh, &self.solver.slabs, &self.solver.store);
        let acc: &[f64] = &self.solver.store.acc;
        let mut work_k2 = mesh.spectral_field();
        f_k.fill(Complex64::new(0.0, 0.0));
        for d in 0..3 {
            zone_q.paint(mesh, &mut work_x, |i| acc[i * 3 + d]);
            mesh.r2c(&work_x, &mut work_k2);
            apply_force_2lpt_transfer(mesh, &work_k2, &mut work_k, d);
            // Wang's factor of 2 (arXiv:1301.1348): a required literal for
            // this displacement-divergence adjoint, not derived here
            f_k.par_iter_mut()
                .zip(work_k.par_iter())
                .for_each(|(f, w)| *f += *w * (2.0 / norm));
        }
        Ok(())
    }

    /// Apply the model-density filter chain in Fourier space: Gaussian
    /// smoothing, low-pass cut, CIC window deconvolution. Each is gated on
    /// its configuration field.
    fn apply_density_filters(config: &HmcConfig, mesh: &Mesh, field_k: &mut [Complex64]) {
        if config.sml == 0.0 && config.kth == 0.0 && !config.decic {
            return;
        }
        let nc = mesh.nc();
        let k = mesh.wavenumbers();
        let half_cell = 0.5 * mesh.cell_size();
        let (sml, kth, decic) = (config.sml, config.kth, config.decic);

        field_k
            .par_chunks_mut(nc * nc)
            .enumerate()
            .for_each(|(ix, plane)| {
                for iy in 0..nc {
                    for iz in 0..nc {
                        let (kx, ky, kz) = (k[ix], k[iy], k[iz]);
                        let kk = kx * kx + ky * ky + kz * kz;
                        let mut t = 1.0;
                        if sml > 0.0 {
                            t *= (-0.5 * kk * sml * sml).exp();
                        }
                        if kth > 0.0 && kk > kth * kth {
                            t = 0.0;
                        }
                        if decic {
                            let w = sinc(kx * half_cell) * sinc(ky * half_cell) * sinc(kz * half_cell);
                            t /= w * w;
                        }
                        plane[iy * nc + iz] *= t;
                    }
                }
            });
    }
}
