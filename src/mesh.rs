// SPDX-License-Identifier: AGPL-3.0-only

//! Mesh geometry and spectral transforms.
//!
//! A cubic periodic mesh of `nc` cells per axis over a box of side
//! `boxsize`, with x-major cell layout (`(ix·nc + iy)·nc + iz`), so an
//! x-slab is a contiguous memory range — the property the slab domain
//! decomposition relies on.
//!
//! Transforms are complex 3-D FFTs built from 1-D `rustfft` plans applied
//! axis by axis. Both directions are **unnormalized**: a forward/inverse
//! round trip scales by `norm() = nc³`, and every caller divides by `norm()`
//! exactly where the algorithm requires — omission silently rescales a
//! gradient by the mesh cell count, so the division is always written at
//! the call site, never hidden inside the transform.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Cubic periodic mesh with cached 1-D FFT plans.
pub struct Mesh {
    nc: usize,
    boxsize: f64,
    fwd: Arc<dyn Fft<f64>>,
    inv: Arc<dyn Fft<f64>>,
}

impl Mesh {
    /// A mesh of `nc` cells per axis over a periodic box of side `boxsize`.
    #[must_use]
    pub fn new(nc: usize, boxsize: f64) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            nc,
            boxsize,
            fwd: planner.plan_fft_forward(nc),
            inv: planner.plan_fft_inverse(nc),
        }
    }

    /// Cells per axis.
    #[must_use]
    pub fn nc(&self) -> usize {
        self.nc
    }

    /// Box side length.
    #[must_use]
    pub fn boxsize(&self) -> f64 {
        self.boxsize
    }

    /// Cell side length.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.boxsize / self.nc as f64
    }

    /// Total cell count.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.nc * self.nc * self.nc
    }

    /// FFT normalization constant: a forward/inverse round trip multiplies
    /// by this.
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.n_cells() as f64
    }

    /// Flat index of cell `(ix, iy, iz)`.
    #[inline]
    #[must_use]
    pub fn cell_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (ix * self.nc + iy) * self.nc + iz
    }

    /// A zeroed real-space field.
    #[must_use]
    pub fn real_field(&self) -> Vec<f64> {
        vec![0.0; self.n_cells()]
    }

    /// A zeroed Fourier-space field.
    #[must_use]
    pub fn spectral_field(&self) -> Vec<Complex64> {
        vec![Complex64::new(0.0, 0.0); self.n_cells()]
    }

    /// Per-axis wavenumbers k(i) = 2π/L · freq(i), with the usual wrapped
    /// frequency ordering (0, 1, …, nc/2, −nc/2+1, …, −1).
    #[must_use]
    pub fn wavenumbers(&self) -> Vec<f64> {
        let fundamental = 2.0 * std::f64::consts::PI / self.boxsize;
        (0..self.nc)
            .map(|i| {
                let freq = if i <= self.nc / 2 {
                    i as f64
                } else {
                    i as f64 - self.nc as f64
                };
                fundamental * freq
            })
            .collect()
    }

    /// Wavenumbers for odd-derivative (−ik) transfer operators: identical
    /// to [`wavenumbers`](Self::wavenumbers) except the Nyquist plane is
    /// zeroed — the Nyquist mode has no signed counterpart, and a nonzero
    /// odd transfer there breaks the Hermitian symmetry of a real field.
    #[must_use]
    pub fn diff_wavenumbers(&self) -> Vec<f64> {
        let mut k = self.wavenumbers();
        if self.nc % 2 == 0 {
            k[self.nc / 2] = 0.0;
        }
        k
    }

    /// Forward transform of a real field into `out` (unnormalized).
    pub fn r2c(&self, real: &[f64], out: &mut [Complex64]) {
        debug_assert_eq!(real.len(), self.n_cells());
        debug_assert_eq!(out.len(), self.n_cells());
        for (o, &r) in out.iter_mut().zip(real) {
            *o = Complex64::new(r, 0.0);
        }
        self.fft_3d(out, true);
    }

    /// Inverse transform of `spec` (clobbered in place), real part written
    /// to `out` (unnormalized: result carries a factor of `norm()`).
    pub fn c2r(&self, spec: &mut [Complex64], out: &mut [f64]) {
        debug_assert_eq!(spec.len(), self.n_cells());
        debug_assert_eq!(out.len(), self.n_cells());
        self.fft_3d(spec, false);
        for (o, s) in out.iter_mut().zip(spec.iter()) {
            *o = s.re;
        }
    }

    /// In-place 3-D transform: 1-D plans applied along z, y, x.
    fn fft_3d(&self, data: &mut [Complex64], forward: bool) {
        let nc = self.nc;
        let plan = if forward { &self.fwd } else { &self.inv };

        // z: lines are contiguous
        data.par_chunks_mut(nc).for_each(|line| plan.process(line));

        // y: stride-nc lines, local to each contiguous x-plane
        data.par_chunks_mut(nc * nc).for_each(|plane| {
            let mut line = vec![Complex64::new(0.0, 0.0); nc];
            for iz in 0..nc {
                for iy in 0..nc {
                    line[iy] = plane[iy * nc + iz];
                }
                plan.process(&mut line);
                for iy in 0..nc {
                    plane[iy * nc + iz] = line[iy];
                }
            }
        });

        // x: stride-nc² lines span the whole array
        let mut line = vec![Complex64::new(0.0, 0.0); nc];
        for iy in 0..nc {
            for iz in 0..nc {
                let offset = iy * nc + iz;
                for ix in 0..nc {
                    line[ix] = data[ix * nc * nc + offset];
                }
                plan.process(&mut line);
                for ix in 0..nc {
                    data[ix * nc * nc + offset] = line[ix];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerances::EXACT_F64;

    #[test]
    fn geometry_derived_quantities() {
        let mesh = Mesh::new(8, 100.0);
        assert_eq!(mesh.n_cells(), 512);
        assert!((mesh.cell_size() - 12.5).abs() < 1e-12);
        assert!((mesh.norm() - 512.0).abs() < 1e-12);
        assert_eq!(mesh.cell_index(1, 0, 0), 64);
        assert_eq!(mesh.cell_index(0, 1, 0), 8);
        assert_eq!(mesh.cell_index(0, 0, 1), 1);
    }

    #[test]
    fn wavenumber_ordering() {
        let mesh = Mesh::new(8, 2.0 * std::f64::consts::PI);
        let k = mesh.wavenumbers();
        // fundamental = 1 for L = 2 pi
        assert!((k[0]).abs() < 1e-15);
        assert!((k[1] - 1.0).abs() < 1e-15);
        assert!((k[4] - 4.0).abs() < 1e-15, "Nyquist at +nc/2");
        assert!((k[5] + 3.0).abs() < 1e-15, "wrapped negative frequency");
        assert!((k[7] + 1.0).abs() < 1e-15);
    }

    #[test]
    fn diff_wavenumbers_zero_nyquist() {
        let mesh = Mesh::new(8, 1.0);
        let kd = mesh.diff_wavenumbers();
        assert_eq!(kd[4], 0.0, "Nyquist zeroed for odd transfers");
        assert!(kd[3] > 0.0 && kd[5] < 0.0);
    }

    #[test]
    fn round_trip_scales_by_norm() {
        let mesh = Mesh::new(4, 10.0);
        let mut real = mesh.real_field();
        for (i, r) in real.iter_mut().enumerate() {
            *r = (i as f64 * 0.37).sin();
        }
        let mut spec = mesh.spectral_field();
        mesh.r2c(&real, &mut spec);
        let mut back = mesh.real_field();
        mesh.c2r(&mut spec, &mut back);
        for (b, r) in back.iter().zip(&real) {
            assert!(
                (b / mesh.norm() - r).abs() < EXACT_F64,
                "round trip / norm recovers input"
            );
        }
    }

    #[test]
    fn constant_field_transforms_to_zero_mode() {
        let mesh = Mesh::new(4, 1.0);
        let real = vec![2.5; mesh.n_cells()];
        let mut spec = mesh.spectral_field();
        mesh.r2c(&real, &mut spec);
        assert!(
            (spec[0].re - 2.5 * mesh.norm()).abs() < EXACT_F64,
            "zero mode = mean * norm"
        );
        let power: f64 = spec[1..].iter().map(|c| c.norm_sqr()).sum();
        assert!(power < EXACT_F64, "no power outside the zero mode");
    }

    #[test]
    fn plane_wave_lands_on_single_mode() {
        let nc = 8;
        let mesh = Mesh::new(nc, 1.0);
        let mut real = mesh.real_field();
        // cos(2 pi * 2x/L): power at kx index 2 and its conjugate at nc-2
        for ix in 0..nc {
            let phase = 2.0 * std::f64::consts::PI * 2.0 * ix as f64 / nc as f64;
            for iy in 0..nc {
                for iz in 0..nc {
                    real[mesh.cell_index(ix, iy, iz)] = phase.cos();
                }
            }
        }
        let mut spec = mesh.spectral_field();
        mesh.r2c(&real, &mut spec);
        let expected = 0.5 * mesh.norm();
        let hit = spec[mesh.cell_index(2, 0, 0)];
        let mirror = spec[mesh.cell_index(nc - 2, 0, 0)];
        assert!((hit.re - expected).abs() < 1e-8, "mode amplitude {hit}");
        assert!((mirror.re - expected).abs() < 1e-8, "conjugate {mirror}");
    }
}
