// SPDX-License-Identifier: AGPL-3.0-only

//! Particle ensemble storage.
//!
//! Flat `Vec<f64>` per field, `i*3 + d` layout (particle-major, axis-minor).
//! The epoch stamps `a_x` / `a_v` belong to the ensemble, not to individual
//! particles: kick advances `a_v`, drift advances `a_x`, and the two may
//! differ (leapfrog offset). Stepping operations take an input and an output
//! ensemble that must never alias.
//!
//! LPT displacement storage is selected at construction: a plain-PM ensemble
//! carries none, a COLA/2LPT ensemble carries `dx1`/`dx2`. There is no
//! runtime flag toggling half-initialized fields.

/// First- and second-order LPT displacement storage, fixed at construction.
#[derive(Clone, Debug)]
pub enum Displacements {
    /// Plain-PM ensemble: no displacement fields.
    None,
    /// COLA/2LPT ensemble: Zel'dovich and second-order displacements,
    /// `i*3 + d` layout like every other per-particle field.
    Lpt {
        /// First-order (Zel'dovich) displacement at unit growth.
        dx1: Vec<f64>,
        /// Second-order displacement at unit second-order growth.
        dx2: Vec<f64>,
    },
}

/// An ordered ensemble of `np` particles.
#[derive(Clone, Debug)]
pub struct ParticleStore {
    /// Particle count.
    pub np: usize,
    /// Lagrangian (grid) positions.
    pub q: Vec<f64>,
    /// Eulerian positions, valid at epoch `a_x`.
    pub x: Vec<f64>,
    /// Velocities in growth-rate units, valid at epoch `a_v`.
    pub v: Vec<f64>,
    /// Accelerations (scratch for force readout).
    pub acc: Vec<f64>,
    /// Particle identifiers, preserved across snapshots.
    pub id: Vec<u64>,
    /// LPT displacement fields (ensemble kind).
    pub disp: Displacements,
    /// Position epoch stamp.
    pub a_x: f64,
    /// Velocity epoch stamp.
    pub a_v: f64,
}

impl ParticleStore {
    /// A plain-PM ensemble of `np` particles, zero-initialized.
    #[must_use]
    pub fn new_pm(np: usize) -> Self {
        Self::with_disp(np, Displacements::None)
    }

    /// A COLA/2LPT ensemble of `np` particles with displacement storage.
    #[must_use]
    pub fn new_lpt(np: usize) -> Self {
        Self::with_disp(
            np,
            Displacements::Lpt {
                dx1: vec![0.0; np * 3],
                dx2: vec![0.0; np * 3],
            },
        )
    }

    fn with_disp(np: usize, disp: Displacements) -> Self {
        Self {
            np,
            q: vec![0.0; np * 3],
            x: vec![0.0; np * 3],
            v: vec![0.0; np * 3],
            acc: vec![0.0; np * 3],
            id: (0..np as u64).collect(),
            disp,
            a_x: 0.0,
            a_v: 0.0,
        }
    }

    /// Borrow the LPT displacement fields.
    ///
    /// Aborts if the ensemble was built without them — COLA stepping over a
    /// plain-PM store is a construction-time mistake, not a recoverable
    /// condition.
    #[must_use]
    pub fn lpt_disp(&self) -> (&[f64], &[f64]) {
        match &self.disp {
            Displacements::Lpt { dx1, dx2 } => (dx1, dx2),
            Displacements::None => {
                panic!("COLA stepping requires an ensemble built with ParticleStore::new_lpt")
            }
        }
    }

    /// Mutably borrow the LPT displacement fields. Same precondition as
    /// [`lpt_disp`](Self::lpt_disp).
    #[must_use]
    pub fn lpt_disp_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        match &mut self.disp {
            Displacements::Lpt { dx1, dx2 } => (dx1, dx2),
            Displacements::None => {
                panic!("COLA stepping requires an ensemble built with ParticleStore::new_lpt")
            }
        }
    }

    /// Assign Lagrangian positions on the natural `nc`-per-axis grid of a
    /// box of side `boxsize`, plus a uniform `shift` (default zero in all
    /// callers), and place particles there (`x = q`). Ids follow grid order.
    pub fn set_lagrangian_grid(&mut self, nc: usize, boxsize: f64, shift: [f64; 3]) {
        debug_assert_eq!(self.np, nc * nc * nc, "particle count matches grid");
        let spacing = boxsize / nc as f64;
        let mut i = 0;
        for ix in 0..nc {
            for iy in 0..nc {
                for iz in 0..nc {
                    let base = i * 3;
                    self.q[base] = (ix as f64 + shift[0]) * spacing;
                    self.q[base + 1] = (iy as f64 + shift[1]) * spacing;
                    self.q[base + 2] = (iz as f64 + shift[2]) * spacing;
                    self.id[i] = i as u64;
                    i += 1;
                }
            }
        }
        self.x.copy_from_slice(&self.q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm_store_has_no_displacements() {
        let p = ParticleStore::new_pm(8);
        assert!(matches!(p.disp, Displacements::None));
        assert_eq!(p.x.len(), 24);
        assert_eq!(p.id.len(), 8);
    }

    #[test]
    fn lpt_store_carries_displacements() {
        let p = ParticleStore::new_lpt(8);
        let (dx1, dx2) = p.lpt_disp();
        assert_eq!(dx1.len(), 24);
        assert_eq!(dx2.len(), 24);
    }

    #[test]
    #[should_panic(expected = "new_lpt")]
    fn pm_store_rejects_lpt_access() {
        let p = ParticleStore::new_pm(1);
        let _ = p.lpt_disp();
    }

    #[test]
    fn lagrangian_grid_covers_box() {
        let nc = 4;
        let boxsize = 16.0;
        let mut p = ParticleStore::new_lpt(nc * nc * nc);
        p.set_lagrangian_grid(nc, boxsize, [0.0; 3]);
        for i in 0..p.np {
            for d in 0..3 {
                let q = p.q[i * 3 + d];
                assert!(q >= 0.0 && q < boxsize, "q in box: {q}");
                assert_eq!(q, p.x[i * 3 + d], "particles start at q");
            }
        }
        // grid spacing 4.0: first particle at origin, second at z = 4
        assert_eq!(p.q[2], 0.0);
        assert_eq!(p.q[5], 4.0);
        assert_eq!(p.id[p.np - 1], (p.np - 1) as u64);
    }

    #[test]
    fn uniform_shift_applies_to_all_axes() {
        let nc = 2;
        let mut p = ParticleStore::new_pm(8);
        p.set_lagrangian_grid(nc, 2.0, [0.5, 0.5, 0.5]);
        assert_eq!(&p.q[0..3], &[0.5, 0.5, 0.5]);
    }
}
