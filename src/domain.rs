// SPDX-License-Identifier: AGPL-3.0-only

//! Slab domain decomposition and scoped ghost particles.
//!
//! The mesh is split into contiguous x-slabs, one per domain; worker
//! threads stand in for the ranks of a distributed run. Cloud-in-cell
//! painting and readout give every particle a 2×2×2 cell support, so a
//! particle near a slab boundary touches a neighbor's cells. The ghost
//! mechanism duplicates such particles into the neighboring domain before
//! any cross-boundary paint/readout and sums their readout contributions
//! back onto the owner afterwards — the halo-exchange pattern, as a scoped
//! resource: a [`GhostZone`] is created for one paint/readout sequence,
//! its counts are only meaningful while it is alive, and dropping it
//! releases the overlay.
//!
//! Painting and readout are decomposition-invariant: the same set of
//! (particle, corner) contributions is applied for any domain count, in a
//! fixed domain-major commit order.

use rayon::prelude::*;

use crate::mesh::Mesh;
use crate::store::ParticleStore;

/// Contiguous x-slab decomposition of a cubic mesh.
#[derive(Clone, Debug)]
pub struct DomainSlabs {
    nc: usize,
    /// Slab boundaries in x-cells: `bounds[d]..bounds[d+1]` is domain d.
    bounds: Vec<usize>,
}

impl DomainSlabs {
    /// Split `nc` x-planes into `ndomains` near-even contiguous slabs.
    /// `ndomains` must be in `1..=nc`.
    #[must_use]
    pub fn new(nc: usize, ndomains: usize) -> Self {
        assert!(
            ndomains >= 1 && ndomains <= nc,
            "domain count {ndomains} must be in 1..={nc}"
        );
        let bounds = (0..=ndomains).map(|d| d * nc / ndomains).collect();
        Self { nc, bounds }
    }

    /// Number of domains.
    #[must_use]
    pub fn ndomains(&self) -> usize {
        self.bounds.len() - 1
    }

    /// Half-open x-cell range of domain `dom`.
    #[must_use]
    pub fn range(&self, dom: usize) -> (usize, usize) {
        (self.bounds[dom], self.bounds[dom + 1])
    }

    /// Domain owning x-plane `ix`.
    #[must_use]
    pub fn owner(&self, ix: usize) -> usize {
        debug_assert!(ix < self.nc);
        // bounds is sorted; partition_point finds the first bound > ix
        self.bounds.partition_point(|&b| b <= ix) - 1
    }
}

/// Per-axis CIC support: two wrapped cell indices and their weights.
#[derive(Clone, Copy)]
struct CicAxis {
    cell: [usize; 2],
    weight: [f64; 2],
}

/// CIC support of a position along each axis, with periodic wrapping.
fn cic_support(mesh: &Mesh, pos: &[f64]) -> [CicAxis; 3] {
    let nc = mesh.nc() as isize;
    let inv_cell = 1.0 / mesh.cell_size();
    let mut out = [CicAxis {
        cell: [0, 0],
        weight: [0.0, 0.0],
    }; 3];
    for d in 0..3 {
        let g = pos[d] * inv_cell;
        let base = g.floor();
        let t = g - base;
        let i0 = (base as isize).rem_euclid(nc) as usize;
        let i1 = (i0 + 1) % nc as usize;
        out[d] = CicAxis {
            cell: [i0, i1],
            weight: [1.0 - t, t],
        };
    }
    out
}

/// Add a particle's CIC contribution to one slab, skipping corners whose
/// x-cell falls outside `[x_lo, x_hi)`.
fn cic_paint_slab(slab: &mut [f64], nc: usize, x_lo: usize, x_hi: usize, sup: &[CicAxis; 3], w: f64) {
    for cx in 0..2 {
        let ix = sup[0].cell[cx];
        if ix < x_lo || ix >= x_hi {
            continue;
        }
        let wx = w * sup[0].weight[cx];
        let plane = (ix - x_lo) * nc * nc;
        for cy in 0..2 {
            let row = plane + sup[1].cell[cy] * nc;
            let wxy = wx * sup[1].weight[cy];
            for cz in 0..2 {
                slab[row + sup[2].cell[cz]] += wxy * sup[2].weight[cz];
            }
        }
    }
}

/// Read a field at a particle's CIC support from one slab, corners outside
/// `[x_lo, x_hi)` contributing nothing.
fn cic_readout_slab(slab: &[f64], nc: usize, x_lo: usize, x_hi: usize, sup: &[CicAxis; 3]) -> f64 {
    let mut acc = 0.0;
    for cx in 0..2 {
        let ix = sup[0].cell[cx];
        if ix < x_lo || ix >= x_hi {
            continue;
        }
        let wx = sup[0].weight[cx];
        let plane = (ix - x_lo) * nc * nc;
        for cy in 0..2 {
            let row = plane + sup[1].cell[cy] * nc;
            let wxy = wx * sup[1].weight[cy];
            for cz in 0..2 {
                acc += wxy * sup[2].weight[cz] * slab[row + sup[2].cell[cz]];
            }
        }
    }
    acc
}

/// A boundary duplicate: the particle's index and the readout value
/// accumulated on the non-owning domain, awaiting reduction.
#[derive(Clone, Debug)]
struct GhostEntry {
    index: usize,
    value: f64,
}

/// An ephemeral overlay of boundary-duplicated particles for one
/// paint/readout sequence.
///
/// Created from a key coordinate (Eulerian position or Lagrangian
/// position); the same key positions are used for painting and readout, so
/// the zone snapshots them at creation — exactly what the halo exchange of
/// a distributed run would ship.
pub struct GhostZone {
    slabs: DomainSlabs,
    /// Snapshot of key positions, `i*3 + d` layout.
    pos: Vec<f64>,
    /// Per domain: particles whose home (floor) x-cell lies in the slab.
    locals: Vec<Vec<usize>>,
    /// Per domain: duplicates whose CIC support reaches into the slab from
    /// a neighboring home domain.
    ghosts: Vec<Vec<GhostEntry>>,
    nghosts: usize,
}

impl GhostZone {
    /// Ghosts keyed by current (Eulerian) particle positions.
    #[must_use]
    pub fn by_position(mesh: &Mesh, slabs: &DomainSlabs, store: &ParticleStore) -> Self {
        Self::create(mesh, slabs, &store.x)
    }

    /// Ghosts keyed by Lagrangian positions.
    #[must_use]
    pub fn by_lagrangian(mesh: &Mesh, slabs: &DomainSlabs, store: &ParticleStore) -> Self {
        Self::create(mesh, slabs, &store.q)
    }

    fn create(mesh: &Mesh, slabs: &DomainSlabs, key_pos: &[f64]) -> Self {
        let np = key_pos.len() / 3;
        let ndom = slabs.ndomains();
        let mut locals = vec![Vec::new(); ndom];
        let mut ghosts = vec![Vec::new(); ndom];
        let mut nghosts = 0;

        for i in 0..np {
            let sup = cic_support(mesh, &key_pos[i * 3..i * 3 + 3]);
            let home = slabs.owner(sup[0].cell[0]);
            locals[home].push(i);
            let neighbor = slabs.owner(sup[0].cell[1]);
            if neighbor != home {
                ghosts[neighbor].push(GhostEntry { index: i, value: 0.0 });
                nghosts += 1;
            }
        }

        Self {
            slabs: slabs.clone(),
            pos: key_pos.to_vec(),
            locals,
            ghosts,
            nghosts,
        }
    }

    /// Number of live boundary duplicates. Only meaningful while this zone
    /// is alive.
    #[must_use]
    pub fn nghosts(&self) -> usize {
        self.nghosts
    }

    /// Zero `field` and paint every particle (and its ghosts) into it at
    /// the zone's key positions, with per-particle weight `weight_of`.
    /// Domains paint their own slabs concurrently; each slab is written by
    /// exactly one worker.
    pub fn paint<W>(&self, mesh: &Mesh, field: &mut [f64], weight_of: W)
    where
        W: Fn(usize) -> f64 + Sync,
    {
        let nc = mesh.nc();
        let chunks = self.split_slabs(field, nc);
        chunks.into_par_iter().enumerate().for_each(|(dom, slab)| {
            slab.fill(0.0);
            let (x_lo, x_hi) = self.slabs.range(dom);
            for &i in &self.locals[dom] {
                let sup = cic_support(mesh, &self.pos[i * 3..i * 3 + 3]);
                cic_paint_slab(slab, nc, x_lo, x_hi, &sup, weight_of(i));
            }
            for e in &self.ghosts[dom] {
                let sup = cic_support(mesh, &self.pos[e.index * 3..e.index * 3 + 3]);
                cic_paint_slab(slab, nc, x_lo, x_hi, &sup, weight_of(e.index));
            }
        });
    }

    /// Read `field` at every particle's key position into
    /// `acc[i*3 + axis] = value * scale`. In-slab contributions go to the
    /// owner directly; cross-boundary contributions are held on the ghost
    /// entries until [`reduce_axis`](Self::reduce_axis).
    pub fn readout_axis(&mut self, mesh: &Mesh, field: &[f64], acc: &mut [f64], axis: usize, scale: f64) {
        let nc = mesh.nc();
        let slabs = &self.slabs;
        let pos = &self.pos;
        let local_vals: Vec<Vec<(usize, f64)>> = self
            .ghosts
            .par_iter_mut()
            .zip(self.locals.par_iter())
            .enumerate()
            .map(|(dom, (ghosts, locals))| {
                let (x_lo, x_hi) = slabs.range(dom);
                let slab = &field[x_lo * nc * nc..x_hi * nc * nc];
                for e in ghosts.iter_mut() {
                    let sup = cic_support(mesh, &pos[e.index * 3..e.index * 3 + 3]);
                    e.value = cic_readout_slab(slab, nc, x_lo, x_hi, &sup) * scale;
                }
                locals
                    .iter()
                    .map(|&i| {
                        let sup = cic_support(mesh, &pos[i * 3..i * 3 + 3]);
                        (i, cic_readout_slab(slab, nc, x_lo, x_hi, &sup) * scale)
                    })
                    .collect()
            })
            .collect();

        // domain-major commit order keeps the result deterministic
        for vals in local_vals {
            for (i, v) in vals {
                acc[i * 3 + axis] = v;
            }
        }
    }

    /// Fold ghost readout contributions back onto their owners:
    /// `acc[i*3 + axis] += ghost value`, in domain-major order.
    pub fn reduce_axis(&self, acc: &mut [f64], axis: usize) {
        for ghosts in &self.ghosts {
            for e in ghosts {
                acc[e.index * 3 + axis] += e.value;
            }
        }
    }

    /// Split a full field into per-domain slab slices.
    fn split_slabs<'f>(&self, field: &'f mut [f64], nc: usize) -> Vec<&'f mut [f64]> {
        let mut out = Vec::with_capacity(self.slabs.ndomains());
        let mut rest = field;
        for dom in 0..self.slabs.ndomains() {
            let (lo, hi) = self.slabs.range(dom);
            let (head, tail) = rest.split_at_mut((hi - lo) * nc * nc);
            out.push(head);
            rest = tail;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerances::EXACT_F64;

    fn grid_store(nc: usize, boxsize: f64) -> ParticleStore {
        let mut p = ParticleStore::new_pm(nc * nc * nc);
        p.set_lagrangian_grid(nc, boxsize, [0.0; 3]);
        p
    }

    #[test]
    fn slab_bounds_cover_mesh() {
        let slabs = DomainSlabs::new(10, 3);
        assert_eq!(slabs.ndomains(), 3);
        let mut covered = 0;
        for dom in 0..3 {
            let (lo, hi) = slabs.range(dom);
            assert!(hi > lo, "non-empty slab");
            covered += hi - lo;
        }
        assert_eq!(covered, 10);
        assert_eq!(slabs.owner(0), 0);
        assert_eq!(slabs.owner(9), 2);
    }

    #[test]
    fn boundary_planes_create_ghosts() {
        // particles exactly on their floor cell: the t = 0 neighbor corner
        // carries zero weight but still creates the duplicate when the
        // support crosses a slab boundary; count must match the boundary
        // plane population
        let mesh = Mesh::new(4, 8.0);
        let slabs = DomainSlabs::new(4, 2);
        let store = grid_store(4, 8.0);
        let zone = GhostZone::by_position(&mesh, &slabs, &store);
        // x-cells 1 and 3 sit against a boundary (support reaches cells 2
        // and 0 respectively): 2 planes of 16 particles each
        assert_eq!(zone.nghosts(), 32);
    }

    #[test]
    fn paint_conserves_mass() {
        let mesh = Mesh::new(8, 100.0);
        let mut store = grid_store(8, 100.0);
        // displace particles off the grid so every CIC corner is nontrivial
        for (i, x) in store.x.iter_mut().enumerate() {
            *x += 3.3 * ((i as f64 * 0.7).sin());
        }
        let slabs = DomainSlabs::new(8, 3);
        let zone = GhostZone::by_position(&mesh, &slabs, &store);
        let mut field = mesh.real_field();
        zone.paint(&mesh, &mut field, |_| 1.0);
        let total: f64 = field.iter().sum();
        assert!(
            (total - store.np as f64).abs() < 1e-9,
            "CIC conserves total mass: {total} vs {}",
            store.np
        );
    }

    #[test]
    fn paint_is_decomposition_invariant() {
        let mesh = Mesh::new(8, 50.0);
        let mut store = grid_store(8, 50.0);
        for (i, x) in store.x.iter_mut().enumerate() {
            *x += 2.1 * ((i as f64 * 1.3).cos());
        }
        let mut reference = mesh.real_field();
        GhostZone::by_position(&mesh, &DomainSlabs::new(8, 1), &store)
            .paint(&mesh, &mut reference, |_| 1.0);

        for ndom in [2, 3, 5, 8] {
            let slabs = DomainSlabs::new(8, ndom);
            let zone = GhostZone::by_position(&mesh, &slabs, &store);
            let mut field = mesh.real_field();
            zone.paint(&mesh, &mut field, |_| 1.0);
            for (c, (a, b)) in field.iter().zip(&reference).enumerate() {
                assert!(
                    (a - b).abs() < EXACT_F64,
                    "cell {c} differs with {ndom} domains: {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn readout_reduce_matches_single_domain() {
        let mesh = Mesh::new(8, 50.0);
        let mut store = grid_store(8, 50.0);
        for (i, x) in store.x.iter_mut().enumerate() {
            *x += 1.7 * ((i as f64 * 0.9).sin());
        }
        let mut field = mesh.real_field();
        for (c, f) in field.iter_mut().enumerate() {
            *f = (c as f64 * 0.11).cos();
        }

        let mut acc_ref = vec![0.0; store.np * 3];
        let mut zone1 = GhostZone::by_position(&mesh, &DomainSlabs::new(8, 1), &store);
        zone1.readout_axis(&mesh, &field, &mut acc_ref, 0, 1.0);
        zone1.reduce_axis(&mut acc_ref, 0);

        let mut acc = vec![0.0; store.np * 3];
        let mut zone4 = GhostZone::by_position(&mesh, &DomainSlabs::new(8, 4), &store);
        zone4.readout_axis(&mesh, &field, &mut acc, 0, 1.0);
        zone4.reduce_axis(&mut acc, 0);

        for i in 0..store.np {
            assert!(
                (acc[i * 3] - acc_ref[i * 3]).abs() < EXACT_F64,
                "particle {i} readout differs across decompositions"
            );
        }
    }

    #[test]
    fn paint_readout_adjoint_identity() {
        // <paint(w), f> = sum_p w_p * readout(f, p), exactly (same corners,
        // same weights, both sides)
        let mesh = Mesh::new(4, 10.0);
        let mut store = grid_store(4, 10.0);
        for (i, x) in store.x.iter_mut().enumerate() {
            *x += 0.8 * ((i as f64 * 2.3).sin());
        }
        let mut f = mesh.real_field();
        for (c, v) in f.iter_mut().enumerate() {
            *v = (c as f64 * 0.41).sin();
        }
        let w: Vec<f64> = (0..store.np).map(|i| 1.0 + 0.1 * i as f64).collect();

        let slabs = DomainSlabs::new(4, 2);
        let mut zone = GhostZone::by_position(&mesh, &slabs, &store);
        let mut painted = mesh.real_field();
        zone.paint(&mesh, &mut painted, |i| w[i]);
        let lhs: f64 = painted.iter().zip(&f).map(|(p, v)| p * v).sum();

        let mut acc = vec![0.0; store.np * 3];
        zone.readout_axis(&mesh, &f, &mut acc, 0, 1.0);
        zone.reduce_axis(&mut acc, 0);
        let rhs: f64 = (0..store.np).map(|i| w[i] * acc[i * 3]).sum();

        assert!(
            (lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.0),
            "adjoint identity: {lhs} vs {rhs}"
        );
    }

    #[test]
    fn lagrangian_key_ignores_eulerian_positions() {
        let mesh = Mesh::new(4, 10.0);
        let mut store = grid_store(4, 10.0);
        // scramble x; q untouched
        for x in store.x.iter_mut() {
            *x += 4.9;
        }
        let slabs = DomainSlabs::new(4, 2);
        let zone_q = GhostZone::by_lagrangian(&mesh, &slabs, &store);
        let mut field_q = mesh.real_field();
        zone_q.paint(&mesh, &mut field_q, |_| 1.0);

        // painting at q of an unperturbed grid puts exactly one particle
        // per cell
        for (c, v) in field_q.iter().enumerate() {
            assert!((v - 1.0).abs() < EXACT_F64, "cell {c}: {v}");
        }
    }
}
