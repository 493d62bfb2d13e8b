// SPDX-License-Identifier: AGPL-3.0-only

//! pmhmc — particle-mesh forward modeling and HMC forces for cosmological
//! initial-condition inference.
//!
//! Advances a discretized cosmological density field forward in time with a
//! second-order Lagrangian perturbation theory (2LPT) forward model, and
//! computes the gradient of a data-misfit chi-square with respect to the
//! initial Fourier-space overdensity — the force term of a Hamiltonian
//! Monte Carlo sampler over initial conditions.
//!
//! ## Modules
//!   - `cosmology` — FLRW background and linear/second-order growth factors
//!   - `quadrature` — adaptive Gauss–Kronrod integration for time integrals
//!   - `mesh` — cubic periodic mesh geometry and spectral transforms
//!   - `domain` — slab decomposition and scoped ghost particles
//!   - `store` — particle ensemble storage with ensemble-level epoch stamps
//!   - `steps` — growth-weighted leapfrog kick/drift and snapshots
//!   - `lpt` — 2LPT displacements and the closed-form forward advance
//!   - `hmc` — chi-square misfit and its Fourier-space gradient
//!   - `ic` — seeded Gaussian initial conditions from a power spectrum
//!
//! ## Validation binary
//!   - `validate_pmhmc` — growth factors, stepping bookkeeping, and the
//!     zero-overdensity chi-square scenario, with explicit pass/fail checks

pub mod cosmology;
pub mod domain;
pub mod error;
pub mod hmc;
pub mod ic;
pub mod lpt;
pub mod mesh;
pub mod quadrature;
pub mod steps;
pub mod store;
pub mod tolerances;
pub mod validation;

pub use error::PmhmcError;
