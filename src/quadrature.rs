// SPDX-License-Identifier: AGPL-3.0-only

//! Adaptive Gauss–Kronrod quadrature for the stepping time integrals.
//!
//! 15-point Kronrod rule with an embedded 7-point Gauss rule; the difference
//! between the two estimates drives interval bisection. Absolute-error
//! driven, with a bounded subdivision budget — exhausting the budget is
//! reported as an error and propagated by the caller, never retried.
//!
//! Node and weight tables are the standard published values (same source as
//! every QK15 implementation).

use crate::error::PmhmcError;

/// Kronrod abscissae on [0, 1] (symmetric about the interval midpoint).
const XGK: [f64; 8] = [
    0.991455371120812639206854697526329,
    0.949107912342758524526189684047851,
    0.864864423359769072789712788640926,
    0.741531185599394439863864773280788,
    0.586087235467691130294144838258730,
    0.405845151377397166906606412076961,
    0.207784955007898467600689403773245,
    0.000000000000000000000000000000000,
];

/// Kronrod weights matching `XGK`.
const WGK: [f64; 8] = [
    0.022935322010529224963732008058970,
    0.063092092629978553290700663189204,
    0.104790010322250183839876322541518,
    0.140653259715525918745189590510238,
    0.169004726639267902826583426598550,
    0.190350578064785409913256402421014,
    0.204432940075298892414161999234649,
    0.209482141084727828012999174891714,
];

/// Embedded 7-point Gauss weights, applied to `XGK[1], XGK[3], XGK[5]`
/// (plus mirrors) and the center node.
const WG: [f64; 4] = [
    0.129484966168869693270611432679082,
    0.279705391489276667901467771423780,
    0.381830050505118944950369775488975,
    0.417959183673469387755102040816327,
];

/// One evaluated subinterval: bounds, Kronrod estimate, error estimate.
#[derive(Clone, Copy, Debug)]
struct Interval {
    lo: f64,
    hi: f64,
    result: f64,
    err: f64,
}

/// Apply the 15-point Kronrod rule (and its embedded Gauss rule) to `f`
/// on `[lo, hi]`. Returns the Kronrod estimate and `|K15 - G7|` as the
/// error estimate.
fn kronrod_15<F: Fn(f64) -> f64>(f: &F, lo: f64, hi: f64) -> (f64, f64) {
    let center = 0.5 * (lo + hi);
    let half = 0.5 * (hi - lo);

    let f_center = f(center);
    let mut kronrod = WGK[7] * f_center;
    let mut gauss = WG[3] * f_center;

    for j in 0..7 {
        let abscissa = half * XGK[j];
        let f_sum = f(center - abscissa) + f(center + abscissa);
        kronrod += WGK[j] * f_sum;
        if j % 2 == 1 {
            // XGK[1], XGK[3], XGK[5] are the off-center Gauss nodes
            gauss += WG[j / 2] * f_sum;
        }
    }

    kronrod *= half;
    gauss *= half;
    (kronrod, (kronrod - gauss).abs())
}

/// Integrate `f` over `[lo, hi]` to absolute tolerance `epsabs`, bisecting
/// adaptively up to `limit` subintervals.
///
/// A zero-width interval integrates to exactly 0. The subdivision budget
/// protects against divergent integrands (a caller precondition violation,
/// e.g. `nLPT = 0` in the non-standard drift); hitting it returns
/// [`PmhmcError::QuadratureNonConvergence`].
pub fn integrate<F: Fn(f64) -> f64>(
    f: F,
    lo: f64,
    hi: f64,
    epsabs: f64,
    limit: usize,
) -> Result<f64, PmhmcError> {
    if lo == hi {
        return Ok(0.0);
    }

    let (result, err) = kronrod_15(&f, lo, hi);
    let mut intervals = vec![Interval { lo, hi, result, err }];

    loop {
        let total_err: f64 = intervals.iter().map(|s| s.err).sum();
        if total_err <= epsabs {
            return Ok(intervals.iter().map(|s| s.result).sum());
        }
        if intervals.len() >= limit {
            return Err(PmhmcError::QuadratureNonConvergence {
                lo,
                hi,
                best_error: total_err,
            });
        }

        // Bisect the subinterval with the largest error estimate.
        let worst = intervals
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.err.total_cmp(&b.1.err))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let Interval { lo: a, hi: b, .. } = intervals.swap_remove(worst);
        let mid = 0.5 * (a + b);

        let (r1, e1) = kronrod_15(&f, a, mid);
        let (r2, e2) = kronrod_15(&f, mid, b);
        intervals.push(Interval { lo: a, hi: mid, result: r1, err: e1 });
        intervals.push(Interval { lo: mid, hi: b, result: r2, err: e2 });
    }
}
