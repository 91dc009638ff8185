// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use log::warn;

use crate::config::DEFAULT_INTEGRATION_TOLERANCE;

/// Bisection depth past which a closed integral is reported as unconverged.
const MAX_BISECTION_DEPTH: usize = 60;

/// Result of a quadrature: the best available estimate and whether the
/// requested tolerance was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrature {
    /// Integral estimate.
    pub value: f64,
    /// False when bisection hit machine precision (or the depth cap) first.
    pub converged: bool,
}

/// Adaptive Simpson quadrature for layer integrands with no closed form.
///
/// The integrator holds only its tolerance, so layers keep one by value and
/// copies are free.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    tolerance: f64,
}

impl Default for Integrator {
    fn default() -> Self {
        Integrator::new(DEFAULT_INTEGRATION_TOLERANCE)
    }
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) * (fa + 4.0 * fm + fb) / 6.0
}

impl Integrator {
    /// Create an integrator with the given relative tolerance.
    pub fn new(tolerance: f64) -> Self {
        Integrator { tolerance }
    }

    /// The relative tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Integrate `f` over the closed interval `[a, b]`.
    ///
    /// Each panel is compared against the sum of its two halves; a panel is
    /// accepted once the two estimates agree to `tolerance` relative to the
    /// refined value (or the refined value is itself below `tolerance`).
    /// Panels that can no longer be split in floating point are accepted as
    /// they stand and the result is flagged unconverged.
    pub fn integrate_closed<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64) -> Quadrature {
        if a == b {
            return Quadrature {
                value: 0.0,
                converged: true,
            };
        }
        if b < a {
            let q = self.integrate_closed(f, b, a);
            return Quadrature {
                value: -q.value,
                converged: q.converged,
            };
        }
        let fa = f(a);
        let fb = f(b);
        let fm = f(0.5 * (a + b));
        let whole = simpson(a, b, fa, fm, fb);
        let mut converged = true;
        let value = self.refine(&f, [a, b], [fa, fm, fb], whole, 0, &mut converged);
        if !converged {
            warn!(
                "closed quadrature on [{}, {}] stopped before reaching tolerance {}",
                a, b, self.tolerance
            );
        }
        Quadrature { value, converged }
    }

    fn refine<F: Fn(f64) -> f64>(
        &self,
        f: &F,
        [a, b]: [f64; 2],
        [fa, fm, fb]: [f64; 3],
        whole: f64,
        depth: usize,
        converged: &mut bool,
    ) -> f64 {
        let m = 0.5 * (a + b);
        let lm = 0.5 * (a + m);
        let rm = 0.5 * (m + b);
        if !(a < lm && lm < m && m < rm && rm < b) || depth >= MAX_BISECTION_DEPTH {
            *converged = false;
            return whole;
        }

        let flm = f(lm);
        let frm = f(rm);
        let left = simpson(a, m, fa, flm, fm);
        let right = simpson(m, b, fm, frm, fb);
        let refined = left + right;

        if (refined - whole).abs() < self.tolerance * refined.abs()
            || refined.abs() < self.tolerance
        {
            return refined;
        }

        self.refine(f, [a, m], [fa, flm, fm], left, depth + 1, converged)
            + self.refine(f, [m, b], [fm, frm, fb], right, depth + 1, converged)
    }

    /// Integrate `f` over `(a, b]` where `f` may be singular at `a`.
    ///
    /// The bulk `[a + ε, b]` is integrated closed with `ε = (b - a)·tol`, then
    /// slices `[a + ε/10, a + ε]` are added while shrinking `ε` tenfold, until
    /// a slice is negligible against the running sum or `ε` reaches the
    /// smallest representable step near `a`.
    pub fn integrate_open_lower<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64) -> Quadrature {
        if a == b {
            return Quadrature {
                value: 0.0,
                converged: true,
            };
        }

        let min_step = 10.0 * f64::EPSILON * a.abs().max(1.0);
        let mut eps = (b - a) * self.tolerance;
        let bulk = self.integrate_closed(&f, a + eps, b);
        let mut sum = bulk.value;
        let mut converged = bulk.converged;

        loop {
            let slice = self.integrate_closed(&f, a + 0.1 * eps, a + eps);
            sum += slice.value;
            converged &= slice.converged;
            eps *= 0.1;

            if slice.value.abs() < self.tolerance * sum.abs() || sum.abs() < self.tolerance {
                break;
            }
            if eps <= min_step {
                warn!(
                    "open quadrature on ({}, {}] reached minimum step {:e} before tolerance {}",
                    a, b, min_step, self.tolerance
                );
                converged = false;
                break;
            }
        }

        Quadrature {
            value: sum,
            converged,
        }
    }
}
