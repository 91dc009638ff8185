// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use log::{trace, warn};

use crate::config::{DEFAULT_ROOT_TOLERANCE, MAX_SEARCH_ITERATIONS};

/// Golden-section fraction used by the extremum search.
const GOLDEN: f64 = 0.381_966_011_250_105;

/// Guards the relative extremum tolerance when the abscissa is near zero.
const TINY: f64 = 1.0e-12;

/// Which extremum [`RootFinder::extremum_of`] looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    /// Locate a local minimum.
    Minimum,
    /// Locate a local maximum.
    Maximum,
}

/// Location and value of a located extremum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    /// Abscissa of the extremum.
    pub x: f64,
    /// Function value at `x`.
    pub value: f64,
}

/// Brent's bracketed zero finder and Brent's parabolic extremum search.
///
/// Both searches stop after a fixed number of iterations; running out of
/// iterations is logged and the best estimate so far is returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootFinder {
    tolerance: f64,
    max_iterations: usize,
}

impl Default for RootFinder {
    fn default() -> Self {
        RootFinder::new(DEFAULT_ROOT_TOLERANCE)
    }
}

impl RootFinder {
    /// Create a finder with the given tolerance and the default iteration cap.
    pub fn new(tolerance: f64) -> Self {
        RootFinder {
            tolerance,
            max_iterations: MAX_SEARCH_ITERATIONS,
        }
    }

    /// Set the iteration cap (builder method). Default is 100.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// The search tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Find a zero of `f` inside `[a, b]` to absolute tolerance.
    ///
    /// Inverse quadratic interpolation is used when it stays inside the
    /// bracket and shrinks it fast enough; otherwise the step falls back to
    /// bisection. If `f(a)` and `f(b)` share a sign there is no bracket; the
    /// endpoint with the smaller residual is returned and a warning logged.
    pub fn zero_of<F: FnMut(f64) -> f64>(&self, mut f: F, a: f64, b: f64) -> f64 {
        let (mut a, mut b) = (a, b);
        let mut fa = f(a);
        let mut fb = f(b);
        if fa == 0.0 {
            return a;
        }
        if fb == 0.0 {
            return b;
        }
        if fa * fb > 0.0 {
            warn!(
                "zero search on [{}, {}] has no sign change ({} vs {})",
                a, b, fa, fb
            );
            return if fa.abs() < fb.abs() { a } else { b };
        }

        let mut c = b;
        let mut fc = fb;
        let mut d = b - a;
        let mut e = d;

        for iter in 0..self.max_iterations {
            if fb * fc > 0.0 {
                c = a;
                fc = fa;
                d = b - a;
                e = d;
            }
            if fc.abs() < fb.abs() {
                a = b;
                b = c;
                c = a;
                fa = fb;
                fb = fc;
                fc = fa;
            }

            let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * self.tolerance;
            let xm = 0.5 * (c - b);
            if xm.abs() <= tol1 || fb == 0.0 {
                trace!("zero found at {} after {} iterations", b, iter);
                return b;
            }

            if e.abs() >= tol1 && fa.abs() > fb.abs() {
                let s = fb / fa;
                let mut p;
                let mut q;
                if a == c {
                    p = 2.0 * xm * s;
                    q = 1.0 - s;
                } else {
                    let qa = fa / fc;
                    let r = fb / fc;
                    p = s * (2.0 * xm * qa * (qa - r) - (b - a) * (r - 1.0));
                    q = (qa - 1.0) * (r - 1.0) * (s - 1.0);
                }
                if p > 0.0 {
                    q = -q;
                }
                p = p.abs();
                let min1 = 3.0 * xm * q - (tol1 * q).abs();
                let min2 = (e * q).abs();
                if 2.0 * p < min1.min(min2) {
                    e = d;
                    d = p / q;
                } else {
                    d = xm;
                    e = d;
                }
            } else {
                d = xm;
                e = d;
            }

            a = b;
            fa = fb;
            b += if d.abs() > tol1 { d } else { tol1.copysign(xm) };
            fb = f(b);
        }

        warn!(
            "zero search exhausted {} iterations; best estimate {}",
            self.max_iterations, b
        );
        b
    }

    /// Locate an extremum of `f` in the interval spanned by `a` and `c`,
    /// starting the search from `b`.
    ///
    /// A `b` outside the open interval is replaced by the midpoint. The
    /// tolerance is relative to the abscissa.
    pub fn extremum_of<F: FnMut(f64) -> f64>(
        &self,
        mut f: F,
        a: f64,
        b: f64,
        c: f64,
        kind: ExtremumKind,
    ) -> Extremum {
        let sign = match kind {
            ExtremumKind::Minimum => 1.0,
            ExtremumKind::Maximum => -1.0,
        };
        let mut g = |x: f64| sign * f(x);

        let (mut lo, mut hi) = if a < c { (a, c) } else { (c, a) };
        let start = if b > lo && b < hi { b } else { 0.5 * (lo + hi) };

        let mut x = start;
        let mut w = start;
        let mut v = start;
        let mut fx = g(x);
        let mut fw = fx;
        let mut fv = fx;
        let mut d: f64 = 0.0;
        let mut e: f64 = 0.0;

        for iter in 0..self.max_iterations {
            let xm = 0.5 * (lo + hi);
            let tol1 = self.tolerance * x.abs() + TINY;
            let tol2 = 2.0 * tol1;
            if (x - xm).abs() <= tol2 - 0.5 * (hi - lo) {
                trace!("extremum found at {} after {} iterations", x, iter);
                return Extremum {
                    x,
                    value: sign * fx,
                };
            }

            let mut golden_step = true;
            if e.abs() > tol1 {
                let r = (x - w) * (fx - fv);
                let mut q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();
                let e_prev = e;
                e = d;
                if !(p.abs() >= (0.5 * q * e_prev).abs() || p <= q * (lo - x) || p >= q * (hi - x))
                {
                    d = p / q;
                    let u = x + d;
                    if u - lo < tol2 || hi - u < tol2 {
                        d = tol1.copysign(xm - x);
                    }
                    golden_step = false;
                }
            }
            if golden_step {
                e = if x >= xm { lo - x } else { hi - x };
                d = GOLDEN * e;
            }

            let u = if d.abs() >= tol1 {
                x + d
            } else {
                x + tol1.copysign(d)
            };
            let fu = g(u);

            if fu <= fx {
                if u >= x {
                    lo = x;
                } else {
                    hi = x;
                }
                v = w;
                fv = fw;
                w = x;
                fw = fx;
                x = u;
                fx = fu;
            } else {
                if u < x {
                    lo = u;
                } else {
                    hi = u;
                }
                if fu <= fw || w == x {
                    v = w;
                    fv = fw;
                    w = u;
                    fw = fu;
                } else if fu <= fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }

        warn!(
            "extremum search exhausted {} iterations; best estimate {}",
            self.max_iterations, x
        );
        Extremum {
            x,
            value: sign * fx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_of_cubic() {
        let finder = RootFinder::new(1e-12);
        let x = finder.zero_of(|x| x * x * x - 2.0, 0.0, 2.0);
        assert!((x - 2f64.cbrt()).abs() < 1e-10, "x = {}", x);
    }

    #[test]
    fn zero_of_accepts_reversed_bracket() {
        let finder = RootFinder::new(1e-12);
        let x = finder.zero_of(f64::cos, 3.0, 0.0);
        assert!((x - std::f64::consts::FRAC_PI_2).abs() < 1e-10, "x = {}", x);
    }

    #[test]
    fn zero_at_endpoint_is_returned_exactly() {
        let finder = RootFinder::default();
        assert_eq!(finder.zero_of(|x| x - 1.0, 1.0, 3.0), 1.0);
        assert_eq!(finder.zero_of(|x| x - 3.0, 1.0, 3.0), 3.0);
    }

    #[test]
    fn no_bracket_returns_smaller_residual() {
        let finder = RootFinder::default();
        let x = finder.zero_of(|x| x * x + 1.0, -0.5, 2.0);
        assert_eq!(x, -0.5);
    }

    #[test]
    fn zero_counts_evaluations_within_cap() {
        let finder = RootFinder::new(1e-10).with_max_iterations(100);
        let mut calls = 0usize;
        let x = finder.zero_of(
            |x| {
                calls += 1;
                (x - 0.3).tanh()
            },
            -10.0,
            10.0,
        );
        assert!((x - 0.3).abs() < 1e-9);
        assert!(calls <= 102, "calls = {}", calls);
    }

    #[test]
    fn iteration_cap_returns_best_estimate() {
        let finder = RootFinder::new(1e-15).with_max_iterations(3);
        let x = finder.zero_of(|x| x - 0.123_456, 0.0, 1000.0);
        assert!((0.0..=1000.0).contains(&x));
    }

    #[test]
    fn minimum_of_parabola() {
        let finder = RootFinder::new(1e-8);
        let ext = finder.extremum_of(|x| (x - 2.5).powi(2) + 1.0, 0.0, 1.0, 5.0, ExtremumKind::Minimum);
        assert!((ext.x - 2.5).abs() < 1e-4, "x = {}", ext.x);
        assert!((ext.value - 1.0).abs() < 1e-8);
    }

    #[test]
    fn maximum_reports_unflipped_value() {
        let finder = RootFinder::new(1e-8);
        let ext = finder.extremum_of(|x| x.sin(), 0.0, 1.0, 3.0, ExtremumKind::Maximum);
        assert!((ext.x - std::f64::consts::FRAC_PI_2).abs() < 1e-4, "x = {}", ext.x);
        assert!((ext.value - 1.0).abs() < 1e-8);
    }

    #[test]
    fn start_outside_interval_uses_midpoint() {
        let finder = RootFinder::new(1e-8);
        let ext = finder.extremum_of(|x| (x + 1.0).powi(2), -3.0, 10.0, 0.0, ExtremumKind::Minimum);
        assert!((ext.x + 1.0).abs() < 1e-4, "x = {}", ext.x);
    }
}
