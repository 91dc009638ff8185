// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Finite-difference travel-time derivatives.
//!
//! Each arrival is re-solved at four offsets around the query point in
//! (distance, depth) and the four travel times are combined by a stencil.
//! Offsets that leave the arrival's branch cannot be re-solved, so near a
//! branch end the centered stencil is replaced by a one-sided variant and,
//! failing all seven, both steps are halved.

use log::{trace, warn};

use crate::functional::{RayZeroFunctional, SearchMode};
use crate::result::Derivatives;
use crate::root_finder::RootFinder;

/// The ray-parameter bracket an arrival was found in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BranchSpec {
    /// Direct ray, bracketed by the geometry's minimum ray parameter and 0.
    Direct,
    /// Turning ray in `[upper, lower]`; `guard` is the branch top handed to
    /// the zero functional.
    Turning {
        /// Top ray parameter of the layer branch.
        guard: f64,
        /// Upper bracket end.
        upper: f64,
        /// Lower bracket end.
        lower: f64,
    },
    /// Diffracted ray leaving the branch at `p_bottom` and travelling along
    /// the interface with slowness `p_interface`.
    Diffracted {
        /// Top ray parameter of the layer branch.
        guard: f64,
        /// Bottom ray parameter of the branch.
        p_bottom: f64,
        /// Interface slowness (s/rad).
        p_interface: f64,
    },
}

/// Solve the branch for a travel time at (`distance`, `depth`) using `f` as
/// scratch. Returns `None` when the point lies outside the branch.
pub fn branch_time(
    f: &mut RayZeroFunctional,
    finder: &RootFinder,
    spec: BranchSpec,
    distance: f64,
    depth: f64,
) -> Option<f64> {
    f.set_distance(distance);
    f.set_source_depth(depth);
    match spec {
        BranchSpec::Direct => {
            f.set_mode(SearchMode::Direct);
            let top = f.min_ray_parameter();
            solve_bracket(f, finder, top, 0.0)
        }
        BranchSpec::Turning {
            guard,
            upper,
            lower,
        } => {
            f.set_mode(SearchMode::Turning);
            f.set_p_top(guard);
            let top = upper.min(f.min_ray_parameter());
            if top <= lower {
                return None;
            }
            solve_bracket(f, finder, top, lower)
        }
        BranchSpec::Diffracted {
            guard,
            p_bottom,
            p_interface,
        } => {
            f.set_mode(SearchMode::Turning);
            f.set_p_top(guard);
            let eval = f.evaluate(p_bottom);
            if eval.is_valid() && eval.zero >= 0.0 {
                Some(f.time(p_bottom) + eval.zero * p_interface)
            } else {
                None
            }
        }
    }
}

fn solve_bracket(f: &mut RayZeroFunctional, finder: &RootFinder, a: f64, b: f64) -> Option<f64> {
    let ea = f.evaluate(a);
    let eb = f.evaluate(b);
    if !(ea.is_valid() && eb.is_valid()) {
        return None;
    }
    let p = if ea.zero == 0.0 {
        a
    } else if eb.zero == 0.0 {
        b
    } else if ea.zero * eb.zero < 0.0 {
        finder.zero_of(|p| f.zero(p), a, b)
    } else {
        return None;
    };
    Some(f.corrected_time(p))
}

/// One of the seven finite-difference stencils.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stencil {
    /// Four diagonal points around the query.
    Centered,
    /// Forward in distance, forward in depth.
    A,
    /// Centered in distance, forward in depth.
    B,
    /// Backward in distance, forward in depth.
    C,
    /// Forward in distance, backward in depth.
    D,
    /// Centered in distance, backward in depth.
    E,
    /// Backward in distance, backward in depth.
    F,
}

impl Stencil {
    /// Every stencil in trial order when nothing is known.
    pub const ALL: [Stencil; 7] = [
        Stencil::Centered,
        Stencil::A,
        Stencil::B,
        Stencil::C,
        Stencil::D,
        Stencil::E,
        Stencil::F,
    ];

    const ALTERNATES: [Stencil; 6] = [
        Stencil::A,
        Stencil::B,
        Stencil::C,
        Stencil::D,
        Stencil::E,
        Stencil::F,
    ];

    /// (distance, depth) offsets of the four points, in steps.
    pub fn offsets(self) -> [(f64, f64); 4] {
        match self {
            Stencil::Centered => [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)],
            Stencil::A => [(0.5, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
            Stencil::B => [(-1.0, 0.0), (1.0, 0.0), (1.0, 1.0), (-1.0, 1.0)],
            Stencil::C => [(-1.0, 0.0), (-0.5, 0.0), (0.0, 1.0), (-1.0, 1.0)],
            Stencil::D => [(0.0, -1.0), (1.0, -1.0), (1.0, 0.0), (0.5, 0.0)],
            Stencil::E => [(-1.0, -1.0), (1.0, -1.0), (1.0, 0.0), (-1.0, 0.0)],
            Stencil::F => [(-1.0, -1.0), (0.0, -1.0), (-0.5, 0.0), (-1.0, 0.0)],
        }
    }

    /// Alternates to try after the centered stencil failed at point `k`
    /// (1-based): the two most likely to avoid that point first, then the
    /// rest in A..F order.
    pub fn fallback_order(k: usize) -> Vec<Stencil> {
        let first: [Stencil; 2] = match k {
            1 => [Stencil::B, Stencil::A],
            2 => [Stencil::B, Stencil::C],
            3 => [Stencil::E, Stencil::F],
            _ => [Stencil::E, Stencil::D],
        };
        let mut order = first.to_vec();
        order.extend(Self::ALTERNATES.iter().filter(|s| !first.contains(s)));
        order
    }

    fn combine(self, t00: f64, [t1, t2, t3, t4]: [f64; 4], ed: f64, eh: f64) -> Derivatives {
        let (d0, d1, d2, d3) = match self {
            Stencil::Centered => (
                (t2 - t1 + t3 - t4) / (4.0 * ed),
                (t3 - t2 + t4 - t1) / (4.0 * eh),
                (t3 - t4 - t2 + t1) / (4.0 * ed * eh),
                (t3 + t2 - 4.0 * t00 + t4 + t1) / (2.0 * ed * ed),
            ),
            Stencil::A => (
                2.0 * (t1 - t00) / ed,
                (t4 - t00) / eh,
                (t3 - t4 - t2 + t00) / (ed * eh),
                4.0 * (t2 - 2.0 * t1 + t00) / (ed * ed),
            ),
            Stencil::B => (
                (t2 - t1) / (2.0 * ed),
                (t3 - t2 + t4 - t1) / (2.0 * eh),
                (t3 - t4 - t2 + t1) / (2.0 * ed * eh),
                (t2 - 2.0 * t00 + t1) / (ed * ed),
            ),
            Stencil::C => (
                2.0 * (t00 - t2) / ed,
                (t3 - t00) / eh,
                (t3 - t4 - t00 + t1) / (ed * eh),
                4.0 * (t00 - 2.0 * t2 + t1) / (ed * ed),
            ),
            Stencil::D => (
                2.0 * (t4 - t00) / ed,
                (t00 - t1) / eh,
                (t3 - t00 - t2 + t1) / (ed * eh),
                4.0 * (t3 - 2.0 * t4 + t00) / (ed * ed),
            ),
            Stencil::E => (
                (t3 - t4) / (2.0 * ed),
                (t3 - t2 + t4 - t1) / (2.0 * eh),
                (t3 - t4 - t2 + t1) / (2.0 * ed * eh),
                (t3 - 2.0 * t00 + t4) / (ed * ed),
            ),
            Stencil::F => (
                2.0 * (t00 - t3) / ed,
                (t00 - t2) / eh,
                (t00 - t4 - t2 + t1) / (ed * eh),
                4.0 * (t00 - 2.0 * t3 + t4) / (ed * ed),
            ),
        };
        Derivatives {
            dt_ddistance: d0,
            dt_ddepth: d1,
            d2t_ddistance_ddepth: d2,
            d2t_ddistance2: d3,
        }
    }
}

/// A successful derivative evaluation and how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivativeEstimate {
    /// The four derivatives.
    pub derivatives: Derivatives,
    /// Stencil that succeeded.
    pub stencil: Stencil,
    /// Number of step halvings before success.
    pub halvings: usize,
}

/// Evaluates travel-time derivatives of a solved arrival.
#[derive(Debug, Clone, Copy)]
pub struct DerivativeEvaluator {
    finder: RootFinder,
    distance_step: f64,
    depth_step: f64,
    max_halvings: usize,
}

impl DerivativeEvaluator {
    /// Evaluator with initial steps in radians and km.
    pub fn new(finder: RootFinder, distance_step: f64, depth_step: f64, max_halvings: usize) -> Self {
        DerivativeEvaluator {
            finder,
            distance_step,
            depth_step,
            max_halvings,
        }
    }

    /// Evaluate one stencil at the given steps.
    ///
    /// On failure returns the 1-based index of the first point that could
    /// not be solved.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_stencil(
        &self,
        f: &mut RayZeroFunctional,
        spec: BranchSpec,
        stencil: Stencil,
        t00: f64,
        distance: f64,
        depth: f64,
        ed: f64,
        eh: f64,
    ) -> Result<Derivatives, usize> {
        let mut times = [0.0; 4];
        for (k, (od, oh)) in stencil.offsets().into_iter().enumerate() {
            match branch_time(f, &self.finder, spec, distance + od * ed, depth + oh * eh) {
                Some(t) => times[k] = t,
                None => return Err(k + 1),
            }
        }
        Ok(stencil.combine(t00, times, ed, eh))
    }

    /// Derivatives of the arrival with time `t00` at (`distance`, `depth`).
    ///
    /// `f` must be a private copy of the solver's functional; its distance,
    /// source depth and mode are overwritten.
    pub fn evaluate(
        &self,
        f: &mut RayZeroFunctional,
        spec: BranchSpec,
        t00: f64,
        distance: f64,
        depth: f64,
    ) -> Option<DerivativeEstimate> {
        let mut ed = self.distance_step;
        let mut eh = self.depth_step;
        for halvings in 0..=self.max_halvings {
            let first = self.evaluate_stencil(f, spec, Stencil::Centered, t00, distance, depth, ed, eh);
            let failed_at = match first {
                Ok(derivatives) => {
                    return Some(DerivativeEstimate {
                        derivatives,
                        stencil: Stencil::Centered,
                        halvings,
                    })
                }
                Err(k) => k,
            };
            for stencil in Stencil::fallback_order(failed_at) {
                if let Ok(derivatives) = self.evaluate_stencil(f, spec, stencil, t00, distance, depth, ed, eh) {
                    trace!(
                        "derivatives from stencil {:?} after {} halvings",
                        stencil,
                        halvings
                    );
                    return Some(DerivativeEstimate {
                        derivatives,
                        stencil,
                        halvings,
                    });
                }
            }
            ed *= 0.5;
            eh *= 0.5;
        }
        warn!(
            "no derivative stencil fits the branch at distance {} rad, depth {} km",
            distance, depth
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_order_covers_every_alternate_once() {
        for k in 1..=4 {
            let order = Stencil::fallback_order(k);
            assert_eq!(order.len(), 6);
            for s in Stencil::ALTERNATES {
                assert_eq!(order.iter().filter(|&&o| o == s).count(), 1);
            }
        }
        assert_eq!(Stencil::fallback_order(1)[..2], [Stencil::B, Stencil::A]);
        assert_eq!(Stencil::fallback_order(2)[..2], [Stencil::B, Stencil::C]);
        assert_eq!(Stencil::fallback_order(3)[..2], [Stencil::E, Stencil::F]);
        assert_eq!(Stencil::fallback_order(4)[..2], [Stencil::E, Stencil::D]);
    }

    #[test]
    fn stencils_are_exact_on_a_quadratic_surface() {
        // T = 3 + 2x - y + 0.5xy + 4x^2 has exact stencil derivatives.
        let t = |x: f64, y: f64| 3.0 + 2.0 * x - y + 0.5 * x * y + 4.0 * x * x;
        let (x0, y0) = (0.3, 1.2);
        let (ed, eh) = (0.01, 0.1);
        for stencil in Stencil::ALL {
            let mut times = [0.0; 4];
            for (k, (od, oh)) in stencil.offsets().into_iter().enumerate() {
                times[k] = t(x0 + od * ed, y0 + oh * eh);
            }
            let d = stencil.combine(t(x0, y0), times, ed, eh);
            let dx = 2.0 + 0.5 * y0 + 8.0 * x0;
            let dy = -1.0 + 0.5 * x0;
            let tol = 1e-6 + 8.0 * ed;
            assert!((d.dt_ddistance - dx).abs() < tol, "{:?}: dT/dx {} vs {}", stencil, d.dt_ddistance, dx);
            assert!((d.dt_ddepth - dy).abs() < 1e-6, "{:?}: dT/dy {} vs {}", stencil, d.dt_ddepth, dy);
            assert!((d.d2t_ddistance_ddepth - 0.5).abs() < 1e-6, "{:?}: mixed {}", stencil, d.d2t_ddistance_ddepth);
            assert!((d.d2t_ddistance2 - 8.0).abs() < 1e-4, "{:?}: second {}", stencil, d.d2t_ddistance2);
        }
    }
}
