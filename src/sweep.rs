// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Adaptive sampling of a layer's surface-to-surface branch.

use std::fmt;

use crate::error::{Result, TauPError};
use crate::model::VelocityModel;

const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Largest step-scale exponent before the sweep accepts an oversized step.
const MAX_REFINEMENTS: u32 = 30;

/// One point on a branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchSample {
    /// Ray parameter in s/rad.
    pub ray_parameter: f64,
    /// Turning radius in km.
    pub turning_radius: f64,
    /// Velocity at the turning radius.
    pub velocity: f64,
    /// Surface-to-surface distance in radians.
    pub distance: f64,
    /// Surface-to-surface time in seconds.
    pub time: f64,
}

impl fmt::Display for BranchSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>12.4} {:>12.6} {:>10.4} {:>12.6} {:>12.4}",
            self.turning_radius,
            self.ray_parameter / RAD_TO_DEG,
            self.velocity,
            self.distance * RAD_TO_DEG,
            self.time
        )
    }
}

/// Samples the branch of one layer so that consecutive points are about
/// `|distance_bottom − distance_top| / n` apart in distance.
#[derive(Debug, Clone, Copy)]
pub struct BranchSweep<'a> {
    model: &'a VelocityModel,
    samples: usize,
    fractions: (f64, f64),
}

impl<'a> BranchSweep<'a> {
    /// Sweep of the whole branch with 100 nominal intervals.
    pub fn new(model: &'a VelocityModel) -> Self {
        BranchSweep {
            model,
            samples: 100,
            fractions: (0.0, 1.0),
        }
    }

    /// Nominal number of intervals (at least 1).
    pub fn with_samples(mut self, n: usize) -> Self {
        self.samples = n.max(1);
        self
    }

    /// Restrict the sweep to the part of the branch between two fractions
    /// of its ray-parameter range, 0 being the top.
    ///
    /// # Errors
    /// Returns [`TauPError::Other`] unless `0 ≤ f0 ≤ f1 ≤ 1`.
    pub fn with_fractions(mut self, f0: f64, f1: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&f0) || !(0.0..=1.0).contains(&f1) || f0 > f1 {
            return Err(TauPError::Other(format!(
                "sweep fractions must satisfy 0 <= f0 <= f1 <= 1, got {} and {}",
                f0, f1
            )));
        }
        self.fractions = (f0, f1);
        Ok(self)
    }

    /// Sample layer `index`. Shadow layers give an empty sweep.
    pub fn sweep(&self, index: usize) -> Result<Vec<BranchSample>> {
        let layer = self.model.layer(index)?;
        let Some(limits) = self.model.limits(index) else {
            return Ok(Vec::new());
        };
        let Some((p_top, p_bottom)) = limits.effective_range(layer) else {
            return Ok(Vec::new());
        };

        let (f0, f1) = self.fractions;
        let span = p_bottom - p_top;
        let p0 = p_top + f0 * span;
        let p1 = p_top + f1 * span;
        let n = self.samples as f64;
        let dd = 2.0 * (limits.distance_bottom - limits.distance_top).abs() / n;
        let dp = (p1 - p0) / n;

        let sample = |p: f64| -> BranchSample {
            let bottom_pass = p == p_top;
            let radius = if p >= layer.p_top() {
                layer.r_top()
            } else {
                layer.radius_at_p(p).max(layer.r_bottom())
            };
            BranchSample {
                ray_parameter: p,
                turning_radius: radius,
                velocity: layer.velocity(radius),
                distance: 2.0 * self.model.distance_to_turn(p, bottom_pass).value,
                time: 2.0 * self.model.time_to_turn(p, bottom_pass).value,
            }
        };
        let step = |from: f64, scale: u32| step_toward(from, dp, scale, p1);

        let mut out = vec![sample(p0)];
        if dp == 0.0 {
            return Ok(out);
        }
        let mut scale = 0u32;
        let mut last = out[0];
        while last.ray_parameter != p1 {
            let mut next = sample(step(last.ray_parameter, scale));
            if dd > 0.0 && (next.distance - last.distance).abs() > dd {
                while (next.distance - last.distance).abs() > dd && scale < MAX_REFINEMENTS {
                    scale += 1;
                    next = sample(step(last.ray_parameter, scale));
                }
            } else {
                while scale > 0 && next.ray_parameter != p1 {
                    let wider = sample(step(last.ray_parameter, scale - 1));
                    if (wider.distance - last.distance).abs() > dd {
                        break;
                    }
                    scale -= 1;
                    next = wider;
                }
            }
            out.push(next);
            last = next;
        }
        Ok(out)
    }
}

/// One step of `dp / 2^scale` from `from`, clamped so it never passes `end`.
fn step_toward(from: f64, dp: f64, scale: u32, end: f64) -> f64 {
    let next = from + dp / f64::from(1u32 << scale);
    if dp < 0.0 {
        next.max(end)
    } else {
        next.min(end)
    }
}
