// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

use crate::functional::{LegValue, Legs};

const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Geometry of a solved ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RayType {
    /// Turns below both endpoints.
    #[default]
    Turning,
    /// Travels directly up from the source.
    UpGoing,
    /// Travels directly down from the source.
    DownGoing,
}

impl fmt::Display for RayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RayType::Turning => "Turning",
            RayType::UpGoing => "Up-going",
            RayType::DownGoing => "Down-going",
        })
    }
}

/// Which part of a layer's branch produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Branch {
    /// Direct up/down-going ray.
    Direct,
    /// A monotonic layer branch.
    #[default]
    Whole,
    /// Upper half of a retrograde layer (between top and the fold).
    Upper,
    /// Lower half of a retrograde layer (between the fold and bottom).
    Lower,
    /// Diffracted along the layer bottom at the layer's bottom velocity.
    DiffractedUpper,
    /// Diffracted along the same interface at the next layer's top velocity.
    DiffractedLower,
}

impl Branch {
    /// Suffix used in default phase names.
    pub fn suffix(self) -> &'static str {
        match self {
            Branch::Direct => "",
            Branch::Whole => "b",
            Branch::Upper => "b+",
            Branch::Lower => "b-",
            Branch::DiffractedUpper => "i+",
            Branch::DiffractedLower => "i-",
        }
    }

    /// True for the two diffracted branches.
    pub fn is_diffracted(self) -> bool {
        matches!(self, Branch::DiffractedUpper | Branch::DiffractedLower)
    }
}

/// Partial derivatives of travel time at the query point.
///
/// Distance derivatives are per radian; depth derivatives per km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivatives {
    /// ∂T/∂Δ.
    pub dt_ddistance: f64,
    /// ∂T/∂h.
    pub dt_ddepth: f64,
    /// ∂²T/∂Δ∂h.
    pub d2t_ddistance_ddepth: f64,
    /// ∂²T/∂Δ².
    pub d2t_ddistance2: f64,
}

/// One arrival found by [`TravelTimeSolver`](crate::solver::TravelTimeSolver).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TravelTimeResult {
    /// Ray parameter in s/rad.
    pub ray_parameter: f64,
    /// Turning radius (the receiver-side radius for direct rays).
    pub turning_radius: f64,
    /// Velocity at the turning radius.
    pub turning_velocity: f64,
    /// Layer that produced the arrival.
    pub layer_index: usize,
    /// Ray geometry.
    pub ray_type: RayType,
    /// Branch within the layer.
    pub branch: Branch,
    /// Name built from the phase type, layer index and branch.
    pub evaluated_name: String,
    /// Phase name attached to the layer, if any.
    pub phase_name: Option<String>,
    /// Travel time in seconds.
    pub time: f64,
    /// Leg distances and times.
    pub legs: Legs,
    /// Interface leg of a diffracted arrival.
    pub interface: Option<LegValue>,
    /// Ray parameter range of the branch the arrival was solved in.
    pub branch_range: (f64, f64),
    /// Derivatives, when requested and available.
    pub derivatives: Option<Derivatives>,
}

impl TravelTimeResult {
    /// The attached phase name, falling back to the evaluated name.
    pub fn name(&self) -> &str {
        self.phase_name.as_deref().unwrap_or(&self.evaluated_name)
    }

    /// True for diffracted arrivals.
    pub fn is_diffracted(&self) -> bool {
        self.branch.is_diffracted()
    }

    /// True if `name` equals either the attached or the evaluated name.
    pub fn matches(&self, name: &str) -> bool {
        self.evaluated_name == name || self.phase_name.as_deref() == Some(name)
    }

    /// True if either name starts with `prefix`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.evaluated_name.starts_with(prefix)
            || self
                .phase_name
                .as_deref()
                .is_some_and(|n| n.starts_with(prefix))
    }

    fn clear(&mut self) {
        self.ray_parameter = 0.0;
        self.turning_radius = 0.0;
        self.turning_velocity = 0.0;
        self.layer_index = 0;
        self.ray_type = RayType::Turning;
        self.branch = Branch::Whole;
        self.evaluated_name.clear();
        self.phase_name = None;
        self.time = 0.0;
        self.legs = Legs::default();
        self.interface = None;
        self.branch_range = (0.0, 0.0);
        self.derivatives = None;
    }
}

impl fmt::Display for TravelTimeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10}", self.name())?;
        if self.phase_name.is_some() {
            write!(f, " ({})", self.evaluated_name)?;
        }
        writeln!(
            f,
            " {} ray, layer {}, T = {:.4} s",
            self.ray_type, self.layer_index, self.time
        )?;
        writeln!(
            f,
            "  p = {:.6} s/deg, turning radius {:.4} km, velocity {:.4} km/s",
            self.ray_parameter / RAD_TO_DEG,
            self.turning_radius,
            self.turning_velocity
        )?;
        let rows = [
            ("Ray", &self.legs.ray),
            ("Source", &self.legs.source),
            ("Receiver", &self.legs.receiver),
        ];
        for (label, leg) in rows {
            writeln!(
                f,
                "  {:<9} leg: {:>10.4} deg {:>10.4} s",
                label,
                leg.distance * RAD_TO_DEG,
                leg.time
            )?;
        }
        if let Some(leg) = &self.interface {
            writeln!(
                f,
                "  Interface leg: {:>10.4} deg {:>10.4} s",
                leg.distance * RAD_TO_DEG,
                leg.time
            )?;
        }
        match &self.derivatives {
            Some(d) => write!(
                f,
                "  dT/dD = {:.6} s/deg, dT/dh = {:.6} s/km, d2T/dDdh = {:.6e}, d2T/dD2 = {:.6e}",
                d.dt_ddistance / RAD_TO_DEG,
                d.dt_ddepth,
                d.d2t_ddistance_ddepth / RAD_TO_DEG,
                d.d2t_ddistance2 / (RAD_TO_DEG * RAD_TO_DEG)
            ),
            None => write!(f, "  derivatives unavailable"),
        }
    }
}

/// Per-solver storage for query results.
///
/// Results from the previous query are moved to a free pool on reset and
/// handed out again by [`acquire`](Self::acquire), so steady-state queries
/// allocate nothing for result objects or their names.
#[derive(Debug, Default)]
pub struct ResultArena {
    active: Vec<TravelTimeResult>,
    pool: Vec<TravelTimeResult>,
}

impl ResultArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recycle every active result.
    pub fn reset(&mut self) {
        self.pool.append(&mut self.active);
    }

    /// A cleared result, reused from the pool when possible.
    pub fn acquire(&mut self) -> TravelTimeResult {
        match self.pool.pop() {
            Some(mut r) => {
                r.clear();
                r
            }
            None => TravelTimeResult::default(),
        }
    }

    /// Insert in time order; equal times keep insertion order.
    pub fn insert(&mut self, result: TravelTimeResult) {
        let at = self.active.partition_point(|r| r.time <= result.time);
        self.active.insert(at, result);
    }

    /// Active results in time order.
    pub fn results(&self) -> &[TravelTimeResult] {
        &self.active
    }

    /// Number of active results.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// True if there are no active results.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of recycled results waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(time: f64, name: &str) -> TravelTimeResult {
        TravelTimeResult {
            time,
            evaluated_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn insert_orders_by_time_and_keeps_ties_stable() {
        let mut arena = ResultArena::new();
        arena.insert(result(5.0, "a"));
        arena.insert(result(3.0, "b"));
        arena.insert(result(5.0, "c"));
        arena.insert(result(4.0, "d"));
        let names: Vec<&str> = arena.results().iter().map(|r| r.name()).collect();
        assert_eq!(names, ["b", "d", "a", "c"]);
    }

    #[test]
    fn reset_recycles_into_pool() {
        let mut arena = ResultArena::new();
        arena.insert(result(1.0, "P0b"));
        arena.insert(result(2.0, "P1b"));
        arena.reset();
        assert!(arena.is_empty());
        assert_eq!(arena.pooled(), 2);

        let reused = arena.acquire();
        assert_eq!(arena.pooled(), 1);
        assert!(reused.evaluated_name.is_empty());
        assert!(reused.evaluated_name.capacity() >= 3);
        assert_eq!(reused.time, 0.0);
    }

    #[test]
    fn name_prefers_attached_phase_name() {
        let mut r = result(1.0, "P2b");
        assert_eq!(r.name(), "P2b");
        r.phase_name = Some("Pn".to_string());
        assert_eq!(r.name(), "Pn");
        assert!(r.matches("P2b"));
        assert!(r.matches("Pn"));
        assert!(r.matches_prefix("P2"));
        assert!(!r.matches_prefix("S"));
    }

    #[test]
    fn branch_suffixes() {
        assert_eq!(Branch::Whole.suffix(), "b");
        assert_eq!(Branch::Upper.suffix(), "b+");
        assert_eq!(Branch::Lower.suffix(), "b-");
        assert_eq!(Branch::DiffractedUpper.suffix(), "i+");
        assert_eq!(Branch::DiffractedLower.suffix(), "i-");
        assert!(Branch::DiffractedLower.is_diffracted());
        assert!(!Branch::Direct.is_diffracted());
    }

    #[test]
    fn display_without_derivatives() {
        let r = result(138.9, "P0b");
        let text = r.to_string();
        assert!(text.starts_with("P0b"));
        assert!(text.contains("T = 138.9000 s"));
        assert!(text.contains("derivatives unavailable"));
    }
}
