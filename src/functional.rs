// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use crate::model::{RayIntegral, VelocityModel};
use crate::result::RayType;

/// A source or receiver position expressed as a radius.
///
/// Positions above the surface are reflected back below it and carry a sign
/// of -1, so their leg is added to rather than subtracted from the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    /// Depth below the surface in km (negative above it).
    pub depth: f64,
    /// Radius used for integration.
    pub radius: f64,
    /// +1 at or below the surface, -1 above it.
    pub sign: f64,
}

impl Endpoint {
    /// Endpoint at `depth` km in a planet of radius `planet_radius`.
    pub fn at_depth(depth: f64, planet_radius: f64) -> Self {
        let r = planet_radius - depth;
        if r > planet_radius {
            Endpoint {
                depth,
                radius: 2.0 * planet_radius - r,
                sign: -1.0,
            }
        } else {
            Endpoint {
                depth,
                radius: r,
                sign: 1.0,
            }
        }
    }
}

/// Which distance mismatch [`RayZeroFunctional::zero`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Ray turning below both endpoints.
    Turning,
    /// Ray travelling straight up or down between the endpoints.
    Direct,
}

/// The distance legs of one trial ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Trial ray parameter.
    pub p: f64,
    /// Target distance minus the distance this ray covers.
    pub zero: f64,
    /// Surface-to-turning-point leg (turning) or the endpoint-to-endpoint leg
    /// (direct).
    pub ray: RayIntegral,
    /// Surface-to-source leg.
    pub source: RayIntegral,
    /// Surface-to-receiver leg.
    pub receiver: RayIntegral,
}

impl Evaluation {
    /// True when every leg the current mode depends on is traversable.
    pub fn is_valid(&self) -> bool {
        self.ray.valid && self.source.valid && self.receiver.valid
    }
}

/// Distance and time of one leg, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LegValue {
    /// One-way distance in radians.
    pub distance: f64,
    /// One-way travel time in seconds.
    pub time: f64,
}

/// Distances and times of all legs of a solved ray.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Legs {
    /// Turning (or direct) leg.
    pub ray: LegValue,
    /// Source leg.
    pub source: LegValue,
    /// Receiver leg.
    pub receiver: LegValue,
}

/// Maps a trial ray parameter to the mismatch between the target distance
/// and the distance a ray with that parameter covers between the source and
/// receiver.
///
/// The last evaluation is cached, since the zero finder and the branch
/// search both re-evaluate bracket endpoints.
#[derive(Debug, Clone)]
pub struct RayZeroFunctional {
    model: Arc<VelocityModel>,
    receiver: Endpoint,
    source: Endpoint,
    distance: f64,
    p_top: f64,
    mode: SearchMode,
    last: Option<Evaluation>,
}

impl RayZeroFunctional {
    /// Functional over `model` with both endpoints at the surface.
    pub fn new(model: Arc<VelocityModel>) -> Self {
        let radius = model.planet_radius();
        let p_top = model.layers().first().map_or(0.0, |l| l.p_top());
        RayZeroFunctional {
            model,
            receiver: Endpoint::at_depth(0.0, radius),
            source: Endpoint::at_depth(0.0, radius),
            distance: 0.0,
            p_top,
            mode: SearchMode::Turning,
            last: None,
        }
    }

    /// The shared model.
    pub fn model(&self) -> &Arc<VelocityModel> {
        &self.model
    }

    /// Place the receiver at `depth` km.
    pub fn set_receiver_depth(&mut self, depth: f64) {
        self.receiver = Endpoint::at_depth(depth, self.model.planet_radius());
        self.last = None;
    }

    /// Place the source at `depth` km.
    pub fn set_source_depth(&mut self, depth: f64) {
        self.source = Endpoint::at_depth(depth, self.model.planet_radius());
        self.last = None;
    }

    /// Set the target epicentral distance in radians.
    pub fn set_distance(&mut self, distance: f64) {
        self.distance = distance;
        self.last = None;
    }

    /// Select turning or direct mismatch.
    pub fn set_mode(&mut self, mode: SearchMode) {
        if self.mode != mode {
            self.mode = mode;
            self.last = None;
        }
    }

    /// Set the top ray parameter of the branch being searched.
    ///
    /// Turning rays above it are invalid; a ray exactly at it is followed
    /// through a bottom-grazing turn into the layer below.
    pub fn set_p_top(&mut self, p_top: f64) {
        self.p_top = p_top;
        self.last = None;
    }

    /// Receiver endpoint.
    pub fn receiver(&self) -> Endpoint {
        self.receiver
    }

    /// Source endpoint.
    pub fn source(&self) -> Endpoint {
        self.source
    }

    /// Target distance in radians.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Branch top ray parameter.
    pub fn p_top(&self) -> f64 {
        self.p_top
    }

    /// Current search mode.
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Smallest ray parameter that still connects source and receiver.
    pub fn min_ray_parameter(&self) -> f64 {
        self.model
            .min_ray_parameter(self.source.radius.min(self.receiver.radius))
    }

    fn both_below_surface(&self) -> bool {
        self.source.sign > 0.0 && self.receiver.sign > 0.0
    }

    fn upper_lower(&self) -> (f64, f64) {
        let (rs, rr) = (self.source.radius, self.receiver.radius);
        (rs.max(rr), rs.min(rr))
    }

    /// Evaluate all legs at `p`, reusing the cached result when `p` repeats.
    pub fn evaluate(&mut self, p: f64) -> Evaluation {
        if let Some(last) = self.last {
            if last.p == p {
                return last;
            }
        }

        let source = self.model.distance_to_radius(p, self.source.radius);
        let receiver = self.model.distance_to_radius(p, self.receiver.radius);
        let (ray, covered) = match self.mode {
            SearchMode::Turning => {
                let mut ray = self.model.distance_to_turn(p, p == self.p_top);
                ray.valid &= p <= self.p_top;
                let covered = 2.0 * ray.value
                    - self.source.sign * source.value
                    - self.receiver.sign * receiver.value;
                (ray, covered)
            }
            SearchMode::Direct if self.both_below_surface() => {
                let (upper, lower) = self.upper_lower();
                let ray = self.model.distance_between(p, upper, lower);
                (ray, ray.value)
            }
            SearchMode::Direct => {
                let net = (self.source.sign * source.value - self.receiver.sign * receiver.value).abs();
                let ray = RayIntegral {
                    value: net,
                    valid: source.valid && receiver.valid,
                };
                (ray, net)
            }
        };

        let eval = Evaluation {
            p,
            zero: self.distance - covered,
            ray,
            source,
            receiver,
        };
        self.last = Some(eval);
        eval
    }

    /// Distance mismatch at `p`.
    pub fn zero(&mut self, p: f64) -> f64 {
        self.evaluate(p).zero
    }

    /// True if the ray at `p` traverses every leg of the current mode.
    pub fn is_valid(&mut self, p: f64) -> bool {
        self.evaluate(p).is_valid()
    }

    /// Travel time of the ray at `p` for the current mode.
    pub fn time(&self, p: f64) -> f64 {
        let model = &self.model;
        match self.mode {
            SearchMode::Turning => {
                2.0 * model.time_to_turn(p, p == self.p_top).value
                    - self.source.sign * model.time_to_radius(p, self.source.radius).value
                    - self.receiver.sign * model.time_to_radius(p, self.receiver.radius).value
            }
            SearchMode::Direct if self.both_below_surface() => {
                let (upper, lower) = self.upper_lower();
                model.time_between(p, upper, lower).value
            }
            SearchMode::Direct => (self.source.sign
                * model.time_to_radius(p, self.source.radius).value
                - self.receiver.sign * model.time_to_radius(p, self.receiver.radius).value)
                .abs(),
        }
    }

    /// Time corrected to first order for the residual distance mismatch:
    /// `time(p) + p·zero(p)`.
    pub fn corrected_time(&mut self, p: f64) -> f64 {
        self.time(p) + p * self.zero(p)
    }

    /// Distances and times of every leg at `p`, for reporting.
    pub fn legs(&self, p: f64) -> Legs {
        let model = &self.model;
        let leg = |d: RayIntegral, t: RayIntegral| LegValue {
            distance: d.value,
            time: t.value,
        };
        let source = leg(
            model.distance_to_radius(p, self.source.radius),
            model.time_to_radius(p, self.source.radius),
        );
        let receiver = leg(
            model.distance_to_radius(p, self.receiver.radius),
            model.time_to_radius(p, self.receiver.radius),
        );
        let ray = match self.mode {
            SearchMode::Turning => {
                let bottom_pass = p == self.p_top;
                leg(
                    model.distance_to_turn(p, bottom_pass),
                    model.time_to_turn(p, bottom_pass),
                )
            }
            SearchMode::Direct if self.both_below_surface() => {
                let (upper, lower) = self.upper_lower();
                leg(
                    model.distance_between(p, upper, lower),
                    model.time_between(p, upper, lower),
                )
            }
            SearchMode::Direct => LegValue {
                distance: (self.source.sign * source.distance - self.receiver.sign * receiver.distance).abs(),
                time: (self.source.sign * source.time - self.receiver.sign * receiver.time).abs(),
            },
        };
        Legs {
            ray,
            source,
            receiver,
        }
    }

    /// Direction of the direct ray: up-going when the receiver is shallower
    /// than the source.
    pub fn direct_ray_type(&self) -> RayType {
        if self.receiver.depth < self.source.depth {
            RayType::UpGoing
        } else {
            RayType::DownGoing
        }
    }

    /// Layer that names the direct ray: the source layer for up-going rays,
    /// the receiver layer for down-going ones.
    pub fn direct_layer_index(&self) -> usize {
        let r = match self.direct_ray_type() {
            RayType::UpGoing => self.source.radius,
            _ => self.receiver.radius,
        };
        self.model.radius_layer_index(r).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_model() -> Arc<VelocityModel> {
        let mut model = VelocityModel::new("c");
        model.append_constant(8.0, 6371.0, 6336.0).unwrap();
        Arc::new(model)
    }

    #[test]
    fn endpoint_above_surface_is_reflected() {
        let e = Endpoint::at_depth(-2.0, 6371.0);
        assert_eq!(e.radius, 6369.0);
        assert_eq!(e.sign, -1.0);
        let e = Endpoint::at_depth(10.0, 6371.0);
        assert_eq!(e.radius, 6361.0);
        assert_eq!(e.sign, 1.0);
    }

    #[test]
    fn turning_zero_for_surface_endpoints() {
        let mut f = RayZeroFunctional::new(constant_model());
        f.set_distance(0.2);
        let p = 794.0;
        let expected = 0.2 - 2.0 * (std::f64::consts::FRAC_PI_2 - (p / 796.375_f64).asin());
        assert!((f.zero(p) - expected).abs() < 1e-12);
        assert!(f.is_valid(p));
        // Above the branch top the ray is rejected.
        f.set_p_top(790.0);
        assert!(!f.is_valid(p));
    }

    #[test]
    fn evaluation_is_cached() {
        let mut f = RayZeroFunctional::new(constant_model());
        f.set_distance(0.1);
        let a = f.evaluate(793.0);
        let b = f.evaluate(793.0);
        assert_eq!(a, b);
        f.set_distance(0.2);
        assert!((f.zero(793.0) - a.zero - 0.1).abs() < 1e-15);
    }

    #[test]
    fn vertical_direct_ray_from_depth() {
        let mut f = RayZeroFunctional::new(constant_model());
        f.set_source_depth(20.0);
        f.set_mode(SearchMode::Direct);
        assert_eq!(f.zero(0.0), 0.0);
        assert!((f.time(0.0) - 2.5).abs() < 1e-12);
        assert_eq!(f.direct_ray_type(), RayType::UpGoing);
        assert_eq!(f.direct_layer_index(), 0);
    }

    #[test]
    fn turning_time_adds_residual_correction() {
        let mut f = RayZeroFunctional::new(constant_model());
        f.set_distance(0.2);
        let p = 794.0;
        let t = f.time(p);
        let expected = 2.0 * (796.375_f64.powi(2) - p * p).sqrt();
        assert!((t - expected).abs() < 1e-9);
        let corrected = f.corrected_time(p);
        assert!((corrected - (t + p * f.zero(p))).abs() < 1e-12);
    }

    #[test]
    fn min_ray_parameter_uses_deeper_endpoint() {
        let mut f = RayZeroFunctional::new(constant_model());
        f.set_source_depth(20.0);
        assert!((f.min_ray_parameter() - 6351.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn legs_split_the_direct_ray() {
        let mut f = RayZeroFunctional::new(constant_model());
        f.set_source_depth(20.0);
        f.set_receiver_depth(5.0);
        f.set_mode(SearchMode::Direct);
        let legs = f.legs(0.0);
        assert!((legs.ray.time - 15.0 / 8.0).abs() < 1e-12);
        assert!((legs.source.time - 20.0 / 8.0).abs() < 1e-12);
        assert!((legs.receiver.time - 5.0 / 8.0).abs() < 1e-12);
    }
}
