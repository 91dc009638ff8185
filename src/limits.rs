// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! One-time classification of every layer in a model.
//!
//! For each layer the analyzer works out which part of the layer's ray
//! parameter range can actually be reached from the surface, the one-way
//! distance and its slope `dΔ/dp` at both ends of that range, and, when the
//! slopes disagree in sign, the critical ray parameter where the branch folds
//! back on itself.

use std::fmt;

use log::debug;

use crate::model::VelocityModel;
use crate::root_finder::{ExtremumKind, RootFinder};
use crate::velocity::{RayState, VelocityLayer};

const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Reachability of a layer from the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerClass {
    /// Rays can turn anywhere in the layer.
    Turning,
    /// The top of the layer is shadowed by a slower layer above.
    TopShadowBottomTurning,
    /// The bottom of the layer is shadowed.
    TopTurningBottomShadow,
    /// No surface ray turns in this layer.
    Shadow,
}

impl LayerClass {
    fn from_reach(top: bool, bottom: bool) -> Self {
        match (top, bottom) {
            (true, true) => LayerClass::Turning,
            (false, true) => LayerClass::TopShadowBottomTurning,
            (true, false) => LayerClass::TopTurningBottomShadow,
            (false, false) => LayerClass::Shadow,
        }
    }

    /// Integer code used in model buffers.
    pub fn code(self) -> i32 {
        match self {
            LayerClass::Turning => 0,
            LayerClass::TopShadowBottomTurning => 1,
            LayerClass::TopTurningBottomShadow => 2,
            LayerClass::Shadow => 3,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(LayerClass::Turning),
            1 => Some(LayerClass::TopShadowBottomTurning),
            2 => Some(LayerClass::TopTurningBottomShadow),
            3 => Some(LayerClass::Shadow),
            _ => None,
        }
    }
}

impl fmt::Display for LayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayerClass::Turning => "Turning",
            LayerClass::TopShadowBottomTurning => "Top Shadow / Bottom Turning",
            LayerClass::TopTurningBottomShadow => "Top Turning / Bottom Shadow",
            LayerClass::Shadow => "Shadow",
        };
        f.write_str(s)
    }
}

/// The fold of a retrograde branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalPoint {
    /// Ray parameter at the fold.
    pub p: f64,
    /// One-way surface-to-turning-point distance at the fold.
    pub distance: f64,
    /// Whether the fold is a distance minimum or maximum.
    pub kind: ExtremumKind,
    /// Turning radius of the critical ray.
    pub radius: f64,
    /// Velocity at that radius.
    pub velocity: f64,
}

/// Cached classification of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerLimits {
    /// Reachability class.
    pub class: LayerClass,
    /// Smallest ray parameter among all boundaries above this layer.
    pub p_min: f64,
    /// One-way distance at the effective top ray parameter.
    pub distance_top: f64,
    /// One-way distance at the effective bottom ray parameter.
    pub distance_bottom: f64,
    /// `dΔ/dp` at the effective top.
    pub slope_top: f64,
    /// `dΔ/dp` at the effective bottom.
    pub slope_bottom: f64,
    /// Fold of the branch for retrograde layers.
    pub critical: Option<CriticalPoint>,
}

impl LayerLimits {
    /// Effective `(p_top, p_bottom)` of the reachable branch, or `None` for
    /// a shadow layer.
    pub fn effective_range(&self, layer: &VelocityLayer) -> Option<(f64, f64)> {
        match self.class {
            LayerClass::Turning => Some((layer.p_top(), layer.p_bottom())),
            LayerClass::TopShadowBottomTurning => Some((self.p_min, layer.p_bottom())),
            LayerClass::TopTurningBottomShadow => Some((layer.p_top(), self.p_min)),
            LayerClass::Shadow => None,
        }
    }

    /// True if distance is non-monotonic in p within the layer.
    pub fn is_retrograde(&self) -> bool {
        self.critical.is_some()
    }
}

impl fmt::Display for LayerLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  Class: {}, pMin = {:.4} s/deg",
            self.class,
            self.p_min / RAD_TO_DEG
        )?;
        write!(
            f,
            "  Distance (deg)   {:>10.4}  {:>10.4}",
            2.0 * self.distance_top * RAD_TO_DEG,
            2.0 * self.distance_bottom * RAD_TO_DEG
        )?;
        if let Some(c) = &self.critical {
            let kind = match c.kind {
                ExtremumKind::Minimum => "minimum",
                ExtremumKind::Maximum => "maximum",
            };
            write!(
                f,
                "\n  Retrograde {} at p = {:.4} s/deg, distance {:.4} deg",
                kind,
                c.p / RAD_TO_DEG,
                2.0 * c.distance * RAD_TO_DEG
            )?;
        }
        Ok(())
    }
}

/// Computes [`LayerLimits`] for every layer of a model.
pub struct LayerLimitAnalyzer<'a> {
    model: &'a VelocityModel,
    finder: RootFinder,
}

impl<'a> LayerLimitAnalyzer<'a> {
    /// Create an analyzer over `model` using the default search tolerance.
    pub fn new(model: &'a VelocityModel) -> Self {
        LayerLimitAnalyzer {
            model,
            finder: RootFinder::default(),
        }
    }

    /// Classify all layers, surface first.
    pub fn analyze(&self) -> Vec<LayerLimits> {
        let layers = self.model.layers();
        let mut limits: Vec<LayerLimits> = Vec::with_capacity(layers.len());
        for (i, layer) in layers.iter().enumerate() {
            let p_min = match (i, limits.last()) {
                (0, _) | (_, None) => layer.p_top().max(layer.p_bottom()) + 1.0,
                (_, Some(prev)) => {
                    let above = &layers[i - 1];
                    prev.p_min.min(above.p_top()).min(above.p_bottom())
                }
            };
            let lim = self.analyze_layer(layer, p_min);
            debug!(
                "layer {}: {} pMin {:.4} retrograde {}",
                i,
                lim.class,
                lim.p_min,
                lim.is_retrograde()
            );
            limits.push(lim);
        }
        limits
    }

    fn distance(&self, p: f64) -> f64 {
        self.model.distance_to_turn(p, true).value
    }

    fn analyze_layer(&self, layer: &VelocityLayer, p_min: f64) -> LayerLimits {
        let pt = layer.p_top();
        let pb = layer.p_bottom();
        let dp = (0.1 * (pt - pb).abs()).min(1.0);
        let class = LayerClass::from_reach(pt <= p_min, pb <= p_min);

        let p_top = if pt <= p_min { pt } else { p_min };
        let p_bottom = if pb <= p_min { pb } else { p_min };
        let distance_top = self.distance(p_top);
        let distance_bottom = self.distance(p_bottom);

        if dp == 0.0 || class == LayerClass::Shadow {
            return LayerLimits {
                class,
                p_min,
                distance_top,
                distance_bottom,
                slope_top: 0.0,
                slope_bottom: 0.0,
                critical: None,
            };
        }

        // One-sided differences toward the layer interior.
        let slope_top = if pb < pt {
            (distance_top - self.distance(p_top - dp)) / dp
        } else {
            (self.distance(p_top + dp) - distance_top) / dp
        };
        let slope_bottom = if pb > pt {
            (distance_bottom - self.distance(p_bottom - dp)) / dp
        } else {
            (self.distance(p_bottom + dp) - distance_bottom) / dp
        };

        let mut critical = None;
        let lo = p_top.min(p_bottom) + dp;
        let hi = p_top.max(p_bottom) - dp;
        if slope_top * slope_bottom < 0.0 && lo < hi {
            let kind = if slope_top > 0.0 {
                ExtremumKind::Minimum
            } else {
                ExtremumKind::Maximum
            };
            let ext = self
                .finder
                .extremum_of(|p| self.distance(p), lo, 0.5 * (lo + hi), hi, kind);
            let (radius, velocity) = match layer.ray_state(ext.x) {
                RayState::Turning { radius, velocity } => (radius, velocity),
                _ => (-1.0, -1.0),
            };
            critical = Some(CriticalPoint {
                p: ext.x,
                distance: ext.value,
                kind,
                radius,
                velocity,
            });
        }

        LayerLimits {
            class,
            p_min,
            distance_top,
            distance_bottom,
            slope_top,
            slope_bottom,
            critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8 km/s lid over a layer whose gradient steepens with depth.
    fn folding_maximum() -> VelocityModel {
        let mut model = VelocityModel::new("max");
        model.append_constant(8.0, 6371.0, 6271.0).unwrap();
        model
            .append_quadratic([401.25441, -12.542, 0.1], 6271.0, 6171.0, Some(100.0))
            .unwrap();
        model
    }

    /// 8 km/s lid over a steep linear gradient (8 to 10 km/s).
    fn folding_minimum() -> VelocityModel {
        let mut model = VelocityModel::new("min");
        model.append_constant(8.0, 6371.0, 6271.0).unwrap();
        model
            .append_linear(133.42, -0.02, 6271.0, 6171.0, None)
            .unwrap();
        model
    }

    #[test]
    fn class_codes_round_trip() {
        for class in [
            LayerClass::Turning,
            LayerClass::TopShadowBottomTurning,
            LayerClass::TopTurningBottomShadow,
            LayerClass::Shadow,
        ] {
            assert_eq!(LayerClass::from_code(class.code()), Some(class));
        }
        assert_eq!(LayerClass::from_code(7), None);
    }

    #[test]
    fn single_constant_layer_is_turning() {
        let mut model = VelocityModel::new("c");
        model.append_constant(8.0, 6371.0, 6336.0).unwrap();
        let lim = &model.classify()[0];
        assert_eq!(lim.class, LayerClass::Turning);
        assert_eq!(lim.p_min, 797.375);
        assert!(lim.critical.is_none());
        // Distance grows as p decreases: negative slopes at both ends.
        assert!(lim.slope_top < 0.0 && lim.slope_bottom < 0.0);
        let expected_bottom = std::f64::consts::FRAC_PI_2 - (792.0_f64 / 796.375).asin();
        assert!((lim.distance_bottom - expected_bottom).abs() < 1e-12);
    }

    #[test]
    fn low_velocity_zone_is_shadowed() {
        let mut model = VelocityModel::new("lvz");
        model.append_constant(8.0, 6371.0, 6271.0).unwrap();
        model.append_constant(6.0, 6271.0, 6171.0).unwrap();
        model.append_power(7.7, 8.5, 6171.0, 6000.0).unwrap();
        let limits = model.classify();
        assert_eq!(limits[0].class, LayerClass::Turning);
        assert_eq!(limits[1].class, LayerClass::Shadow);
        assert_eq!(limits[2].class, LayerClass::TopShadowBottomTurning);
        assert!(limits[1].effective_range(&model.layers()[1]).is_none());

        let (pt, pb) = limits[2].effective_range(&model.layers()[2]).unwrap();
        assert_eq!(pt, 6271.0 / 8.0);
        assert_eq!(pb, model.layers()[2].p_bottom());
    }

    #[test]
    fn retrograde_maximum_is_located() {
        let model = folding_maximum();
        let layer = &model.layers()[1];
        let lim = &model.classify()[1];
        assert_eq!(lim.class, LayerClass::Turning);
        assert!(lim.slope_top < 0.0, "slope_top = {}", lim.slope_top);
        assert!(lim.slope_bottom > 0.0, "slope_bottom = {}", lim.slope_bottom);

        let crit = lim.critical.expect("layer should be retrograde");
        assert_eq!(crit.kind, ExtremumKind::Maximum);
        assert!(crit.p > layer.p_bottom() && crit.p < layer.p_top());
        assert!((crit.p - 780.39).abs() < 0.1, "p = {}", crit.p);
        assert!((crit.distance - 0.18225).abs() < 1e-4, "D = {}", crit.distance);
        for offset in [-1.0, 1.0] {
            let neighbour = model.distance_to_turn(crit.p + offset, true).value;
            assert!(neighbour < crit.distance);
        }
        assert!(crit.radius < layer.r_top() && crit.radius > layer.r_bottom());
    }

    #[test]
    fn retrograde_minimum_is_located() {
        let model = folding_minimum();
        let lim = &model.classify()[1];
        let crit = lim.critical.expect("layer should be retrograde");
        assert_eq!(crit.kind, ExtremumKind::Minimum);
        assert!(lim.slope_top > 0.0 && lim.slope_bottom < 0.0);
        for offset in [-1.0, 1.0] {
            let neighbour = model.distance_to_turn(crit.p + offset, true).value;
            assert!(neighbour > crit.distance);
        }
    }

    #[test]
    fn display_reports_fold() {
        let model = folding_maximum();
        let text = model.classify()[1].to_string();
        assert!(text.contains("Class: Turning"));
        assert!(text.contains("Retrograde maximum"));
    }
}
