// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::sync::OnceLock;

use log::debug;

use crate::config::EARTH_RADIUS_KM;
use crate::error::{Result, TauPError};
use crate::limits::{LayerLimitAnalyzer, LayerLimits};
use crate::velocity::{LayerIntegral, RayState, VelocityLayer};

/// A whole-stack ray integral and whether the ray actually covers the
/// requested path.
///
/// The value is meaningful even when `valid` is false: it holds the partial
/// sum up to the layer that stopped the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntegral {
    /// One-way distance (radians) or travel time (s).
    pub value: f64,
    /// False if the ray cannot traverse the requested path.
    pub valid: bool,
}

impl RayIntegral {
    fn valid(value: f64) -> Self {
        RayIntegral { value, valid: true }
    }

    fn invalid(value: f64) -> Self {
        RayIntegral {
            value,
            valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Distance,
    Time,
}

/// An ordered, gapless stack of velocity layers from the surface down.
///
/// Layer classification is computed once on first use and cached; after that
/// the model is read-only and can be shared between solvers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct VelocityModel {
    name: String,
    planet_radius: f64,
    phase_type: String,
    layers: Vec<VelocityLayer>,
    limits: OnceLock<Vec<LayerLimits>>,
}

impl Default for VelocityModel {
    fn default() -> Self {
        VelocityModel::new("")
    }
}

impl VelocityModel {
    /// Create an empty model with the Earth's radius and phase type "P".
    pub fn new(name: impl Into<String>) -> Self {
        VelocityModel {
            name: name.into(),
            planet_radius: EARTH_RADIUS_KM,
            phase_type: "P".to_string(),
            layers: Vec::new(),
            limits: OnceLock::new(),
        }
    }

    /// Set the planet radius used to convert depths to radii.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidPlanetRadius`] unless the radius is
    /// positive and finite.
    pub fn with_planet_radius(mut self, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(TauPError::InvalidPlanetRadius(radius));
        }
        self.planet_radius = radius;
        Ok(self)
    }

    /// Set the phase type ("P" or "S") and stamp it onto every existing layer.
    pub fn with_phase_type(mut self, phase_type: impl Into<String>) -> Self {
        self.phase_type = phase_type.into();
        for layer in &mut self.layers {
            layer.set_phase_type(&self.phase_type);
        }
        self
    }

    /// Apply a quadrature tolerance to every layer and drop any cached
    /// classification.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidTolerance`] unless positive and finite.
    pub fn set_integration_tolerance(&mut self, tolerance: f64) -> Result<()> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(TauPError::InvalidTolerance(tolerance));
        }
        for layer in &mut self.layers {
            layer.set_integration_tolerance(tolerance);
        }
        self.limits = OnceLock::new();
        Ok(())
    }

    /// Append a layer below the current bottom of the stack.
    ///
    /// # Errors
    /// Returns [`TauPError::NonContiguousLayer`] if the layer's top radius
    /// differs from the current bottom radius.
    pub fn push_layer(&mut self, layer: VelocityLayer) -> Result<&mut VelocityLayer> {
        if let Some(prev) = self.layers.last() {
            if layer.r_top() != prev.r_bottom() {
                return Err(TauPError::NonContiguousLayer {
                    index: self.layers.len(),
                    top: layer.r_top(),
                    previous_bottom: prev.r_bottom(),
                });
            }
        }
        self.limits = OnceLock::new();
        let index = self.layers.len();
        self.layers.push(layer);
        Ok(&mut self.layers[index])
    }

    fn append(&mut self, layer: VelocityLayer) -> Result<&mut VelocityLayer> {
        let layer = layer.with_phase_type(self.phase_type.clone());
        self.push_layer(layer)
    }

    /// Append a constant-velocity layer.
    pub fn append_constant(&mut self, velocity: f64, r_top: f64, r_bottom: f64) -> Result<&mut VelocityLayer> {
        self.append(VelocityLayer::constant(velocity, r_top, r_bottom)?)
    }

    /// Append a power-law layer between two boundary velocities.
    pub fn append_power(
        &mut self,
        v_top: f64,
        v_bottom: f64,
        r_top: f64,
        r_bottom: f64,
    ) -> Result<&mut VelocityLayer> {
        self.append(VelocityLayer::power(v_top, v_bottom, r_top, r_bottom)?)
    }

    /// Append a linear layer. `norm_radius` defaults to 1 (coefficients in km).
    pub fn append_linear(
        &mut self,
        a0: f64,
        a1: f64,
        r_top: f64,
        r_bottom: f64,
        norm_radius: Option<f64>,
    ) -> Result<&mut VelocityLayer> {
        let n = norm_radius.unwrap_or(1.0);
        self.append(VelocityLayer::linear(a0, a1, r_top, r_bottom, n)?)
    }

    /// Append a quadratic layer. `norm_radius` defaults to 1.
    pub fn append_quadratic(
        &mut self,
        [a0, a1, a2]: [f64; 3],
        r_top: f64,
        r_bottom: f64,
        norm_radius: Option<f64>,
    ) -> Result<&mut VelocityLayer> {
        let n = norm_radius.unwrap_or(1.0);
        self.append(VelocityLayer::quadratic(a0, a1, a2, r_top, r_bottom, n)?)
    }

    /// Append a cubic layer. `norm_radius` defaults to 1.
    pub fn append_cubic(
        &mut self,
        [a0, a1, a2, a3]: [f64; 4],
        r_top: f64,
        r_bottom: f64,
        norm_radius: Option<f64>,
    ) -> Result<&mut VelocityLayer> {
        let n = norm_radius.unwrap_or(1.0);
        self.append(VelocityLayer::cubic(a0, a1, a2, a3, r_top, r_bottom, n)?)
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Planet radius in km.
    pub fn planet_radius(&self) -> f64 {
        self.planet_radius
    }

    /// Model phase type.
    pub fn phase_type(&self) -> &str {
        &self.phase_type
    }

    /// All layers, surface first.
    pub fn layers(&self) -> &[VelocityLayer] {
        &self.layers
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if the model has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer at `index`.
    ///
    /// # Errors
    /// Returns [`TauPError::LayerIndexOutOfRange`] past the end of the stack.
    pub fn layer(&self, index: usize) -> Result<&VelocityLayer> {
        self.layers.get(index).ok_or(TauPError::LayerIndexOutOfRange {
            index,
            len: self.layers.len(),
        })
    }

    /// Mutable layer at `index`, for attaching names after construction.
    pub fn layer_mut(&mut self, index: usize) -> Result<&mut VelocityLayer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or(TauPError::LayerIndexOutOfRange { index, len })
    }

    /// Classify every layer, computing it on first call.
    ///
    /// Call this before sharing the model between threads so that no solver
    /// pays for the analysis on its first query.
    pub fn classify(&self) -> &[LayerLimits] {
        self.limits.get_or_init(|| {
            let limits = LayerLimitAnalyzer::new(self).analyze();
            debug!(
                "classified {} layers of model '{}'",
                limits.len(),
                self.name
            );
            limits
        })
    }

    /// Cached classification of layer `index` (classifies on first use).
    pub fn limits(&self, index: usize) -> Option<&LayerLimits> {
        self.classify().get(index)
    }

    /// True once the classification has been computed or restored.
    pub fn is_classified(&self) -> bool {
        self.limits.get().is_some()
    }

    pub(crate) fn restore_limits(&mut self, limits: Vec<LayerLimits>) {
        self.limits = OnceLock::from(limits);
    }

    /// Index of the layer containing radius `r`.
    ///
    /// A radius on an interface belongs to the upper layer; a radius above
    /// the surface belongs to the first layer. Returns `None` below the stack.
    pub fn radius_layer_index(&self, r: f64) -> Option<usize> {
        self.layers.iter().position(|l| r >= l.r_bottom())
    }

    /// Smallest ray parameter of any ray that can still reach radius `r`.
    ///
    /// This is the minimum of the boundary ray parameters of every layer
    /// above `r`, the top ray parameter of the layer containing it, and
    /// `r / v(r)` there.
    pub fn min_ray_parameter(&self, r: f64) -> f64 {
        let Some(index) = self.radius_layer_index(r) else {
            return 0.0;
        };
        let layer = &self.layers[index];
        let r = r.min(layer.r_top());
        let mut p_min = layer.p_top().min(layer.p_at_radius(r));
        for above in &self.layers[..index] {
            p_min = p_min.min(above.p_top()).min(above.p_bottom());
        }
        p_min
    }

    /// One-way distance from the surface to the ray's turning point.
    ///
    /// With `bottom_pass`, a ray that turns exactly at a layer bottom is
    /// carried into the next layer, which matters at interfaces where the
    /// velocity drops.
    pub fn distance_to_turn(&self, p: f64, bottom_pass: bool) -> RayIntegral {
        self.integrate_to_turn(Quantity::Distance, p, bottom_pass)
    }

    /// One-way travel time from the surface to the ray's turning point.
    pub fn time_to_turn(&self, p: f64, bottom_pass: bool) -> RayIntegral {
        self.integrate_to_turn(Quantity::Time, p, bottom_pass)
    }

    /// One-way distance from the surface down to radius `r`.
    pub fn distance_to_radius(&self, p: f64, r: f64) -> RayIntegral {
        self.integrate_to_radius(Quantity::Distance, p, r)
    }

    /// One-way travel time from the surface down to radius `r`.
    pub fn time_to_radius(&self, p: f64, r: f64) -> RayIntegral {
        self.integrate_to_radius(Quantity::Time, p, r)
    }

    /// Distance of an up/down-going leg between two radii.
    pub fn distance_between(&self, p: f64, upper: f64, lower: f64) -> RayIntegral {
        self.integrate_between(Quantity::Distance, p, upper, lower)
    }

    /// Travel time of an up/down-going leg between two radii.
    pub fn time_between(&self, p: f64, upper: f64, lower: f64) -> RayIntegral {
        self.integrate_between(Quantity::Time, p, upper, lower)
    }

    fn layer_integral(layer: &VelocityLayer, q: Quantity, p: f64, floor: Option<f64>) -> LayerIntegral {
        match q {
            Quantity::Distance => layer.integrate_distance(p, floor),
            Quantity::Time => layer.integrate_time(p, floor),
        }
    }

    fn integrate_to_turn(&self, q: Quantity, p: f64, bottom_pass: bool) -> RayIntegral {
        if p < 0.0 {
            return RayIntegral::invalid(0.0);
        }
        if p == 0.0 && q == Quantity::Distance {
            return RayIntegral::valid(FRAC_PI_2);
        }

        let mut sum = 0.0;
        for layer in &self.layers {
            let li = Self::layer_integral(layer, q, p, None);
            match li.state {
                RayState::Invalid => {
                    return if layer.p_top() == p {
                        RayIntegral::valid(sum)
                    } else {
                        RayIntegral::invalid(sum)
                    };
                }
                RayState::Passing => sum += li.value,
                RayState::Turning { radius, .. } => {
                    sum += li.value;
                    if !(bottom_pass && radius == layer.r_bottom()) {
                        return RayIntegral::valid(sum);
                    }
                }
            }
        }
        RayIntegral::invalid(sum)
    }

    fn integrate_to_radius(&self, q: Quantity, p: f64, r: f64) -> RayIntegral {
        if p < 0.0 {
            return RayIntegral::invalid(0.0);
        }
        let mut sum = 0.0;
        for layer in self.layers.iter().take_while(|l| r < l.r_top()) {
            let li = Self::layer_integral(layer, q, p, Some(r));
            match li.state {
                RayState::Invalid => return RayIntegral::invalid(sum),
                RayState::Turning { radius, .. } if radius > r => {
                    return RayIntegral::invalid(sum + li.value)
                }
                _ => sum += li.value,
            }
        }
        RayIntegral::valid(sum)
    }

    fn integrate_between(&self, q: Quantity, p: f64, upper: f64, lower: f64) -> RayIntegral {
        if p < 0.0 {
            return RayIntegral::invalid(0.0);
        }
        let mut sum = 0.0;
        for layer in self
            .layers
            .iter()
            .filter(|l| l.r_bottom() < upper && l.r_top() > lower)
        {
            let li = match q {
                Quantity::Distance => layer.integrate_distance_between(p, upper, lower),
                Quantity::Time => layer.integrate_time_between(p, upper, lower),
            };
            match li.state {
                RayState::Passing => sum += li.value,
                _ => return RayIntegral::invalid(sum + li.value),
            }
        }
        RayIntegral::valid(sum)
    }
}

impl fmt::Display for VelocityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model '{}': {} layers, phase type {}, planet radius {} km",
            self.name,
            self.layers.len(),
            self.phase_type,
            self.planet_radius
        )?;
        let limits = self.limits.get();
        for (i, layer) in self.layers.iter().enumerate() {
            write!(f, "\n[{}] {}", i, layer)?;
            if let Some(lim) = limits.and_then(|l| l.get(i)) {
                write!(f, "\n{}", lim)?;
            }
        }
        Ok(())
    }
}
