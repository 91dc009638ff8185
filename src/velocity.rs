// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Velocity laws for a single spherical shell and the per-layer ray integrals.
//!
//! A ray with ray parameter `p` (s/rad) travelling through a radially
//! symmetric medium satisfies `p = r·sin(i)/v(r)`, so it turns where
//! `r/v(r) = p`. The one-way epicentral distance accumulated between two radii
//! is
//!
//! ```text
//!   Δ = ∫ p·v / (r·sqrt(r² − (p·v)²)) dr
//! ```
//!
//! and the travel time is `T = p·Δ + τ` with the tau integrand
//! `sqrt(r² − (p·v)²) / (r·v)`. The constant and power laws have closed forms
//! for both Δ and T; the linear law has a closed-form Δ and integrates τ
//! numerically; quadratic and cubic laws integrate both numerically.

use std::fmt;

use crate::config::CUBIC_INVERSION_TOLERANCE;
use crate::error::{Result, TauPError};
use crate::integrate::Integrator;
use crate::root_finder::RootFinder;

/// The velocity-versus-radius law of one layer.
///
/// Polynomial laws evaluate `v` at the normalized radius `r / norm_radius`;
/// a normalizing radius of 1 means the coefficients apply to `r` in km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VelocityLaw {
    /// `v(r) = velocity`.
    Constant {
        /// Velocity in km/s.
        velocity: f64,
    },
    /// `v(r) = v_top·(r/r_top)^exponent`.
    Power {
        /// Velocity at the layer top.
        v_top: f64,
        /// Velocity at the layer bottom.
        v_bottom: f64,
        /// `ln(v_bottom/v_top) / ln(r_bottom/r_top)`.
        exponent: f64,
    },
    /// `v(r) = a0 + a1·rn`.
    Linear {
        /// Constant term.
        a0: f64,
        /// Linear coefficient.
        a1: f64,
        /// Radius normalization.
        norm_radius: f64,
    },
    /// `v(r) = a0 + a1·rn + a2·rn²`.
    Quadratic {
        /// Constant term.
        a0: f64,
        /// Linear coefficient.
        a1: f64,
        /// Quadratic coefficient.
        a2: f64,
        /// Radius normalization.
        norm_radius: f64,
    },
    /// `v(r) = a0 + a1·rn + a2·rn² + a3·rn³`.
    Cubic {
        /// Constant term.
        a0: f64,
        /// Linear coefficient.
        a1: f64,
        /// Quadratic coefficient.
        a2: f64,
        /// Cubic coefficient.
        a3: f64,
        /// Radius normalization.
        norm_radius: f64,
    },
}

impl VelocityLaw {
    /// Tag used in model buffers and descriptions.
    pub fn name(&self) -> &'static str {
        match self {
            VelocityLaw::Constant { .. } => "Constant",
            VelocityLaw::Power { .. } => "Power",
            VelocityLaw::Linear { .. } => "Linear",
            VelocityLaw::Quadratic { .. } => "Quadratic",
            VelocityLaw::Cubic { .. } => "Cubic",
        }
    }

    /// True when the layer's time integral yields tau and `p·Δ` must be
    /// added to obtain travel time.
    pub fn is_time_integral_tau(&self) -> bool {
        !matches!(
            self,
            VelocityLaw::Constant { .. } | VelocityLaw::Power { .. }
        )
    }

    /// True when the distance integral has a closed form.
    pub fn has_closed_form_distance(&self) -> bool {
        matches!(
            self,
            VelocityLaw::Constant { .. } | VelocityLaw::Power { .. } | VelocityLaw::Linear { .. }
        )
    }
}

impl fmt::Display for VelocityLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            VelocityLaw::Constant { velocity } => {
                write!(f, "Constant (v = {:.4} km/s)", velocity)
            }
            VelocityLaw::Power {
                v_top,
                v_bottom,
                exponent,
            } => write!(
                f,
                "Power (v_top = {:.4}, v_bottom = {:.4}, B = {:.6})",
                v_top, v_bottom, exponent
            ),
            VelocityLaw::Linear {
                a0,
                a1,
                norm_radius,
            } => write!(
                f,
                "Linear (a0 = {:.4}, a1 = {:.4}, N = {})",
                a0, a1, norm_radius
            ),
            VelocityLaw::Quadratic {
                a0,
                a1,
                a2,
                norm_radius,
            } => write!(
                f,
                "Quadratic (a0 = {:.4}, a1 = {:.4}, a2 = {:.4}, N = {})",
                a0, a1, a2, norm_radius
            ),
            VelocityLaw::Cubic {
                a0,
                a1,
                a2,
                a3,
                norm_radius,
            } => write!(
                f,
                "Cubic (a0 = {:.4}, a1 = {:.4}, a2 = {:.4}, a3 = {:.4}, N = {})",
                a0, a1, a2, a3, norm_radius
            ),
        }
    }
}

/// How a trial ray parameter relates to one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayState {
    /// The ray cannot enter the layer (`p ≥ p_top`) or, for a between-radii
    /// leg, cannot reach either bound.
    Invalid,
    /// The ray crosses the whole interval without turning.
    Passing,
    /// The ray turns inside the interval.
    Turning {
        /// Turning radius in km.
        radius: f64,
        /// Velocity at the turning radius.
        velocity: f64,
    },
}

impl RayState {
    /// True unless the state is [`RayState::Invalid`].
    pub fn is_valid(&self) -> bool {
        !matches!(self, RayState::Invalid)
    }

    /// True for [`RayState::Turning`].
    pub fn is_turning(&self) -> bool {
        matches!(self, RayState::Turning { .. })
    }
}

/// A layer integral together with the ray state that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerIntegral {
    /// One-way distance (radians) or travel time (s).
    pub value: f64,
    /// Classification of the ray against the integrated interval.
    pub state: RayState,
}

impl LayerIntegral {
    fn invalid() -> Self {
        LayerIntegral {
            value: 0.0,
            state: RayState::Invalid,
        }
    }
}

/// Optional phase names attached to a layer.
///
/// A `Some` diffracted name also enables that diffracted arrival; the name
/// itself may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseNames {
    /// Name of rays turning in the layer.
    pub primary: Option<String>,
    /// Name of the upper branch of a retrograde layer.
    pub upper: Option<String>,
    /// Name of the lower branch of a retrograde layer.
    pub lower: Option<String>,
    /// Ray diffracted along the layer bottom at the layer's bottom velocity.
    pub diffracted_upper: Option<String>,
    /// Ray diffracted along the same interface at the next layer's top velocity.
    pub diffracted_lower: Option<String>,
}

/// One spherical shell of a velocity model.
///
/// The layer caches its boundary velocities and ray parameters so the hot
/// path never re-evaluates them.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityLayer {
    law: VelocityLaw,
    name: String,
    phase_type: String,
    phases: PhaseNames,
    r_top: f64,
    r_bottom: f64,
    v_top: f64,
    v_bottom: f64,
    p_top: f64,
    p_bottom: f64,
    integrator: Integrator,
}

impl VelocityLayer {
    /// Build a layer from a law and its radial extent.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidLayerRadii`] if the radii are not finite,
    /// negative, or inverted, and [`TauPError::InvalidVelocity`] if the law
    /// is not positive and finite at both boundaries.
    pub fn from_law(law: VelocityLaw, r_top: f64, r_bottom: f64) -> Result<Self> {
        if !r_top.is_finite() || !r_bottom.is_finite() || r_bottom < 0.0 || r_top < r_bottom || r_top <= 0.0
        {
            return Err(TauPError::InvalidLayerRadii {
                top: r_top,
                bottom: r_bottom,
            });
        }

        let mut layer = VelocityLayer {
            law,
            name: String::new(),
            phase_type: "P".to_string(),
            phases: PhaseNames::default(),
            r_top,
            r_bottom,
            v_top: 0.0,
            v_bottom: 0.0,
            p_top: 0.0,
            p_bottom: 0.0,
            integrator: Integrator::default(),
        };

        for r in [r_top, r_bottom] {
            let v = layer.velocity(r);
            if !v.is_finite() || v <= 0.0 {
                return Err(TauPError::InvalidVelocity {
                    radius: r,
                    value: v,
                });
            }
        }

        layer.v_top = layer.velocity(r_top);
        layer.v_bottom = layer.velocity(r_bottom);
        layer.p_top = r_top / layer.v_top;
        layer.p_bottom = r_bottom / layer.v_bottom;
        Ok(layer)
    }

    /// Constant-velocity layer.
    pub fn constant(velocity: f64, r_top: f64, r_bottom: f64) -> Result<Self> {
        Self::from_law(VelocityLaw::Constant { velocity }, r_top, r_bottom)
    }

    /// Power-law layer interpolating `v_top` at `r_top` to `v_bottom` at
    /// `r_bottom`.
    pub fn power(v_top: f64, v_bottom: f64, r_top: f64, r_bottom: f64) -> Result<Self> {
        let log_ratio = (r_bottom / r_top).ln();
        let exponent = if log_ratio == 0.0 || !log_ratio.is_finite() {
            0.0
        } else {
            (v_bottom / v_top).ln() / log_ratio
        };
        Self::from_law(
            VelocityLaw::Power {
                v_top,
                v_bottom,
                exponent,
            },
            r_top,
            r_bottom,
        )
    }

    /// Linear layer `a0 + a1·(r/norm_radius)`.
    pub fn linear(a0: f64, a1: f64, r_top: f64, r_bottom: f64, norm_radius: f64) -> Result<Self> {
        Self::from_law(
            VelocityLaw::Linear {
                a0,
                a1,
                norm_radius,
            },
            r_top,
            r_bottom,
        )
    }

    /// Quadratic layer in `r/norm_radius`.
    pub fn quadratic(
        a0: f64,
        a1: f64,
        a2: f64,
        r_top: f64,
        r_bottom: f64,
        norm_radius: f64,
    ) -> Result<Self> {
        Self::from_law(
            VelocityLaw::Quadratic {
                a0,
                a1,
                a2,
                norm_radius,
            },
            r_top,
            r_bottom,
        )
    }

    /// Cubic layer in `r/norm_radius`.
    #[allow(clippy::too_many_arguments)]
    pub fn cubic(
        a0: f64,
        a1: f64,
        a2: f64,
        a3: f64,
        r_top: f64,
        r_bottom: f64,
        norm_radius: f64,
    ) -> Result<Self> {
        Self::from_law(
            VelocityLaw::Cubic {
                a0,
                a1,
                a2,
                a3,
                norm_radius,
            },
            r_top,
            r_bottom,
        )
    }

    /// Set the layer name (builder method).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the phase type, "P" or "S" (builder method).
    pub fn with_phase_type(mut self, phase_type: impl Into<String>) -> Self {
        self.phase_type = phase_type.into();
        self
    }

    /// Attach phase names (builder method).
    pub fn with_phase_names(mut self, phases: PhaseNames) -> Self {
        self.phases = phases;
        self
    }

    /// Set the quadrature tolerance for numeric integrals (builder method).
    pub fn with_integration_tolerance(mut self, tolerance: f64) -> Self {
        self.integrator = Integrator::new(tolerance);
        self
    }

    pub(crate) fn set_phase_type(&mut self, phase_type: &str) {
        self.phase_type.clear();
        self.phase_type.push_str(phase_type);
    }

    pub(crate) fn set_integration_tolerance(&mut self, tolerance: f64) {
        self.integrator = Integrator::new(tolerance);
    }

    /// The velocity law.
    pub fn law(&self) -> &VelocityLaw {
        &self.law
    }

    /// Layer name (may be empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Phase type used for default phase names.
    pub fn phase_type(&self) -> &str {
        &self.phase_type
    }

    /// Phase names attached to the layer.
    pub fn phase_names(&self) -> &PhaseNames {
        &self.phases
    }

    /// Mutable access to the phase names.
    pub fn phase_names_mut(&mut self) -> &mut PhaseNames {
        &mut self.phases
    }

    /// Top radius (km).
    pub fn r_top(&self) -> f64 {
        self.r_top
    }

    /// Bottom radius (km).
    pub fn r_bottom(&self) -> f64 {
        self.r_bottom
    }

    /// Velocity at the top radius.
    pub fn v_top(&self) -> f64 {
        self.v_top
    }

    /// Velocity at the bottom radius.
    pub fn v_bottom(&self) -> f64 {
        self.v_bottom
    }

    /// Ray parameter of a ray turning at the top radius.
    pub fn p_top(&self) -> f64 {
        self.p_top
    }

    /// Ray parameter of a ray turning at the bottom radius.
    pub fn p_bottom(&self) -> f64 {
        self.p_bottom
    }

    /// Quadrature engine used by the numeric laws.
    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    /// True if `r` lies within `[r_bottom, r_top]`.
    pub fn contains_radius(&self, r: f64) -> bool {
        r <= self.r_top && r >= self.r_bottom
    }

    /// Velocity at radius `r` (km/s). Valid for `r_bottom ≤ r ≤ r_top`.
    pub fn velocity(&self, r: f64) -> f64 {
        match self.law {
            VelocityLaw::Constant { velocity } => velocity,
            VelocityLaw::Power {
                v_top, exponent, ..
            } => v_top * (r / self.r_top).powf(exponent),
            VelocityLaw::Linear {
                a0,
                a1,
                norm_radius,
            } => a1 * (r / norm_radius) + a0,
            VelocityLaw::Quadratic {
                a0,
                a1,
                a2,
                norm_radius,
            } => {
                let rn = r / norm_radius;
                a0 + rn * (a1 + rn * a2)
            }
            VelocityLaw::Cubic {
                a0,
                a1,
                a2,
                a3,
                norm_radius,
            } => {
                let rn = r / norm_radius;
                a0 + rn * (a1 + rn * (a2 + rn * a3))
            }
        }
    }

    /// Ray parameter of a ray turning at radius `r`: `r / v(r)`.
    pub fn p_at_radius(&self, r: f64) -> f64 {
        r / self.velocity(r)
    }

    /// Turning radius of a ray with parameter `p` (inverse of
    /// [`p_at_radius`](Self::p_at_radius) inside the layer).
    pub fn radius_at_p(&self, p: f64) -> f64 {
        match self.law {
            VelocityLaw::Constant { velocity } => p * velocity,
            VelocityLaw::Power {
                v_top, exponent, ..
            } => (p * v_top * self.r_top.powf(-exponent)).powf(1.0 / (1.0 - exponent)),
            VelocityLaw::Linear {
                a0,
                a1,
                norm_radius,
            } => p * a0 / (1.0 - p * a1 / norm_radius),
            VelocityLaw::Quadratic {
                a0,
                a1,
                a2,
                norm_radius,
            } => self.quadratic_radius_at_p(p, a0, a1, a2, norm_radius),
            VelocityLaw::Cubic { .. } => RootFinder::new(CUBIC_INVERSION_TOLERANCE)
                .zero_of(|r| r - p * self.velocity(r), self.r_top, self.r_bottom),
        }
    }

    fn quadratic_radius_at_p(&self, p: f64, a0: f64, a1: f64, a2: f64, n: f64) -> f64 {
        if p == 0.0 {
            return 0.0;
        }
        // p·v(r) = r  →  a·r² + b·r + c = 0
        let a = p * a2 / n / n;
        let b = p * a1 / n - 1.0;
        let c = p * a0;
        if a == 0.0 {
            return -c / b;
        }
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            0.0
        } else if disc == 0.0 {
            -b / (2.0 * a)
        } else {
            let centre = -b / (2.0 * a);
            let half = disc.sqrt() / (2.0 * a);
            let r1 = centre - half;
            if r1 <= self.r_top && r1 >= self.r_bottom {
                r1
            } else {
                centre + half
            }
        }
    }

    /// The elementary distance integrand `p·v / (r·sqrt(r² − (p·v)²))`.
    ///
    /// At an exact turning point the radicand vanishes; the integrand is then
    /// replaced by a large finite value so open quadrature can start there.
    pub fn distance_integrand(&self, p: f64, r: f64) -> f64 {
        let pv = p * self.velocity(r);
        let d = (r - pv).abs() * (r + pv);
        if d == 0.0 {
            1.0 / (f64::EPSILON * (r + pv)).sqrt()
        } else {
            pv / r / d.sqrt()
        }
    }

    /// The tau integrand `sqrt(r² − (p·v)²) / (r·v)`.
    pub fn tau_integrand(&self, p: f64, r: f64) -> f64 {
        let v = self.velocity(r);
        let pv = p * v;
        ((r - pv).abs() * (r + pv)).sqrt() / r / v
    }

    /// Classify a ray against the whole layer.
    pub fn ray_state(&self, p: f64) -> RayState {
        if p >= self.p_top {
            RayState::Invalid
        } else if p < self.p_bottom {
            RayState::Passing
        } else if p == self.p_bottom {
            RayState::Turning {
                radius: self.r_bottom,
                velocity: self.v_bottom,
            }
        } else {
            let radius = self.radius_at_p(p);
            RayState::Turning {
                radius,
                velocity: self.velocity(radius),
            }
        }
    }

    /// One-way distance from the layer top down to the turning radius, the
    /// layer bottom, or `floor` if it lies above the turning radius.
    pub fn integrate_distance(&self, p: f64, floor: Option<f64>) -> LayerIntegral {
        match self.descent(p, floor) {
            None => LayerIntegral::invalid(),
            Some((bottom, open, state)) => LayerIntegral {
                value: self.distance_segment(p, bottom, self.r_top, open),
                state,
            },
        }
    }

    /// One-way travel time over the same interval as
    /// [`integrate_distance`](Self::integrate_distance).
    pub fn integrate_time(&self, p: f64, floor: Option<f64>) -> LayerIntegral {
        match self.descent(p, floor) {
            None => LayerIntegral::invalid(),
            Some((bottom, open, state)) => {
                let mut value = self.time_segment(p, bottom, self.r_top);
                if self.law.is_time_integral_tau() {
                    value += p * self.distance_segment(p, bottom, self.r_top, open);
                }
                LayerIntegral { value, state }
            }
        }
    }

    /// One-way distance of an up/down-going leg between radii `upper` and
    /// `lower`, clipped to the layer.
    ///
    /// The state is `Passing` when the ray crosses the clipped interval,
    /// `Turning` when it turns inside it (the value then runs to the turning
    /// radius) and `Invalid` when the interval misses the layer or the ray
    /// cannot enter it.
    pub fn integrate_distance_between(&self, p: f64, upper: f64, lower: f64) -> LayerIntegral {
        match self.clip(p, upper, lower) {
            None => LayerIntegral::invalid(),
            Some((top, bottom, state, open)) => LayerIntegral {
                value: self.distance_segment(p, bottom, top, open),
                state,
            },
        }
    }

    /// Travel time over the same interval as
    /// [`integrate_distance_between`](Self::integrate_distance_between).
    pub fn integrate_time_between(&self, p: f64, upper: f64, lower: f64) -> LayerIntegral {
        match self.clip(p, upper, lower) {
            None => LayerIntegral::invalid(),
            Some((top, bottom, state, open)) => {
                let mut value = self.time_segment(p, bottom, top);
                if self.law.is_time_integral_tau() {
                    value += p * self.distance_segment(p, bottom, top, open);
                }
                LayerIntegral { value, state }
            }
        }
    }

    fn descent(&self, p: f64, floor: Option<f64>) -> Option<(f64, bool, RayState)> {
        let state = self.ray_state(p);
        let (bottom, open) = match state {
            RayState::Invalid => return None,
            RayState::Passing => (self.r_bottom, false),
            RayState::Turning { radius, .. } => (radius, true),
        };
        match floor {
            Some(r) if r > bottom => Some((r, false, state)),
            _ => Some((bottom, open, state)),
        }
    }

    /// Clip `[lower, upper]` to the layer and find where the ray leaves it.
    /// The flag is set when the lower end is a turning point.
    fn clip(&self, p: f64, upper: f64, lower: f64) -> Option<(f64, f64, RayState, bool)> {
        if !(lower < self.r_top && upper > self.r_bottom) {
            return None;
        }
        let top = upper.min(self.r_top);
        let bottom = lower.max(self.r_bottom);
        let p_top = self.p_at_radius(top);
        let p_bottom = self.p_at_radius(bottom);
        let (p_lo, p_hi) = if p_top < p_bottom {
            (p_top, p_bottom)
        } else {
            (p_bottom, p_top)
        };

        if p <= p_lo {
            Some((top, bottom, RayState::Passing, p == p_bottom))
        } else if p < p_hi {
            let radius = self.radius_at_p(p);
            let state = RayState::Turning {
                radius,
                velocity: self.velocity(radius),
            };
            Some((top, radius, state, true))
        } else {
            None
        }
    }

    /// Distance integral from `lower` up to `upper` (`lower ≤ upper`).
    fn distance_segment(&self, p: f64, lower: f64, upper: f64, open: bool) -> f64 {
        match self.law {
            VelocityLaw::Constant { velocity } => {
                let pv = p * velocity;
                (pv / lower).min(1.0).asin() - (pv / upper).min(1.0).asin()
            }
            VelocityLaw::Power { exponent, .. } => {
                let pvl = p * self.velocity(lower);
                let pvu = p * self.velocity(upper);
                ((pvl / lower).min(1.0).asin() - (pvu / upper).min(1.0).asin()) / (1.0 - exponent)
            }
            VelocityLaw::Linear {
                a0,
                a1,
                norm_radius,
            } => linear_distance(p, a0, a1 / norm_radius, lower, upper),
            VelocityLaw::Quadratic { .. } | VelocityLaw::Cubic { .. } => {
                let f = |r: f64| self.distance_integrand(p, r);
                if open {
                    self.integrator.integrate_open_lower(f, lower, upper).value
                } else {
                    self.integrator.integrate_closed(f, lower, upper).value
                }
            }
        }
    }

    /// Time (constant and power laws) or tau (other laws) from `lower` up to
    /// `upper`.
    fn time_segment(&self, p: f64, lower: f64, upper: f64) -> f64 {
        match self.law {
            VelocityLaw::Constant { .. } => {
                eta_root(upper / self.velocity(upper), p) - eta_root(lower / self.velocity(lower), p)
            }
            VelocityLaw::Power { exponent, .. } => {
                (eta_root(self.p_at_radius(upper), p) - eta_root(self.p_at_radius(lower), p))
                    / (1.0 - exponent)
            }
            _ => {
                let f = |r: f64| self.tau_integrand(p, r);
                if lower == 0.0 {
                    self.integrator.integrate_open_lower(f, lower, upper).value
                } else {
                    self.integrator.integrate_closed(f, lower, upper).value
                }
            }
        }
    }
}

/// `sqrt(|η − p|·(η + p))`, the closed-form time antiderivative in η = r/v.
fn eta_root(eta: f64, p: f64) -> f64 {
    ((eta - p).abs() * (eta + p)).sqrt()
}

/// Closed-form distance for `v = a0 + v1·r` between `lower` and `upper`.
///
/// Three cases on `c = 1 − (p·v1)²`: arcsine for `c < 0`, square root for
/// `c = 0`, logarithm for `c > 0`.
fn linear_distance(p: f64, a0: f64, v1: f64, lower: f64, upper: f64) -> f64 {
    let asin_clamped = |x: f64| if x >= 1.0 { std::f64::consts::FRAC_PI_2 } else { x.asin() };

    let mut result = asin_clamped(p * (a0 + v1 * lower) / lower) - asin_clamped(p * (a0 + v1 * upper) / upper);

    let pv0 = p * a0;
    let pv1 = p * v1;
    let c = 1.0 - pv1 * pv1;
    if c < 0.0 {
        let b = -pv0 * pv1;
        let arg = (c * lower + b) / pv0;
        result += pv1 * (asin_clamped(arg) - ((c * upper + b) / pv0).asin()) / (-c).sqrt();
    } else if c == 0.0 {
        result += (-2.0 * v1 * lower / a0 - 1.0).sqrt() - (-2.0 * v1 * upper / a0 - 1.0).sqrt();
    } else {
        let b = -2.0 * pv0 * pv1;
        let a = -pv0 * pv0;
        let sc = c.sqrt();
        let q_upper = a + upper * (b + c * upper);
        let q_lower = a + lower * (b + c * lower);
        result += pv1
            * ((2.0 * sc * q_upper.abs().sqrt() + 2.0 * c * upper + b).ln()
                - (2.0 * sc * q_lower.abs().sqrt() + 2.0 * c * lower + b).ln())
            / sc;
    }
    result
}

impl fmt::Display for VelocityLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let to_deg = std::f64::consts::PI / 180.0;
        writeln!(f, "Layer '{}' [{}] {}", self.name, self.phase_type, self.law)?;
        writeln!(f, "                    Top      Bottom")?;
        writeln!(
            f,
            "  Radius (km)      {:>10.4}  {:>10.4}",
            self.r_top, self.r_bottom
        )?;
        writeln!(
            f,
            "  Velocity (km/s)  {:>10.4}  {:>10.4}",
            self.v_top, self.v_bottom
        )?;
        write!(
            f,
            "  Slowness (s/deg) {:>10.4}  {:>10.4}",
            self.p_top * to_deg,
            self.p_bottom * to_deg
        )?;
        let names = [
            ("Phase", &self.phases.primary),
            ("Upper branch", &self.phases.upper),
            ("Lower branch", &self.phases.lower),
            ("Diffracted (upper)", &self.phases.diffracted_upper),
            ("Diffracted (lower)", &self.phases.diffracted_lower),
        ];
        for (label, name) in names {
            if let Some(name) = name {
                write!(f, "\n  {:<17}= {}", label, name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crust() -> VelocityLayer {
        VelocityLayer::constant(8.0, 6371.0, 6336.0).unwrap()
    }

    /// 8 km/s at 6271 km rising linearly to 10 km/s at 6171 km.
    fn gradient() -> VelocityLayer {
        VelocityLayer::linear(133.42, -0.02, 6271.0, 6171.0, 1.0).unwrap()
    }

    fn all_laws() -> Vec<VelocityLayer> {
        vec![
            crust(),
            VelocityLayer::power(8.0, 8.5, 6371.0, 6000.0).unwrap(),
            gradient(),
            VelocityLayer::quadratic(30.0, -40.0, 18.0, 6371.0, 6052.45, 6371.0).unwrap(),
            VelocityLayer::cubic(29.0, -40.0, 18.0, 1.0, 6371.0, 6052.45, 6371.0).unwrap(),
        ]
    }

    #[test]
    fn constant_layer_caches_boundaries() {
        let layer = crust();
        assert_eq!(layer.v_top(), 8.0);
        assert_eq!(layer.v_bottom(), 8.0);
        assert!((layer.p_top() - 796.375).abs() < 1e-12);
        assert!((layer.p_bottom() - 792.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_inverted_radii() {
        let err = VelocityLayer::constant(8.0, 6000.0, 6371.0).unwrap_err();
        assert!(matches!(err, TauPError::InvalidLayerRadii { .. }));
    }

    #[test]
    fn rejects_non_positive_velocity() {
        let err = VelocityLayer::linear(1.0, -1.0, 6371.0, 6000.0, 6371.0).unwrap_err();
        assert!(matches!(err, TauPError::InvalidVelocity { .. }));
    }

    #[test]
    fn power_law_hits_both_boundary_velocities() {
        let layer = VelocityLayer::power(8.0, 8.5, 6371.0, 6000.0).unwrap();
        assert!((layer.v_top() - 8.0).abs() < 1e-12);
        assert!((layer.v_bottom() - 8.5).abs() < 1e-9);
    }

    #[test]
    fn radius_at_p_round_trips_for_every_law() {
        for layer in all_laws() {
            let (lo, hi) = (layer.p_bottom().min(layer.p_top()), layer.p_bottom().max(layer.p_top()));
            for k in 1..10 {
                let p = lo + (hi - lo) * k as f64 / 10.0;
                let r = layer.radius_at_p(p);
                let back = layer.p_at_radius(r);
                assert!(
                    (back - p).abs() < 1e-6,
                    "{}: p {} -> r {} -> p {}",
                    layer.law().name(),
                    p,
                    r,
                    back
                );
            }
        }
    }

    #[test]
    fn ray_state_classification() {
        let layer = crust();
        assert_eq!(layer.ray_state(796.375), RayState::Invalid);
        assert_eq!(layer.ray_state(800.0), RayState::Invalid);
        assert_eq!(layer.ray_state(700.0), RayState::Passing);
        assert_eq!(
            layer.ray_state(792.0),
            RayState::Turning {
                radius: 6336.0,
                velocity: 8.0
            }
        );
        match layer.ray_state(794.0) {
            RayState::Turning { radius, .. } => assert!((radius - 6352.0).abs() < 1e-9),
            other => panic!("expected turning ray, got {:?}", other),
        }
    }

    #[test]
    fn constant_distance_matches_closed_form_and_quadrature() {
        let layer = crust();
        let integ = Integrator::new(1e-10);
        for p in [500.0, 700.0, 791.0] {
            let got = layer.integrate_distance(p, None);
            assert_eq!(got.state, RayState::Passing);
            let expected = (p * 8.0 / 6336.0).asin() - (p * 8.0 / 6371.0).asin();
            assert!((got.value - expected).abs() < 1e-14);
            let numeric = integ
                .integrate_closed(|r| layer.distance_integrand(p, r), 6336.0, 6371.0)
                .value;
            assert!(
                (got.value - numeric).abs() < 1e-6,
                "p {}: closed {} numeric {}",
                p,
                got.value,
                numeric
            );
        }
    }

    #[test]
    fn constant_turning_time_is_closed_form() {
        let layer = crust();
        let p = 794.0;
        let t = layer.integrate_time(p, None);
        let eta = 796.375_f64;
        assert!((t.value - (eta * eta - p * p).sqrt()).abs() < 1e-9);
        let d = layer.integrate_distance(p, None);
        assert!((d.value - (std::f64::consts::FRAC_PI_2 - (p / eta).asin())).abs() < 1e-12);
    }

    #[test]
    fn floor_above_turning_point_stops_integration() {
        let layer = crust();
        let p = 794.0;
        let full = layer.integrate_distance(p, None).value;
        let part = layer.integrate_distance(p, Some(6360.0));
        assert!(part.state.is_turning());
        assert!(part.value < full);
        let expected = (p * 8.0 / 6360.0).asin() - (p * 8.0 / 6371.0).asin();
        assert!((part.value - expected).abs() < 1e-14);
        // A floor below the turning radius has no effect.
        let below = layer.integrate_distance(p, Some(6340.0)).value;
        assert_eq!(below, full);
    }

    #[test]
    fn linear_closed_form_matches_quadrature() {
        let layer = gradient();
        let integ = Integrator::new(1e-9);
        for p in [600.0, 700.0, 750.0, 780.0] {
            let got = layer.integrate_distance(p, None);
            let numeric = match got.state {
                RayState::Turning { radius, .. } => integ
                    .integrate_open_lower(|r| layer.distance_integrand(p, r), radius, 6271.0)
                    .value,
                RayState::Passing => integ
                    .integrate_closed(|r| layer.distance_integrand(p, r), 6171.0, 6271.0)
                    .value,
                RayState::Invalid => panic!("p {} should enter the layer", p),
            };
            assert!(
                (got.value - numeric).abs() < 1e-6,
                "p {}: closed {} numeric {}",
                p,
                got.value,
                numeric
            );
        }
    }

    #[test]
    fn power_closed_form_matches_quadrature() {
        let layer = VelocityLayer::power(8.0, 8.5, 6371.0, 6000.0).unwrap();
        let integ = Integrator::new(1e-9);
        let p = 600.0;
        let got = layer.integrate_distance(p, None);
        assert_eq!(got.state, RayState::Passing);
        let numeric = integ
            .integrate_closed(|r| layer.distance_integrand(p, r), 6000.0, 6371.0)
            .value;
        assert!((got.value - numeric).abs() < 1e-6, "{} vs {}", got.value, numeric);
    }

    #[test]
    fn tau_law_time_adds_p_times_distance() {
        // For a passing ray the linear law's time must equal the direct
        // time integral r / (v² sqrt(r²/v² - p²)).
        let layer = gradient();
        let p = 500.0;
        let t = layer.integrate_time(p, None);
        let direct = Integrator::new(1e-10)
            .integrate_closed(
                |r| {
                    let v = layer.velocity(r);
                    let eta = r / v;
                    eta * eta / (r * (eta * eta - p * p).sqrt())
                },
                6171.0,
                6271.0,
            )
            .value;
        assert!((t.value - direct).abs() < 1e-5, "{} vs {}", t.value, direct);
    }

    #[test]
    fn quadratic_and_cubic_turning_distance_is_positive_and_bounded() {
        for layer in all_laws().into_iter().skip(3) {
            let p = 0.5 * (layer.p_top() + layer.p_bottom());
            let d = layer.integrate_distance(p, None);
            assert!(d.state.is_turning(), "{} should turn", layer.law().name());
            assert!(d.value > 0.0 && d.value < 0.5, "{}: {}", layer.law().name(), d.value);
        }
    }

    #[test]
    fn between_radii_passing_leg_matches_difference_of_descents() {
        let layer = crust();
        let p = 700.0;
        let leg = layer.integrate_distance_between(p, 6365.0, 6345.0);
        assert_eq!(leg.state, RayState::Passing);
        let d1 = layer.integrate_distance(p, Some(6345.0)).value;
        let d2 = layer.integrate_distance(p, Some(6365.0)).value;
        assert!((leg.value - (d1 - d2)).abs() < 1e-12);
    }

    #[test]
    fn between_radii_turning_and_missing_layer() {
        let layer = crust();
        // Turns at 6352 km, between 6365 and 6340.
        let leg = layer.integrate_distance_between(794.0, 6365.0, 6340.0);
        assert!(leg.state.is_turning());
        // Interval entirely below the layer.
        let miss = layer.integrate_distance_between(700.0, 6300.0, 6200.0);
        assert_eq!(miss.state, RayState::Invalid);
        assert_eq!(miss.value, 0.0);
    }

    #[test]
    fn law_flags() {
        assert!(!VelocityLaw::Constant { velocity: 1.0 }.is_time_integral_tau());
        assert!(VelocityLaw::Linear {
            a0: 1.0,
            a1: 0.0,
            norm_radius: 1.0
        }
        .is_time_integral_tau());
        assert!(!VelocityLaw::Cubic {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            norm_radius: 1.0
        }
        .has_closed_form_distance());
    }

    #[test]
    fn display_mentions_law_and_names() {
        let mut layer = crust().with_name("upper crust");
        layer.phase_names_mut().primary = Some("Pg".to_string());
        let text = layer.to_string();
        assert!(text.contains("upper crust"));
        assert!(text.contains("Constant (v = 8.0000 km/s)"));
        assert!(text.contains("Pg"));
    }
}
