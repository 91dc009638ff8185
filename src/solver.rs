// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Branch search over a classified model.
//!
//! For a source at (distance, depth) the solver first tries the direct ray,
//! then walks every reachable layer looking for turning rays whose distance
//! matches the target, splitting retrograde layers at their fold. Diffracted
//! arrivals are added along interfaces that carry a diffracted phase name.

use std::sync::Arc;

use log::debug;

use crate::config::SolverConfig;
use crate::derivatives::{BranchSpec, DerivativeEvaluator};
use crate::error::{Result, TauPError};
use crate::functional::{Endpoint, LegValue, RayZeroFunctional, SearchMode};
use crate::model::VelocityModel;
use crate::result::{Branch, Derivatives, RayType, ResultArena, TravelTimeResult};
use crate::root_finder::{ExtremumKind, RootFinder};
use crate::velocity::RayState;

/// Offset of the first fallback trial point into a retrograde upper half.
const TRIAL_OFFSET: f64 = 1.0e-4;

/// Largest top residual for which a tangent retrograde apex is searched.
const TANGENT_RESIDUAL: f64 = 1.0e-3;

/// Tolerance of the tangent-apex extremum search.
const TANGENT_TOLERANCE: f64 = 1.0e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
struct QueryKey {
    distance: f64,
    depth: f64,
    derivatives: bool,
    receiver_depth: f64,
}

/// Builder for [`TravelTimeSolver`].
#[derive(Debug)]
pub struct TravelTimeSolverBuilder {
    model: VelocityModel,
    config: SolverConfig,
    receiver_depth: f64,
    site_name: String,
}

impl TravelTimeSolverBuilder {
    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Receiver depth in km (negative for an elevated site).
    pub fn receiver_depth(mut self, depth: f64) -> Self {
        self.receiver_depth = depth;
        self
    }

    /// Name of the receiving site.
    pub fn site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = name.into();
        self
    }

    /// Validate the configuration, apply its quadrature tolerance to the
    /// model and build the solver.
    ///
    /// # Errors
    /// Returns [`TauPError::EmptyModel`] for a model without layers, and the
    /// configuration or receiver-depth validation errors.
    pub fn build(mut self) -> Result<TravelTimeSolver> {
        self.config.validate()?;
        self.model
            .set_integration_tolerance(self.config.integration_tolerance)?;
        let mut solver = TravelTimeSolver::from_shared(Arc::new(self.model), self.config)?;
        solver.set_receiver_depth(self.receiver_depth)?;
        solver.site_name = self.site_name;
        Ok(solver)
    }
}

/// Finds every arrival between a receiver and a source.
///
/// A solver owns its per-query state (the zero functional, the result arena
/// and the memoized last query), so concurrent callers each need their own
/// instance. The model itself is shared through an `Arc`.
#[derive(Debug)]
pub struct TravelTimeSolver {
    model: Arc<VelocityModel>,
    config: SolverConfig,
    finder: RootFinder,
    functional: RayZeroFunctional,
    arena: ResultArena,
    receiver_depth: f64,
    site_name: String,
    last_query: Option<QueryKey>,
}

impl TravelTimeSolver {
    /// Solver over `model` with the default configuration.
    pub fn new(model: VelocityModel) -> Result<Self> {
        Self::builder(model).build()
    }

    /// Start building a solver that takes ownership of `model`.
    pub fn builder(model: VelocityModel) -> TravelTimeSolverBuilder {
        TravelTimeSolverBuilder {
            model,
            config: SolverConfig::default(),
            receiver_depth: 0.0,
            site_name: String::new(),
        }
    }

    /// Solver over an already shared model.
    ///
    /// The model keeps its own quadrature tolerance; the configuration's
    /// integration tolerance is not applied.
    ///
    /// # Errors
    /// Returns [`TauPError::EmptyModel`] or a configuration error.
    pub fn from_shared(model: Arc<VelocityModel>, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        if model.is_empty() {
            return Err(TauPError::EmptyModel);
        }
        Ok(TravelTimeSolver {
            functional: RayZeroFunctional::new(Arc::clone(&model)),
            model,
            finder: RootFinder::new(config.root_tolerance),
            config,
            arena: ResultArena::new(),
            receiver_depth: 0.0,
            site_name: String::new(),
            last_query: None,
        })
    }

    /// The shared model.
    pub fn model(&self) -> &Arc<VelocityModel> {
        &self.model
    }

    /// Current configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the configuration. The quadrature tolerance of the shared
    /// model is unaffected.
    pub fn set_config(&mut self, config: SolverConfig) -> Result<()> {
        config.validate()?;
        self.finder = RootFinder::new(config.root_tolerance);
        self.config = config;
        self.last_query = None;
        Ok(())
    }

    /// Enable or disable derivative evaluation.
    pub fn set_evaluate_derivatives(&mut self, enabled: bool) {
        self.config.evaluate_derivatives = enabled;
    }

    /// Receiver depth in km.
    pub fn receiver_depth(&self) -> f64 {
        self.receiver_depth
    }

    /// Move the receiver.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidQuery`] for a non-finite depth.
    pub fn set_receiver_depth(&mut self, depth: f64) -> Result<()> {
        if !depth.is_finite() {
            return Err(TauPError::InvalidQuery {
                distance: 0.0,
                depth,
            });
        }
        self.receiver_depth = depth;
        Ok(())
    }

    /// Name of the receiving site.
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    /// Rename the receiving site.
    pub fn set_site_name(&mut self, name: impl Into<String>) {
        self.site_name = name.into();
    }

    /// The zero functional as left by the last query.
    pub fn functional(&self) -> &RayZeroFunctional {
        &self.functional
    }

    /// Find every arrival at `distance` radians from a source `depth` km
    /// deep, sorted by travel time.
    ///
    /// Repeating the previous query returns the cached results.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidQuery`] for a negative or non-finite
    /// distance or a non-finite depth.
    pub fn calculate_travel_times(&mut self, distance: f64, depth: f64) -> Result<&[TravelTimeResult]> {
        if !distance.is_finite() || distance < 0.0 || !depth.is_finite() {
            return Err(TauPError::InvalidQuery { distance, depth });
        }
        let key = QueryKey {
            distance,
            depth,
            derivatives: self.config.evaluate_derivatives,
            receiver_depth: self.receiver_depth,
        };
        if self.last_query == Some(key) {
            return Ok(self.arena.results());
        }

        self.arena.reset();
        self.search(distance, depth);
        self.last_query = Some(key);
        debug!(
            "distance {:.6} rad depth {:.3} km: {} arrivals",
            distance,
            depth,
            self.arena.len()
        );
        Ok(self.arena.results())
    }

    /// Results of the last query in time order.
    pub fn results(&self) -> &[TravelTimeResult] {
        self.arena.results()
    }

    /// Earliest arrival of the last query.
    pub fn first_result(&self) -> Option<&TravelTimeResult> {
        self.arena.results().first()
    }

    /// Earliest travel time of the last query.
    pub fn first_time(&self) -> Option<f64> {
        self.first_result().map(|r| r.time)
    }

    /// Earliest non-diffracted travel time, or the earliest time when every
    /// arrival is diffracted.
    pub fn first_non_diffracted_time(&self) -> Option<f64> {
        self.arena
            .results()
            .iter()
            .find(|r| !r.is_diffracted())
            .or_else(|| self.first_result())
            .map(|r| r.time)
    }

    /// First arrival named `name` (attached or evaluated), else the first
    /// whose name starts with `name`.
    pub fn result_for_phase(&self, name: &str) -> Option<&TravelTimeResult> {
        let results = self.arena.results();
        results
            .iter()
            .find(|r| r.matches(name))
            .or_else(|| results.iter().find(|r| r.matches_prefix(name)))
    }

    /// Travel time of [`result_for_phase`](Self::result_for_phase).
    pub fn time_for_phase(&self, name: &str) -> Option<f64> {
        self.result_for_phase(name).map(|r| r.time)
    }

    /// Layer containing a source at `depth` km.
    pub fn source_layer_index(&self, depth: f64) -> Option<usize> {
        let e = Endpoint::at_depth(depth, self.model.planet_radius());
        self.model.radius_layer_index(e.radius)
    }

    /// Layer containing the receiver.
    pub fn receiver_layer_index(&self) -> Option<usize> {
        self.source_layer_index(self.receiver_depth)
    }

    fn search(&mut self, distance: f64, depth: f64) {
        let model = Arc::clone(&self.model);
        let layers = model.layers();
        let limits = model.classify();

        self.functional.set_receiver_depth(self.receiver_depth);
        self.functional.set_distance(distance);
        self.functional.set_source_depth(depth);
        let p_min = self.functional.min_ray_parameter();

        let direct_p = self.search_direct(p_min, distance, depth);

        self.functional.set_mode(SearchMode::Turning);
        for (i, (layer, lim)) in layers.iter().zip(limits).enumerate() {
            let Some((p_top, p_bottom)) = lim.effective_range(layer) else {
                continue;
            };
            if p_bottom >= p_min {
                continue;
            }
            self.functional.set_p_top(p_top);
            let mut pt = p_top.min(p_min);
            let mut top = self.functional.evaluate(pt);
            let split = lim.critical.is_some();

            if let Some(crit) = lim.critical.filter(|c| c.p < pt) {
                let mid = self.functional.evaluate(crit.p);
                if top.is_valid() && mid.is_valid() {
                    if let Some(p) = self.upper_half_root(pt, top.zero, crit.p, mid.zero) {
                        if !(p == pt && direct_p == Some(p)) {
                            let spec = BranchSpec::Turning {
                                guard: p_top,
                                upper: pt,
                                lower: crit.p,
                            };
                            self.record_turning(i, p, Branch::Upper, spec, distance, depth);
                        }
                    }
                }
                pt = crit.p;
                top = mid;
            }

            let bottom = self.functional.evaluate(p_bottom);
            if !(top.is_valid() && bottom.is_valid()) {
                continue;
            }
            let root = if top.zero == 0.0 && !split {
                Some(pt)
            } else if bottom.zero == 0.0 {
                Some(p_bottom)
            } else if top.zero * bottom.zero < 0.0 {
                let f = &mut self.functional;
                Some(self.finder.zero_of(|p| f.zero(p), pt, p_bottom))
            } else {
                None
            };
            if let Some(p) = root {
                if !(p == pt && direct_p == Some(p)) {
                    let branch = if split { Branch::Lower } else { Branch::Whole };
                    let spec = BranchSpec::Turning {
                        guard: p_top,
                        upper: pt,
                        lower: p_bottom,
                    };
                    self.record_turning(i, p, branch, spec, distance, depth);
                }
            }

            if bottom.zero > 0.0 && i + 1 < layers.len() {
                let names = layer.phase_names();
                if names.diffracted_upper.is_some() {
                    let p_interface = layer.r_bottom() / layer.v_bottom();
                    self.record_diffracted(i, Branch::DiffractedUpper, p_top, p_bottom, p_interface, bottom.zero, distance, depth);
                }
                if names.diffracted_lower.is_some() {
                    let p_interface = layer.r_bottom() / layers[i + 1].v_top();
                    self.record_diffracted(i, Branch::DiffractedLower, p_top, p_bottom, p_interface, bottom.zero, distance, depth);
                }
            }
        }
    }

    fn search_direct(&mut self, p_min: f64, distance: f64, depth: f64) -> Option<f64> {
        let f = &mut self.functional;
        f.set_mode(SearchMode::Direct);
        f.set_p_top(self.model.layers()[0].p_top());
        let top = f.evaluate(p_min);
        let bottom = f.evaluate(0.0);
        if !(top.is_valid() && bottom.is_valid()) {
            return None;
        }
        let p = if top.zero == 0.0 {
            p_min
        } else if bottom.zero == 0.0 {
            0.0
        } else if top.zero * bottom.zero < 0.0 {
            self.finder.zero_of(|p| f.zero(p), p_min, 0.0)
        } else {
            return None;
        };
        self.record_direct(p, distance, depth);
        Some(p)
    }

    fn upper_half_root(&mut self, pt: f64, zt: f64, pm: f64, zm: f64) -> Option<f64> {
        let f = &mut self.functional;
        upper_half_zero(
            self.finder,
            |p| {
                let e = f.evaluate(p);
                (e.zero, e.is_valid())
            },
            pt,
            zt,
            pm,
            zm,
        )
    }

    fn derivatives(&self, spec: BranchSpec, t00: f64, distance: f64, depth: f64) -> Option<Derivatives> {
        if !self.config.evaluate_derivatives {
            return None;
        }
        let evaluator = DerivativeEvaluator::new(
            self.finder,
            self.config.derivative_distance_step,
            self.config.derivative_depth_step,
            self.config.max_step_halvings,
        );
        let mut scratch = self.functional.clone();
        evaluator
            .evaluate(&mut scratch, spec, t00, distance, depth)
            .map(|e| e.derivatives)
    }

    fn record_direct(&mut self, p: f64, distance: f64, depth: f64) {
        let index = self.functional.direct_layer_index();
        let ray_type = self.functional.direct_ray_type();
        let radius = self
            .functional
            .source()
            .radius
            .min(self.functional.receiver().radius);
        let layer = &self.model.layers()[index.min(self.model.len() - 1)];

        let mut r = self.arena.acquire();
        r.ray_parameter = p;
        r.layer_index = index;
        r.ray_type = ray_type;
        r.branch = Branch::Direct;
        r.turning_radius = radius;
        r.turning_velocity = self
            .model
            .radius_layer_index(radius)
            .map_or(layer.v_top(), |k| self.model.layers()[k].velocity(radius));
        let suffix = if ray_type == RayType::UpGoing { "up" } else { "dn" };
        push_phase_name(&mut r.evaluated_name, layer.phase_type(), index, suffix);
        r.time = self.functional.corrected_time(p);
        r.legs = self.functional.legs(p);
        r.branch_range = (self.functional.min_ray_parameter(), 0.0);
        r.derivatives = self.derivatives(BranchSpec::Direct, r.time, distance, depth);
        debug!("direct {} p {:.6} T {:.4}", r.evaluated_name, p, r.time);
        self.arena.insert(r);
    }

    fn record_turning(&mut self, index: usize, p: f64, branch: Branch, spec: BranchSpec, distance: f64, depth: f64) {
        let model = Arc::clone(&self.model);
        let layer = &model.layers()[index];
        let names = layer.phase_names();

        let mut r = self.arena.acquire();
        r.ray_parameter = p;
        r.layer_index = index;
        r.ray_type = RayType::Turning;
        r.branch = branch;
        (r.turning_radius, r.turning_velocity) = match layer.ray_state(p) {
            RayState::Turning { radius, velocity } => (radius, velocity),
            _ => (layer.r_bottom(), layer.v_bottom()),
        };
        push_phase_name(&mut r.evaluated_name, layer.phase_type(), index, branch.suffix());
        r.phase_name = match branch {
            Branch::Upper => names.upper.as_ref().or(names.primary.as_ref()),
            Branch::Lower => names.lower.as_ref().or(names.primary.as_ref()),
            _ => names.primary.as_ref(),
        }
        .cloned();
        r.time = self.functional.corrected_time(p);
        r.legs = self.functional.legs(p);
        if let BranchSpec::Turning { upper, lower, .. } = spec {
            r.branch_range = (upper, lower);
        }
        r.derivatives = self.derivatives(spec, r.time, distance, depth);
        debug!("turning {} p {:.6} T {:.4}", r.evaluated_name, p, r.time);
        self.arena.insert(r);
    }

    #[allow(clippy::too_many_arguments)]
    fn record_diffracted(
        &mut self,
        index: usize,
        branch: Branch,
        p_top: f64,
        p_bottom: f64,
        p_interface: f64,
        residual: f64,
        distance: f64,
        depth: f64,
    ) {
        let model = Arc::clone(&self.model);
        let layer = &model.layers()[index];
        let names = layer.phase_names();

        let mut r = self.arena.acquire();
        r.ray_parameter = p_interface;
        r.layer_index = index;
        r.ray_type = RayType::Turning;
        r.branch = branch;
        r.turning_radius = layer.r_bottom();
        r.turning_velocity = layer.r_bottom() / p_interface;
        push_phase_name(&mut r.evaluated_name, layer.phase_type(), index, branch.suffix());
        let name = match branch {
            Branch::DiffractedUpper => names.diffracted_upper.as_ref(),
            _ => names.diffracted_lower.as_ref(),
        };
        r.phase_name = name.filter(|n| !n.is_empty()).cloned();
        r.time = self.functional.time(p_bottom) + residual * p_interface;
        r.legs = self.functional.legs(p_bottom);
        r.interface = Some(LegValue {
            distance: residual,
            time: residual * p_interface,
        });
        r.branch_range = (p_top.min(self.functional.min_ray_parameter()), p_bottom);
        let spec = BranchSpec::Diffracted {
            guard: p_top,
            p_bottom,
            p_interface,
        };
        r.derivatives = self.derivatives(spec, r.time, distance, depth);
        debug!("diffracted {} T {:.4}", r.evaluated_name, r.time);
        self.arena.insert(r);
    }
}

/// Append `{phase type}{layer}{suffix}`, reusing the name's allocation.
fn push_phase_name(name: &mut String, phase_type: &str, index: usize, suffix: &str) {
    name.push_str(phase_type);
    name.push_str(&index.to_string());
    name.push_str(suffix);
}

/// Root in the upper half `[pt, pm]` of a retrograde layer.
///
/// `residual` returns the distance mismatch at `p` and whether the ray is
/// valid. When the residual has the same sign at both ends the branch may
/// still dip across zero near a tangent apex, so three trial points are tested: a
/// small step into the bracket, the midpoint, and (for a nearly tangent top)
/// the residual's extremum.
fn upper_half_zero<F>(finder: RootFinder, mut residual: F, pt: f64, zt: f64, pm: f64, zm: f64) -> Option<f64>
where
    F: FnMut(f64) -> (f64, bool),
{
    if zt == 0.0 {
        return Some(pt);
    }
    if zm == 0.0 {
        return Some(pm);
    }
    if zt * zm < 0.0 {
        return Some(finder.zero_of(|p| residual(p).0, pt, pm));
    }

    let step = if pm < pt { -TRIAL_OFFSET } else { TRIAL_OFFSET };
    for trial in [pt + step, 0.5 * (pt + pm)] {
        let (zero, valid) = residual(trial);
        if valid && zt * zero < 0.0 {
            return Some(finder.zero_of(|p| residual(p).0, trial, pm));
        }
    }

    if zt.abs() < TANGENT_RESIDUAL {
        let kind = if zt < 0.0 {
            ExtremumKind::Maximum
        } else {
            ExtremumKind::Minimum
        };
        let ext = RootFinder::new(TANGENT_TOLERANCE).extremum_of(|p| residual(p).0, pt, 0.5 * (pt + pm), pm, kind);
        let (zero, valid) = residual(ext.x);
        if valid && zt * zero < 0.0 {
            return Some(finder.zero_of(|p| residual(p).0, ext.x, pm));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_DEGREES: f64 = 10.0 * std::f64::consts::PI / 180.0;

    fn constant_model() -> VelocityModel {
        let mut model = VelocityModel::new("const");
        model.append_constant(8.0, 6371.0, 6336.0).unwrap();
        model
    }

    #[test]
    fn rejects_empty_model_and_bad_queries() {
        assert!(matches!(
            TravelTimeSolver::new(VelocityModel::new("empty")),
            Err(TauPError::EmptyModel)
        ));
        let mut solver = TravelTimeSolver::new(constant_model()).unwrap();
        assert!(solver.calculate_travel_times(-0.1, 0.0).is_err());
        assert!(solver.calculate_travel_times(f64::NAN, 0.0).is_err());
        assert!(solver.calculate_travel_times(0.1, f64::INFINITY).is_err());
    }

    #[test]
    fn single_turning_ray_at_ten_degrees() {
        let mut solver = TravelTimeSolver::new(constant_model()).unwrap();
        let results = solver.calculate_travel_times(TEN_DEGREES, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.ray_type, RayType::Turning);
        assert_eq!(r.evaluated_name, "P0b");
        let eta = 796.375_f64;
        let p = r.ray_parameter;
        let closed = 2.0 * (std::f64::consts::FRAC_PI_2 - (p / eta).asin());
        assert!((closed - TEN_DEGREES).abs() < 1e-8, "distance mismatch {}", closed - TEN_DEGREES);
        let expected_time = 2.0 * (eta * eta - p * p).sqrt();
        assert!((r.time - expected_time).abs() < 1e-6, "T = {} vs {}", r.time, expected_time);
    }

    #[test]
    fn vertical_direct_ray_from_source_depth() {
        let mut solver = TravelTimeSolver::new(constant_model()).unwrap();
        let results = solver.calculate_travel_times(0.0, 20.0).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.ray_type, RayType::UpGoing);
        assert_eq!(r.evaluated_name, "P0up");
        assert_eq!(r.ray_parameter, 0.0);
        assert!((r.time - 2.5).abs() < 1e-12);
    }

    #[test]
    fn coincident_endpoints_report_single_zero_time() {
        let mut solver = TravelTimeSolver::new(constant_model()).unwrap();
        let results = solver.calculate_travel_times(0.0, 0.0).unwrap();
        assert_eq!(results.len(), 1, "{:?}", results);
        assert_eq!(results[0].branch, Branch::Direct);
        assert_eq!(results[0].time, 0.0);
    }

    #[test]
    fn repeated_query_is_memoized() {
        let mut solver = TravelTimeSolver::new(constant_model()).unwrap();
        let first = solver.calculate_travel_times(TEN_DEGREES, 0.0).unwrap().to_vec();
        let again = solver.calculate_travel_times(TEN_DEGREES, 0.0).unwrap();
        assert_eq!(first.as_slice(), again);
        // A new query recycles the previous results.
        solver.calculate_travel_times(0.1, 0.0).unwrap();
        assert_eq!(solver.results().len(), 1);
    }

    #[test]
    fn receiver_depth_changes_memo_key() {
        let mut solver = TravelTimeSolver::new(constant_model()).unwrap();
        let t0 = solver.calculate_travel_times(0.0, 20.0).unwrap()[0].time;
        solver.set_receiver_depth(5.0).unwrap();
        let t1 = solver.calculate_travel_times(0.0, 20.0).unwrap()[0].time;
        assert!((t0 - 2.5).abs() < 1e-12);
        assert!((t1 - 15.0 / 8.0).abs() < 1e-12);
        assert_eq!(solver.receiver_layer_index(), Some(0));
    }

    #[test]
    fn derivatives_of_turning_ray() {
        let config = SolverConfig::new().with_derivatives(true);
        let mut solver = TravelTimeSolver::builder(constant_model())
            .config(config)
            .build()
            .unwrap();
        let results = solver.calculate_travel_times(TEN_DEGREES, 10.0).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        let d = r.derivatives.expect("derivatives should be available");
        let p = r.ray_parameter;
        assert!(((d.dt_ddistance - p) / p).abs() < 1e-3, "dT/dD {} vs p {}", d.dt_ddistance, p);
        let rs = 6361.0_f64;
        let eta = rs / 8.0;
        let dtdh = -(eta * eta - p * p).sqrt() / rs;
        assert!(((d.dt_ddepth - dtdh) / dtdh).abs() < 1e-3, "dT/dh {} vs {}", d.dt_ddepth, dtdh);
    }

    fn retrograde_model() -> VelocityModel {
        let mut model = VelocityModel::new("retro");
        model.append_constant(8.0, 6371.0, 6271.0).unwrap();
        model
            .append_quadratic([401.25441, -12.542, 0.1], 6271.0, 6171.0, Some(100.0))
            .unwrap();
        model
    }

    fn valid(z: f64) -> (f64, bool) {
        (z, true)
    }

    #[test]
    fn upper_half_midpoint_finds_dip() {
        // Same sign at both ends and one step in; negative at the midpoint.
        let z = |p: f64| 1.0 - 8.0 * p * (1.0 - p);
        let finder = RootFinder::new(1e-10);
        let p = upper_half_zero(finder, |p| valid(z(p)), 1.0, z(1.0), 0.0, z(0.0)).expect("root past the midpoint");
        assert!((p - (0.5 - 0.125_f64.sqrt())).abs() < 1e-8, "root {}", p);
        assert!(z(p).abs() < 1e-8);
    }

    #[test]
    fn upper_half_step_finds_early_crossing() {
        // Crosses just inside the top, back above zero by the midpoint.
        let z = |p: f64| {
            if p <= 1.0e-4 {
                1.0 - 2.0e4 * p
            } else {
                -1.0 + 2.0 * (p - 1.0e-4) / 0.3
            }
        };
        assert!(z(0.5) > 0.0);
        let finder = RootFinder::new(1e-10);
        let p = upper_half_zero(finder, |p| valid(z(p)), 0.0, z(0.0), 1.0, z(1.0)).expect("root past the first step");
        assert!((p - 0.1501).abs() < 1e-8, "root {}", p);
    }

    #[test]
    fn upper_half_extremum_finds_tangent_dip() {
        // Nearly tangent top; the step and the midpoint both stay positive.
        let z = |p: f64| 5.0e-4 + 4.0 * (p - 0.25) * (p - 0.25) - 0.25;
        assert!(z(1.0e-4) > 0.0 && z(0.5) > 0.0);
        let finder = RootFinder::new(1e-10);
        let p = upper_half_zero(finder, |p| valid(z(p)), 0.0, z(0.0), 1.0, z(1.0)).expect("root past the minimum");
        assert!((p - (0.25 + 0.062375_f64.sqrt())).abs() < 1e-6, "root {}", p);
        assert!(z(p).abs() < 1e-6);
    }

    #[test]
    fn upper_half_rejects_invalid_points_and_missing_roots() {
        let z = |p: f64| 1.0 - 8.0 * p * (1.0 - p);
        let finder = RootFinder::new(1e-10);
        assert_eq!(upper_half_zero(finder, |p| (z(p), false), 1.0, z(1.0), 0.0, z(0.0)), None);
        let monotonic = |p: f64| -5.0e-4 - p;
        assert_eq!(
            upper_half_zero(finder, |p| valid(monotonic(p)), 0.0, monotonic(0.0), 1.0, monotonic(1.0)),
            None
        );
    }

    #[test]
    fn retrograde_upper_half_fallback_below_top_distance() {
        // Just short of the upper half's top distance: its residual keeps one
        // sign, so every fallback trial runs and none may invent an arrival.
        let model = retrograde_model();
        let p_top = model.layers()[1].p_top();
        let distance = 2.0 * model.distance_to_turn(p_top, true).value - 5.0e-4;
        let mut solver = TravelTimeSolver::new(model).unwrap();
        solver.calculate_travel_times(distance, 0.0).unwrap();

        let names: Vec<&str> = solver.results().iter().map(|r| r.evaluated_name.as_str()).collect();
        assert!(names.contains(&"P0b"), "{:?}", names);
        assert!(names.contains(&"P1b-"), "{:?}", names);
        assert!(!names.contains(&"P1b+"), "{:?}", names);
        for r in solver.results() {
            let covered = 2.0 * solver.model().distance_to_turn(r.ray_parameter, false).value;
            assert!((covered - distance).abs() < 1e-6, "{} covers {}", r.evaluated_name, covered);
        }
    }

    #[test]
    fn phase_names_append_to_recycled_buffer() {
        let mut name = String::with_capacity(8);
        push_phase_name(&mut name, "S", 12, "b-");
        assert_eq!(name, "S12b-");
        assert!(name.capacity() >= 8);
    }

    #[test]
    fn site_name_and_config_round_trip() {
        let mut solver = TravelTimeSolver::builder(constant_model())
            .site_name("ABC")
            .receiver_depth(-1.0)
            .build()
            .unwrap();
        assert_eq!(solver.site_name(), "ABC");
        assert_eq!(solver.receiver_depth(), -1.0);
        assert!(solver
            .set_config(SolverConfig::new().with_root_tolerance(-1.0))
            .is_err());
        solver.set_site_name("XYZ");
        assert_eq!(solver.site_name(), "XYZ");
    }
}
