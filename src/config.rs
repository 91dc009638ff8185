// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, TauPError};

/// Mean Earth radius in km, used when a model does not set its own.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default absolute tolerance on the ray parameter for zero searches.
pub const DEFAULT_ROOT_TOLERANCE: f64 = 1.0e-6;

/// Default relative tolerance for adaptive quadrature.
pub const DEFAULT_INTEGRATION_TOLERANCE: f64 = 1.0e-6;

/// Tolerance used when inverting a cubic velocity law for its turning radius.
pub const CUBIC_INVERSION_TOLERANCE: f64 = 1.0e-8;

/// Iteration cap shared by the zero and extremum searches.
pub const MAX_SEARCH_ITERATIONS: usize = 100;

/// Tuning knobs for a [`TravelTimeSolver`](crate::solver::TravelTimeSolver).
///
/// All values are validated by [`SolverConfig::validate`], which the solver
/// calls when the configuration is installed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Absolute tolerance on p for bracketed zero searches (s/rad).
    pub root_tolerance: f64,
    /// Relative tolerance for numeric layer integrals.
    pub integration_tolerance: f64,
    /// Finite-difference step in epicentral distance (radians).
    pub derivative_distance_step: f64,
    /// Finite-difference step in source depth (km).
    pub derivative_depth_step: f64,
    /// How many times both steps may be halved before giving up.
    pub max_step_halvings: usize,
    /// Evaluate the four travel-time derivatives for every arrival.
    pub evaluate_derivatives: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            root_tolerance: DEFAULT_ROOT_TOLERANCE,
            integration_tolerance: DEFAULT_INTEGRATION_TOLERANCE,
            derivative_distance_step: 1.0e-4,
            derivative_depth_step: 0.1,
            max_step_halvings: 5,
            evaluate_derivatives: false,
        }
    }
}

impl SolverConfig {
    /// Create a configuration holding the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the zero-search tolerance (builder method).
    pub fn with_root_tolerance(mut self, tolerance: f64) -> Self {
        self.root_tolerance = tolerance;
        self
    }

    /// Set the quadrature tolerance (builder method).
    pub fn with_integration_tolerance(mut self, tolerance: f64) -> Self {
        self.integration_tolerance = tolerance;
        self
    }

    /// Set both finite-difference steps (builder method).
    pub fn with_derivative_steps(mut self, distance_step: f64, depth_step: f64) -> Self {
        self.derivative_distance_step = distance_step;
        self.derivative_depth_step = depth_step;
        self
    }

    /// Set the maximum number of step halvings (builder method). Default is 5.
    pub fn with_max_step_halvings(mut self, halvings: usize) -> Self {
        self.max_step_halvings = halvings;
        self
    }

    /// Enable or disable derivative evaluation (builder method).
    pub fn with_derivatives(mut self, enabled: bool) -> Self {
        self.evaluate_derivatives = enabled;
        self
    }

    /// Check that every tolerance and step is positive and finite.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidTolerance`] or
    /// [`TauPError::InvalidDerivativeStep`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        for tol in [self.root_tolerance, self.integration_tolerance] {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(TauPError::InvalidTolerance(tol));
            }
        }
        for step in [self.derivative_distance_step, self.derivative_depth_step] {
            if !step.is_finite() || step <= 0.0 {
                return Err(TauPError::InvalidDerivativeStep(step));
            }
        }
        Ok(())
    }
}
