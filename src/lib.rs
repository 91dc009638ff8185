// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Seismic travel times in radially layered velocity models by tau-p
//! integration.
//!
//! A [`VelocityModel`] stacks spherical shells, each with an analytic
//! velocity law. For a source at a given epicentral distance and depth, a
//! [`TravelTimeSolver`] finds every ray connecting source and receiver: the
//! direct up/down-going ray, a turning ray per reachable layer (two for
//! retrograde layers), and optional rays diffracted along interfaces. Each
//! arrival carries its travel time and, on request, finite-difference
//! derivatives with respect to distance and depth.

#![warn(missing_docs)]

/// Byte buffer with alignment, byte-order and digest support.
pub mod codec;
/// Solver configuration and numerical constants.
pub mod config;
/// Finite-difference travel-time derivatives.
pub mod derivatives;
/// Error types for the library.
pub mod error;
/// The distance-mismatch functional whose roots are the arrivals.
pub mod functional;
/// Adaptive Simpson quadrature.
pub mod integrate;
/// Model files and table output.
pub mod io;
/// Layer classification and retrograde branch analysis.
pub mod limits;
/// The layer stack and whole-stack ray integrals.
pub mod model;
/// Travel-time results and their reuse pool.
pub mod result;
/// Brent zero and extremum finding.
pub mod root_finder;
/// Branch search for travel times.
pub mod solver;
/// Adaptive branch sampling.
pub mod sweep;
/// Parallel first-arrival tables.
pub mod table;
/// Velocity laws and single-layer integrals.
pub mod velocity;

pub use crate::config::SolverConfig;
pub use crate::error::{Result, TauPError};
pub use crate::model::VelocityModel;
pub use crate::result::{Branch, Derivatives, RayType, TravelTimeResult};
pub use crate::solver::{TravelTimeSolver, TravelTimeSolverBuilder};
pub use crate::table::TravelTimeTable;
pub use crate::velocity::{PhaseNames, VelocityLaw, VelocityLayer};
