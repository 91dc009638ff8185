// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

use crate::config::SolverConfig;
use crate::error::{Result, TauPError};
use crate::model::VelocityModel;
use crate::solver::TravelTimeSolver;

/// Progress information passed to the optional callback.
#[derive(Debug, Clone, Copy)]
pub struct TableProgress {
    /// Depth rows finished so far.
    pub rows_completed: usize,
    /// Total number of depth rows.
    pub total_rows: usize,
    /// Elapsed time since the table started.
    pub elapsed: Duration,
}

/// First-arrival travel times over a depth × distance grid.
///
/// Rows (depths) are distributed over a rayon pool. Every worker owns its own
/// [`TravelTimeSolver`]; all of them share one model, which is classified
/// before the pool starts.
pub struct TravelTimeTable {
    model: Arc<VelocityModel>,
    config: SolverConfig,
    receiver_depth: f64,
    num_threads: Option<usize>,
    progress_callback: Option<Box<dyn Fn(TableProgress) + Send + Sync>>,
}

impl TravelTimeTable {
    /// Create a table builder over `model`.
    ///
    /// Derivatives are never evaluated for tables, whatever `config` says.
    ///
    /// # Errors
    /// Returns [`TauPError::EmptyModel`] or a configuration error.
    pub fn new(model: Arc<VelocityModel>, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        if model.is_empty() {
            return Err(TauPError::EmptyModel);
        }
        model.classify();
        Ok(TravelTimeTable {
            model,
            config: config.with_derivatives(false),
            receiver_depth: 0.0,
            num_threads: None,
            progress_callback: None,
        })
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Receiver depth in km for every entry (builder method).
    pub fn with_receiver_depth(mut self, depth: f64) -> Self {
        self.receiver_depth = depth;
        self
    }

    /// Set a progress callback (builder method).
    /// The callback is invoked at most every 500ms and once more at the end.
    pub fn with_progress(mut self, callback: Box<dyn Fn(TableProgress) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }

    fn worker(&self) -> Result<TravelTimeSolver> {
        let mut solver = TravelTimeSolver::from_shared(Arc::clone(&self.model), self.config)?;
        solver.set_receiver_depth(self.receiver_depth)?;
        Ok(solver)
    }

    /// Compute first-arrival times for every (depth, distance) pair.
    ///
    /// Row `i` holds depth `depths[i]`; column `j` holds distance
    /// `distances[j]` in radians. Entries without an arrival are NaN.
    ///
    /// # Errors
    /// Returns [`TauPError::InvalidQuery`] for a bad distance or depth, or
    /// an error if the thread pool cannot be built.
    pub fn compute(&self, distances: &[f64], depths: &[f64]) -> Result<Array2<f64>> {
        if let Some(&d) = distances.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(TauPError::InvalidQuery { distance: d, depth: 0.0 });
        }
        if let Some(&h) = depths.iter().find(|h| !h.is_finite()) {
            return Err(TauPError::InvalidQuery { distance: 0.0, depth: h });
        }
        self.worker()?;

        let num_threads = self.get_num_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| TauPError::Other(e.to_string()))?;

        let total_rows = depths.len();
        let rows_completed = AtomicUsize::new(0);
        let start_time = Instant::now();
        let last_progress = AtomicU64::new(0);

        let rows = pool.install(|| {
            depths
                .par_iter()
                .map_init(
                    || self.worker(),
                    |solver, &depth| -> Result<Vec<f64>> {
                        let solver = solver.as_mut().map_err(|e| TauPError::Other(e.to_string()))?;
                        let mut row = Vec::with_capacity(distances.len());
                        for &distance in distances {
                            solver.calculate_travel_times(distance, depth)?;
                            row.push(solver.first_time().unwrap_or(f64::NAN));
                        }

                        let done = rows_completed.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(cb) = &self.progress_callback {
                            let elapsed_ms = start_time.elapsed().as_millis() as u64;
                            let last = last_progress.load(Ordering::Relaxed);
                            if done == total_rows
                                || (elapsed_ms >= last + 500
                                    && last_progress
                                        .compare_exchange(last, elapsed_ms, Ordering::Relaxed, Ordering::Relaxed)
                                        .is_ok())
                            {
                                cb(TableProgress {
                                    rows_completed: done,
                                    total_rows,
                                    elapsed: start_time.elapsed(),
                                });
                            }
                        }
                        Ok(row)
                    },
                )
                .collect::<Result<Vec<_>>>()
        })?;

        debug!(
            "table of {} x {} entries on {} threads in {:?}",
            depths.len(),
            distances.len(),
            num_threads,
            start_time.elapsed()
        );
        Array2::from_shape_vec((depths.len(), distances.len()), rows.concat())
            .map_err(|e| TauPError::Other(format!("shape error: {}", e)))
    }
}
