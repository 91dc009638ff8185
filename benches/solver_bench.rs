// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use taup_solver::{SolverConfig, TravelTimeSolver, TravelTimeTable, VelocityModel};

/// Crust over a mantle gradient, with a quadratic transition zone.
fn layered_model() -> VelocityModel {
    let mut model = VelocityModel::new("bench");
    let crust = model.append_constant(6.0, 6371.0, 6351.0).unwrap();
    crust.phase_names_mut().diffracted_lower = Some("Pn".into());
    model.append_power(8.0, 8.3, 6351.0, 6271.0).unwrap();
    model
        .append_quadratic([401.25441, -12.542, 0.1], 6271.0, 6171.0, Some(100.0))
        .unwrap();
    model.append_linear(16.0, -1.2e-3, 6171.0, 5971.0, None).unwrap();
    model.classify();
    model
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Fresh query on every iteration (the memo is defeated by alternating depths).
fn bench_single_query(c: &mut Criterion) {
    let mut solver = TravelTimeSolver::new(layered_model()).unwrap();
    let mut flip = false;
    c.bench_function("query_20deg", |b| {
        b.iter(|| {
            flip = !flip;
            let depth = if flip { 10.0 } else { 10.5 };
            black_box(solver.calculate_travel_times(black_box(0.35), depth).unwrap().len())
        });
    });
}

fn bench_query_with_derivatives(c: &mut Criterion) {
    let config = SolverConfig::new().with_derivatives(true);
    let mut solver = TravelTimeSolver::builder(layered_model())
        .config(config)
        .build()
        .unwrap();
    let mut flip = false;
    c.bench_function("query_20deg_derivatives", |b| {
        b.iter(|| {
            flip = !flip;
            let depth = if flip { 10.0 } else { 10.5 };
            black_box(solver.calculate_travel_times(black_box(0.35), depth).unwrap().len())
        });
    });
}

/// Thread scaling: 40 depths by 90 distances.
fn bench_table_scaling(c: &mut Criterion) {
    let cpus = num_cpus();
    let model = Arc::new(layered_model());
    let distances: Vec<f64> = (0..90).map(|i| i as f64 * 0.005).collect();
    let depths: Vec<f64> = (0..40).map(|i| i as f64 * 2.5).collect();

    let mut group = c.benchmark_group("table_40x90");
    group.sample_size(10);
    for &threads in &[1, 2, 4, 8] {
        if threads <= cpus {
            let table = TravelTimeTable::new(Arc::clone(&model), SolverConfig::default())
                .unwrap()
                .with_threads(threads);
            group.bench_function(format!("{}threads", threads), |b| {
                b.iter(|| black_box(table.compute(&distances, &depths).unwrap()));
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_query,
    bench_query_with_derivatives,
    bench_table_scaling
);
criterion_main!(benches);
