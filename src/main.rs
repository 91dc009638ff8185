// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use taup_solver::io;
use taup_solver::sweep::BranchSweep;
use taup_solver::table::{TableProgress, TravelTimeTable};
use taup_solver::{SolverConfig, TravelTimeSolver, VelocityModel};

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

#[derive(Parser)]
#[command(name = "taup-solver", about = "Tau-p travel times in a radially layered model")]
struct Cli {
    /// Layer, top to bottom (repeatable): "const:<v>:<rt>:<rb>",
    /// "power:<vt>:<vb>:<rt>:<rb>", "linear:<a0>:<a1>:<rt>:<rb>[:<norm>]",
    /// "quadratic:<a0>:<a1>:<a2>:<rt>:<rb>[:<norm>]" or
    /// "cubic:<a0>:<a1>:<a2>:<a3>:<rt>:<rb>[:<norm>]", with an optional
    /// "@<phase>" suffix naming the layer's phase
    #[arg(short = 'l', long, num_args = 1)]
    layer: Vec<String>,

    /// Load the model from a file written by --save-model
    #[arg(short = 'm', long, conflicts_with = "layer")]
    model: Option<PathBuf>,

    /// Model name
    #[arg(long, default_value = "cli")]
    name: String,

    /// Phase type used for default phase names ("P" or "S")
    #[arg(long, default_value = "P")]
    phase_type: String,

    /// Planet radius in km
    #[arg(long, default_value = "6371.0")]
    planet_radius: f64,

    /// Write the (classified) model to this file
    #[arg(long)]
    save_model: Option<PathBuf>,

    /// Print the model summary
    #[arg(long)]
    describe: bool,

    /// Epicentral distance in degrees (repeatable)
    #[arg(short = 'D', long, num_args = 1)]
    distance: Vec<f64>,

    /// Source depth in km
    #[arg(long, default_value = "0.0")]
    depth: f64,

    /// Receiver depth in km (negative above the surface)
    #[arg(long, default_value = "0.0")]
    receiver_depth: f64,

    /// Evaluate travel-time derivatives
    #[arg(long)]
    derivatives: bool,

    /// Root-finder tolerance on the ray parameter
    #[arg(long, default_value = "1e-6")]
    root_tolerance: f64,

    /// Relative quadrature tolerance
    #[arg(long, default_value = "1e-6")]
    integration_tolerance: f64,

    /// First-arrival table distances in degrees: "start,stop,step"
    #[arg(long, requires = "table_depths")]
    table_distances: Option<String>,

    /// First-arrival table depths in km: "start,stop,step"
    #[arg(long, requires = "table_distances")]
    table_depths: Option<String>,

    /// Write the table as CSV instead of printing it
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Number of Rayon worker threads for tables
    #[arg(long)]
    threads: Option<usize>,

    /// Print table progress to stderr
    #[arg(long)]
    progress: bool,

    /// Print an adaptive sweep of this layer's branch
    #[arg(long)]
    sweep_layer: Option<usize>,

    /// Nominal number of sweep intervals
    #[arg(long, default_value = "100")]
    sweep_samples: usize,
}

fn parse_numbers(s: &str, what: &str) -> Result<Vec<f64>> {
    s.split([',', ':'])
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {}: expected numbers, got '{}'", what, s))
}

fn parse_range(s: &str, what: &str) -> Result<Vec<f64>> {
    let parts = parse_numbers(s, what)?;
    let &[start, stop, step] = parts.as_slice() else {
        bail!("{} expects 'start,stop,step', got '{}'", what, s);
    };
    if step.is_nan() || step <= 0.0 || stop < start {
        bail!("{} needs step > 0 and stop >= start, got '{}'", what, s);
    }
    let n = ((stop - start) / step + 1e-9).floor() as usize + 1;
    Ok((0..n).map(|i| start + i as f64 * step).collect())
}

fn append_layer(model: &mut VelocityModel, spec: &str) -> Result<()> {
    let (body, phase) = match spec.split_once('@') {
        Some((b, p)) => (b, Some(p)),
        None => (spec, None),
    };
    let (kind, args) = body
        .split_once(':')
        .with_context(|| format!("layer '{}' has no parameters", spec))?;
    let v = parse_numbers(args, "layer parameters")?;

    let layer = match (kind, v.as_slice()) {
        ("const", &[c, rt, rb]) => model.append_constant(c, rt, rb),
        ("power", &[vt, vb, rt, rb]) => model.append_power(vt, vb, rt, rb),
        ("linear", &[a0, a1, rt, rb]) => model.append_linear(a0, a1, rt, rb, None),
        ("linear", &[a0, a1, rt, rb, n]) => model.append_linear(a0, a1, rt, rb, Some(n)),
        ("quadratic", &[a0, a1, a2, rt, rb]) => model.append_quadratic([a0, a1, a2], rt, rb, None),
        ("quadratic", &[a0, a1, a2, rt, rb, n]) => {
            model.append_quadratic([a0, a1, a2], rt, rb, Some(n))
        }
        ("cubic", &[a0, a1, a2, a3, rt, rb]) => model.append_cubic([a0, a1, a2, a3], rt, rb, None),
        ("cubic", &[a0, a1, a2, a3, rt, rb, n]) => {
            model.append_cubic([a0, a1, a2, a3], rt, rb, Some(n))
        }
        _ => bail!(
            "unknown layer '{}'. Expected const, power, linear, quadratic or cubic with the right number of values",
            spec
        ),
    }
    .with_context(|| format!("cannot append layer '{}'", spec))?;

    if let Some(p) = phase {
        layer.phase_names_mut().primary = Some(p.to_string());
    }
    Ok(())
}

fn build_model(cli: &Cli) -> Result<VelocityModel> {
    if let Some(path) = &cli.model {
        return io::load_model(path).with_context(|| format!("cannot load model {}", path.display()));
    }
    if cli.layer.is_empty() {
        bail!("specify at least one --layer or a --model file");
    }
    let mut model = VelocityModel::new(cli.name.clone())
        .with_planet_radius(cli.planet_radius)?
        .with_phase_type(cli.phase_type.clone());
    for spec in &cli.layer {
        append_layer(&mut model, spec)?;
    }
    model.set_integration_tolerance(cli.integration_tolerance)?;
    Ok(model)
}

fn print_arrivals(solver: &mut TravelTimeSolver, distances: &[f64], depth: f64) -> Result<()> {
    for &deg in distances {
        let results = solver.calculate_travel_times(deg * DEG_TO_RAD, depth)?;
        println!(
            "Distance {:.4} deg, depth {:.3} km: {} arrival(s)",
            deg,
            depth,
            results.len()
        );
        for r in results {
            println!("{}", r);
        }
        println!();
    }
    Ok(())
}

fn run_table(cli: &Cli, model: Arc<VelocityModel>, config: SolverConfig) -> Result<()> {
    let (Some(dist_spec), Some(depth_spec)) = (&cli.table_distances, &cli.table_depths) else {
        return Ok(());
    };
    let distances_deg = parse_range(dist_spec, "--table-distances")?;
    let depths = parse_range(depth_spec, "--table-depths")?;
    let distances: Vec<f64> = distances_deg.iter().map(|d| d * DEG_TO_RAD).collect();

    let mut table = TravelTimeTable::new(model, config)?.with_receiver_depth(cli.receiver_depth);
    if let Some(threads) = cli.threads {
        table = table.with_threads(threads);
    }
    if cli.progress {
        table = table.with_progress(Box::new(|info: TableProgress| {
            eprintln!(
                "[{:.1}s] rows {}/{}",
                info.elapsed.as_secs_f64(),
                info.rows_completed,
                info.total_rows
            );
        }));
    }

    let times = table.compute(&distances, &depths)?;
    match &cli.output {
        Some(path) => {
            io::save_table(path, &distances_deg, &depths, &times)
                .with_context(|| format!("cannot write table {}", path.display()))?;
            eprintln!("Wrote {} x {} table to {}", depths.len(), distances.len(), path.display());
        }
        None => {
            print!("{:>10}", "depth\\deg");
            for d in &distances_deg {
                print!(" {:>10.3}", d);
            }
            println!();
            for (h, row) in depths.iter().zip(times.rows()) {
                print!("{:>10.3}", h);
                for t in row {
                    print!(" {:>10.4}", t);
                }
                println!();
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = SolverConfig::new()
        .with_root_tolerance(cli.root_tolerance)
        .with_integration_tolerance(cli.integration_tolerance)
        .with_derivatives(cli.derivatives);
    config.validate()?;

    let model = Arc::new(build_model(&cli)?);
    model.classify();

    if cli.describe {
        println!("{}", model);
    }
    if let Some(path) = &cli.save_model {
        io::save_model(&model, path).with_context(|| format!("cannot save model {}", path.display()))?;
        eprintln!("Saved model '{}' to {}", model.name(), path.display());
    }
    if let Some(index) = cli.sweep_layer {
        let samples = BranchSweep::new(&model)
            .with_samples(cli.sweep_samples)
            .sweep(index)?;
        println!(
            "{:>12} {:>12} {:>10} {:>12} {:>12}",
            "radius", "p (s/deg)", "v", "dist (deg)", "time (s)"
        );
        for s in samples {
            println!("{}", s);
        }
    }

    if !cli.distance.is_empty() {
        let mut solver = TravelTimeSolver::from_shared(Arc::clone(&model), config)?;
        solver.set_receiver_depth(cli.receiver_depth)?;
        print_arrivals(&mut solver, &cli.distance, cli.depth)?;
    }

    run_table(&cli, model, config)
}
