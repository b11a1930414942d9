use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use coupled_oscillators::analysis::OrderSample;
use coupled_oscillators::cli::CliOptions;
use coupled_oscillators::config::{self, SimulationParams};
use coupled_oscillators::initial_conditions::{build_ensemble, resolve_seed};
use coupled_oscillators::output::{
    RunMetadata, TrajectoryWriter, ensure_directory, resolve_artifacts, write_summary_json,
};
use coupled_oscillators::plotting::render_order_parameter;
use coupled_oscillators::simulation::propagate;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/simulation.toml";

fn main() -> Result<()> {
    let cli = CliOptions::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let params = load_params(&cli)?;

    info!("Configuration summary:");
    for line in params.summary_lines() {
        info!("  - {line}");
    }

    if cli.dry_run {
        info!("Dry-run requested; exiting without running simulation.");
        return Ok(());
    }

    let seed = resolve_seed(params.seed);
    let mut ensemble = build_ensemble(&params, seed)?;

    let artifacts = resolve_artifacts(&params.output);
    ensure_directory(&artifacts.directory)?;

    let mut writer = TrajectoryWriter::create(&artifacts)?;
    writer.write_frequencies(&ensemble.frequencies)?;

    let start = Instant::now();
    let mut trace: Vec<OrderSample> = Vec::new();
    let run = propagate(
        &mut ensemble,
        params.coupling,
        params.t_final,
        &params.integrator,
        |step| {
            trace.push(OrderSample {
                time: step.time,
                r: step.order.r,
                psi: step.order.psi,
            });
            writer.write_step(step)
        },
    );

    // Sinks are closed whether or not the run succeeded.
    let closed = writer.finish();
    let outcome = match run {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                steps_written = trace.len(),
                "run aborted; partial output left in {}",
                artifacts.directory.display()
            );
            if let Err(close_err) = closed {
                error!("{close_err:#}");
            }
            return Err(err);
        }
    };
    closed?;

    if artifacts.toggles.json {
        write_summary_json(
            &artifacts.summary_json,
            &RunMetadata::new(&params, seed),
            &ensemble,
            &outcome,
        )?;
    }

    if artifacts.toggles.png || artifacts.toggles.svg {
        render_order_parameter(&artifacts, &trace)?;
    }

    println!("Simulation complete in {:.3?}.", start.elapsed());
    println!(
        "Accepted steps = {}, rejected steps = {}, RHS evaluations = {}",
        outcome.statistics.accepted_steps,
        outcome.statistics.rejected_steps,
        outcome.statistics.fn_evals
    );
    println!(
        "Final order parameter at t = {:.6}: r = {:.6}, ψ = {:.6}",
        outcome.final_time, outcome.final_order.r, outcome.final_order.psi
    );
    println!("Outputs in {}", artifacts.directory.display());

    Ok(())
}

fn load_params(cli: &CliOptions) -> Result<SimulationParams> {
    let overrides = cli.overrides();
    match &cli.config {
        Some(path) => config::load_from_file(path, &overrides)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            config::load_from_file(DEFAULT_CONFIG, &overrides)
                .with_context(|| format!("Failed to load config from {DEFAULT_CONFIG}"))
        }
        None => config::from_overrides(&overrides).context("Invalid invocation parameters"),
    }
}
