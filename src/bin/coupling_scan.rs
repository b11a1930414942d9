use std::path::PathBuf;

use anyhow::{Context, Result};
use coupled_oscillators::config::load_coupling_scan_from_file;
use coupled_oscillators::initial_conditions::{build_ensemble, resolve_seed};
use coupled_oscillators::output::{
    RunMetadata, ensure_directory, resolve_scan, write_scan_csv, write_scan_json,
};
use coupled_oscillators::plotting::render_coupling_scan;
use coupled_oscillators::scan::run_coupling_scan;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/coupling_scan.toml"));

    let config = load_coupling_scan_from_file(&config_path).with_context(|| {
        format!(
            "Failed to load coupling scan config {}",
            config_path.display()
        )
    })?;

    ensure_directory(&config.output.directory)?;

    let seed = resolve_seed(config.base.seed);
    let initial = build_ensemble(&config.base, seed)?;

    info!(
        "[coupling-scan] N = {}, K in [{}, {}] over {} samples, burn-in fraction {}",
        initial.len(),
        config.scan.k_min,
        config.scan.k_max,
        config.scan.sample_count,
        config.scan.burn_in_fraction
    );

    let result = run_coupling_scan(
        &initial,
        config.base.t_final,
        &config.base.integrator,
        &config.scan,
    )?;

    let artifacts = resolve_scan(&config.output);

    if artifacts.toggles.csv {
        write_scan_csv(&artifacts.csv, &result.points)?;
    }

    if artifacts.toggles.json {
        write_scan_json(
            &artifacts.json,
            &result.points,
            &RunMetadata::new(&config.base, seed),
            &result.scan,
            &initial.frequencies,
        )?;
    }

    if artifacts.toggles.png || artifacts.toggles.svg {
        render_coupling_scan(&artifacts, &result.points)?;
    }

    println!(
        "[coupling-scan] completed. Samples: {}. Outputs in {}",
        result.points.len(),
        artifacts.directory.display()
    );

    Ok(())
}
