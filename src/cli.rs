use std::path::PathBuf;

use clap::Parser;

use crate::config::RunOverrides;

/// Command line options for the coupled oscillator simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Kuramoto model of coupled phase oscillators")]
pub struct CliOptions {
    /// Number of oscillators N.
    #[arg(value_name = "N", value_parser = clap::value_parser!(usize))]
    pub oscillators: usize,

    /// Coupling strength K.
    #[arg(value_name = "K", allow_negative_numbers = true)]
    pub coupling: f64,

    /// Simulation horizon; integration runs from t = 0 to this time.
    #[arg(value_name = "T_FINAL")]
    pub t_final: f64,

    /// Optional TOML configuration file with integrator and output settings.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seed for the initial phases and frequencies.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Standard deviation of the natural frequency distribution.
    #[arg(long)]
    pub sigma: Option<f64>,

    /// Directory that receives all output files.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Display configuration summary without running the simulation.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliOptions {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            oscillators: Some(self.oscillators),
            coupling: Some(self.coupling),
            t_final: Some(self.t_final),
            sigma: self.sigma,
            seed: self.seed,
            output_dir: self.output_dir.clone(),
        }
    }
}
