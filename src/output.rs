use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::analysis::OrderParameter;
use crate::config::{
    CouplingScanSettings, IntegratorSettings, OutputPaths, OutputToggles, ScanOutputPaths,
    ScanOutputToggles, SimulationParams,
};
use crate::scan::CouplingScanPoint;
use crate::simulation::{AcceptedStep, RunOutcome};
use crate::state::EnsembleState;

#[derive(Debug, Clone)]
pub struct OutputArtifacts {
    pub directory: PathBuf,
    pub phases: PathBuf,
    pub order: PathBuf,
    pub summary_json: PathBuf,
    pub order_png: PathBuf,
    pub order_svg: PathBuf,
    pub delimiter: u8,
    pub precision: usize,
    pub toggles: OutputToggles,
}

#[derive(Debug, Clone)]
pub struct ScanArtifacts {
    pub directory: PathBuf,
    pub csv: PathBuf,
    pub json: PathBuf,
    pub plot_png: PathBuf,
    pub plot_svg: PathBuf,
    pub toggles: ScanOutputToggles,
}

pub fn resolve_artifacts(paths: &OutputPaths) -> OutputArtifacts {
    let directory = paths.directory.clone();

    OutputArtifacts {
        directory: directory.clone(),
        phases: resolve_path(&directory, &paths.phases),
        order: resolve_path(&directory, &paths.order),
        summary_json: resolve_path(&directory, &paths.summary_json),
        order_png: resolve_path(&directory, &paths.order_png),
        order_svg: resolve_path(&directory, &paths.order_svg),
        delimiter: paths.delimiter,
        precision: paths.precision,
        toggles: paths.toggles,
    }
}

pub fn resolve_scan(paths: &ScanOutputPaths) -> ScanArtifacts {
    let directory = paths.directory.clone();

    ScanArtifacts {
        directory: directory.clone(),
        csv: resolve_path(&directory, &paths.csv),
        json: resolve_path(&directory, &paths.json),
        plot_png: resolve_path(&directory, &paths.plot_png),
        plot_svg: resolve_path(&directory, &paths.plot_svg),
        toggles: paths.toggles,
    }
}

fn resolve_path(base: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        base.join(relative)
    }
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create output directory {}", path.display()))?;
    }
    Ok(())
}

/// Append-only writers for the phase trajectory and the order parameter trace.
///
/// The phase file starts with `0 ω_0 … ω_{N-1}`; every accepted step then
/// adds `t θ_0 … θ_{N-1}` to it and `t r ψ` to the order file.
pub struct TrajectoryWriter {
    phases: csv::Writer<File>,
    order: csv::Writer<File>,
    phases_path: PathBuf,
    order_path: PathBuf,
    precision: usize,
    row: Vec<String>,
}

impl TrajectoryWriter {
    pub fn create(artifacts: &OutputArtifacts) -> Result<Self> {
        let phases = open_record_writer(&artifacts.phases, artifacts.delimiter)?;
        let order = open_record_writer(&artifacts.order, artifacts.delimiter)?;

        Ok(Self {
            phases,
            order,
            phases_path: artifacts.phases.clone(),
            order_path: artifacts.order.clone(),
            precision: artifacts.precision,
            row: Vec::new(),
        })
    }

    pub fn write_frequencies(&mut self, frequencies: &[f64]) -> Result<()> {
        self.row.clear();
        self.row.push(format_value(0.0, self.precision));
        for &omega in frequencies {
            self.row.push(format_value(omega, self.precision));
        }
        self.phases
            .write_record(&self.row)
            .with_context(|| format!("Failed to write frequencies to {}", self.phases_path.display()))
    }

    pub fn write_step(&mut self, step: &AcceptedStep<'_>) -> Result<()> {
        self.row.clear();
        self.row.push(format_value(step.time, self.precision));
        for &theta in step.phases {
            self.row.push(format_value(theta, self.precision));
        }
        self.phases
            .write_record(&self.row)
            .with_context(|| format!("Failed to write phases at t={:.6}", step.time))?;

        let precision = self.precision;
        self.order
            .write_record([
                format_value(step.time, precision),
                format_value(step.order.r, precision),
                format_value(step.order.psi, precision),
            ])
            .with_context(|| format!("Failed to write order parameter at t={:.6}", step.time))
    }

    pub fn finish(mut self) -> Result<()> {
        let phases = self
            .phases
            .flush()
            .with_context(|| format!("Failed to flush {}", self.phases_path.display()));
        let order = self
            .order
            .flush()
            .with_context(|| format!("Failed to flush {}", self.order_path.display()));
        phases.and(order)
    }
}

fn open_record_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Unable to create output file {}", path.display()))
}

fn format_value(value: f64, precision: usize) -> String {
    format!("{:.*e}", precision, value)
}

#[derive(Debug, Serialize)]
pub struct RunMetadata {
    pub oscillators: usize,
    pub coupling: f64,
    pub t_final: f64,
    pub sigma: f64,
    pub seed: u64,
    pub explicit_initial_state: bool,
    pub integrator: IntegratorSettings,
}

impl RunMetadata {
    pub fn new(params: &SimulationParams, seed: u64) -> Self {
        Self {
            oscillators: params.oscillators,
            coupling: params.coupling,
            t_final: params.t_final,
            sigma: params.sigma,
            seed,
            explicit_initial_state: params.initial_state.is_some(),
            integrator: params.integrator,
        }
    }
}

pub fn write_summary_json(
    path: &Path,
    metadata: &RunMetadata,
    state: &EnsembleState,
    outcome: &RunOutcome,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let oscillators: Vec<_> = state
        .labels
        .iter()
        .zip(&state.frequencies)
        .zip(&state.phases)
        .map(|((label, omega), theta)| {
            serde_json::json!({
                "label": label,
                "frequency": omega,
                "phase": theta,
                "phase_wrapped": EnsembleState::wrap_phase(*theta),
            })
        })
        .collect();

    let mut root = serde_json::Map::new();
    root.insert(
        "metadata".into(),
        serde_json::to_value(metadata).context("Failed to serialize run metadata")?,
    );
    root.insert(
        "final_time".into(),
        serde_json::json!(outcome.final_time),
    );
    root.insert(
        "final_order".into(),
        order_json(&outcome.final_order),
    );
    root.insert(
        "statistics".into(),
        serde_json::to_value(outcome.statistics)
            .context("Failed to serialize integrator statistics")?,
    );
    root.insert("oscillators".into(), serde_json::Value::Array(oscillators));

    let file = File::create(path)
        .with_context(|| format!("Unable to create JSON file {}", path.display()))?;

    serde_json::to_writer_pretty(file, &serde_json::Value::Object(root))
        .with_context(|| format!("Failed to write JSON payload to {}", path.display()))
}

fn order_json(order: &OrderParameter) -> serde_json::Value {
    serde_json::json!({ "r": order.r, "psi": order.psi })
}

pub fn write_scan_csv(path: &Path, points: &[CouplingScanPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(anyhow!("Coupling scan produced no points"));
    }

    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Unable to create CSV file {}", path.display()))?;

    writer.write_record([
        "coupling",
        "r_mean",
        "r_final",
        "psi_final",
        "accepted_steps",
        "rejected_steps",
    ])?;

    for point in points {
        writer.write_record([
            format!("{:.12e}", point.coupling),
            format!("{:.12e}", point.r_mean),
            format!("{:.12e}", point.final_order.r),
            format!("{:.12e}", point.final_order.psi),
            point.statistics.accepted_steps.to_string(),
            point.statistics.rejected_steps.to_string(),
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

pub fn write_scan_json(
    path: &Path,
    points: &[CouplingScanPoint],
    metadata: &RunMetadata,
    scan: &CouplingScanSettings,
    frequencies: &[f64],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut root = serde_json::Map::new();
    root.insert(
        "simulation".into(),
        serde_json::to_value(metadata).context("Failed to serialize scan metadata")?,
    );
    root.insert(
        "scan".into(),
        serde_json::to_value(scan).context("Failed to serialize scan settings")?,
    );
    root.insert("frequencies".into(), serde_json::json!(frequencies));

    let samples: Vec<_> = points
        .iter()
        .map(|point| {
            serde_json::json!({
                "coupling": point.coupling,
                "r_mean": point.r_mean,
                "final_order": order_json(&point.final_order),
                "statistics": {
                    "accepted_steps": point.statistics.accepted_steps,
                    "rejected_steps": point.statistics.rejected_steps,
                    "fn_evals": point.statistics.fn_evals,
                    "floor_clamps": point.statistics.floor_clamps,
                }
            })
        })
        .collect();
    root.insert("samples".into(), serde_json::Value::Array(samples));

    let file = File::create(path)
        .with_context(|| format!("Unable to create JSON file {}", path.display()))?;

    serde_json::to_writer_pretty(file, &serde_json::Value::Object(root))
        .with_context(|| format!("Failed to write JSON payload to {}", path.display()))
}
