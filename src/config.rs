use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
struct ConfigRoot {
    #[serde(default)]
    simulation: SimulationSection,
    #[serde(default)]
    integrator: IntegratorSection,
    #[serde(default)]
    output: OutputSection,
}

#[derive(Debug, Deserialize)]
struct CouplingScanConfigRoot {
    simulation: SimulationSection,
    #[serde(default)]
    integrator: IntegratorSection,
    scan: CouplingScanSection,
    scan_output: ScanOutputSection,
}

#[derive(Debug, Deserialize, Default)]
struct SimulationSection {
    #[serde(default)]
    oscillators: Option<usize>,
    #[serde(default)]
    coupling: Option<f64>,
    #[serde(default)]
    t_final: Option<f64>,
    #[serde(default)]
    sigma: Option<f64>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    initial_state: Option<InitialStateSection>,
}

#[derive(Debug, Deserialize, Clone)]
struct InitialStateSection {
    frequencies: Vec<f64>,
    phases: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct IntegratorSection {
    #[serde(default = "default_initial_step")]
    initial_step: f64,
    #[serde(default = "default_abs_tolerance")]
    abs_tolerance: f64,
    #[serde(default)]
    rel_tolerance: f64,
    #[serde(default = "default_min_step")]
    min_step: f64,
    #[serde(default = "default_max_rejections")]
    max_rejections: u32,
}

impl Default for IntegratorSection {
    fn default() -> Self {
        Self {
            initial_step: default_initial_step(),
            abs_tolerance: default_abs_tolerance(),
            rel_tolerance: 0.0,
            min_step: default_min_step(),
            max_rejections: default_max_rejections(),
        }
    }
}

fn default_initial_step() -> f64 {
    1e-2
}

fn default_abs_tolerance() -> f64 {
    1e-6
}

fn default_min_step() -> f64 {
    1e-5
}

fn default_max_rejections() -> u32 {
    1000
}

fn default_sigma() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
struct OutputSection {
    #[serde(default = "default_output_directory")]
    directory: PathBuf,
    #[serde(default = "default_phases_file")]
    phases: PathBuf,
    #[serde(default = "default_order_file")]
    order: PathBuf,
    #[serde(default = "default_summary_file")]
    summary_json: PathBuf,
    #[serde(default = "default_order_png")]
    order_png: PathBuf,
    #[serde(default = "default_order_svg")]
    order_svg: PathBuf,
    #[serde(default = "default_delimiter")]
    delimiter: char,
    #[serde(default = "default_precision")]
    precision: usize,
    #[serde(default)]
    toggles: OutputTogglesSection,
}

impl Default for OutputSection {
    fn default() -> Self {
        OutputSection {
            directory: default_output_directory(),
            phases: default_phases_file(),
            order: default_order_file(),
            summary_json: default_summary_file(),
            order_png: default_order_png(),
            order_svg: default_order_svg(),
            delimiter: default_delimiter(),
            precision: default_precision(),
            toggles: OutputTogglesSection::default(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

fn default_phases_file() -> PathBuf {
    PathBuf::from("osc.txt")
}

fn default_order_file() -> PathBuf {
    PathBuf::from("order.txt")
}

fn default_summary_file() -> PathBuf {
    PathBuf::from("summary.json")
}

fn default_order_png() -> PathBuf {
    PathBuf::from("order.png")
}

fn default_order_svg() -> PathBuf {
    PathBuf::from("order.svg")
}

fn default_delimiter() -> char {
    ' '
}

fn default_precision() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct OutputTogglesSection {
    #[serde(default = "default_true")]
    json: bool,
    #[serde(default = "default_true")]
    png: bool,
    #[serde(default)]
    svg: bool,
}

impl Default for OutputTogglesSection {
    fn default() -> Self {
        Self {
            json: true,
            png: true,
            svg: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CouplingScanSection {
    k_min: f64,
    k_max: f64,
    #[serde(default = "default_scan_samples")]
    sample_count: usize,
    #[serde(default = "default_burn_in_fraction")]
    burn_in_fraction: f64,
}

fn default_scan_samples() -> usize {
    16
}

fn default_burn_in_fraction() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
struct ScanOutputSection {
    directory: PathBuf,
    #[serde(default = "default_scan_csv")]
    csv: PathBuf,
    #[serde(default = "default_scan_json")]
    json: PathBuf,
    #[serde(default = "default_scan_png")]
    plot_png: PathBuf,
    #[serde(default = "default_scan_svg")]
    plot_svg: PathBuf,
    #[serde(default)]
    toggles: ScanOutputTogglesSection,
}

fn default_scan_csv() -> PathBuf {
    PathBuf::from("coupling_scan.csv")
}

fn default_scan_json() -> PathBuf {
    PathBuf::from("coupling_scan.json")
}

fn default_scan_png() -> PathBuf {
    PathBuf::from("coupling_scan.png")
}

fn default_scan_svg() -> PathBuf {
    PathBuf::from("coupling_scan.svg")
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct ScanOutputTogglesSection {
    #[serde(default = "default_true")]
    csv: bool,
    #[serde(default = "default_true")]
    json: bool,
    #[serde(default = "default_true")]
    png: bool,
    #[serde(default = "default_true")]
    svg: bool,
}

impl Default for ScanOutputTogglesSection {
    fn default() -> Self {
        Self {
            csv: true,
            json: true,
            png: true,
            svg: true,
        }
    }
}

/// Values supplied on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub oscillators: Option<usize>,
    pub coupling: Option<f64>,
    pub t_final: Option<f64>,
    pub sigma: Option<f64>,
    pub seed: Option<u64>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntegratorSettings {
    pub initial_step: f64,
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    pub min_step: f64,
    pub max_rejections: u32,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        let section = IntegratorSection::default();
        integrator_settings(&section)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitialStateSpec {
    pub frequencies: Vec<f64>,
    pub phases: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
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

#[derive(Debug, Clone, Copy)]
pub struct OutputToggles {
    pub json: bool,
    pub png: bool,
    pub svg: bool,
}

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub oscillators: usize,
    pub coupling: f64,
    pub t_final: f64,
    pub sigma: f64,
    pub seed: Option<u64>,
    pub initial_state: Option<InitialStateSpec>,
    pub integrator: IntegratorSettings,
    pub output: OutputPaths,
}

impl SimulationParams {
    pub fn summary_lines(&self) -> Vec<String> {
        let model = format!(
            "model: N = {}, K = {}, t_final = {}",
            self.oscillators, self.coupling, self.t_final
        );
        let initial = match &self.initial_state {
            Some(_) => "initial state: explicit (from configuration)".to_string(),
            None => format!(
                "initial state: random, sigma = {}, seed = {}",
                self.sigma,
                self.seed
                    .map(|seed| seed.to_string())
                    .unwrap_or_else(|| "drawn at startup".into())
            ),
        };
        let integrator = format!(
            "integrator: rkf45, h0 = {:e}, atol = {:e}, rtol = {:e}, h_min = {:e}, max rejections = {}",
            self.integrator.initial_step,
            self.integrator.abs_tolerance,
            self.integrator.rel_tolerance,
            self.integrator.min_step,
            self.integrator.max_rejections
        );
        let outputs = format!(
            "output dir: {} (json={}, png={}, svg={})",
            self.output.directory.display(),
            self.output.toggles.json,
            self.output.toggles.png,
            self.output.toggles.svg
        );

        vec![model, initial, integrator, outputs]
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CouplingScanSettings {
    pub k_min: f64,
    pub k_max: f64,
    pub sample_count: usize,
    pub burn_in_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct ScanOutputPaths {
    pub directory: PathBuf,
    pub csv: PathBuf,
    pub json: PathBuf,
    pub plot_png: PathBuf,
    pub plot_svg: PathBuf,
    pub toggles: ScanOutputToggles,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOutputToggles {
    pub csv: bool,
    pub json: bool,
    pub png: bool,
    pub svg: bool,
}

#[derive(Debug, Clone)]
pub struct CouplingScanParams {
    pub base: SimulationParams,
    pub scan: CouplingScanSettings,
    pub output: ScanOutputPaths,
}

pub fn load_from_file(path: impl AsRef<Path>, overrides: &RunOverrides) -> Result<SimulationParams> {
    let raw = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

    let parsed: ConfigRoot =
        toml::from_str(&raw).context("Failed to parse simulation configuration")?;
    load_from_sections(&parsed.simulation, &parsed.integrator, &parsed.output, overrides)
}

/// Parameters built from defaults and command line values only.
pub fn from_overrides(overrides: &RunOverrides) -> Result<SimulationParams> {
    let root = ConfigRoot::default();
    load_from_sections(&root.simulation, &root.integrator, &root.output, overrides)
}

pub fn load_coupling_scan_from_file(path: impl AsRef<Path>) -> Result<CouplingScanParams> {
    let raw = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

    let parsed: CouplingScanConfigRoot =
        toml::from_str(&raw).context("Failed to parse coupling scan configuration")?;

    // The scan drives K itself; a placeholder keeps the base parameters valid.
    let overrides = RunOverrides {
        coupling: Some(parsed.simulation.coupling.unwrap_or(parsed.scan.k_min)),
        ..RunOverrides::default()
    };
    let base = load_from_sections(
        &parsed.simulation,
        &parsed.integrator,
        &OutputSection::default(),
        &overrides,
    )?;

    let scan = &parsed.scan;
    ensure!(
        scan.k_min.is_finite() && scan.k_max.is_finite(),
        "Scan bounds must be finite"
    );
    ensure!(
        (0.0..1.0).contains(&scan.burn_in_fraction),
        "burn_in_fraction must lie in [0, 1)"
    );

    let scan_output = &parsed.scan_output;

    Ok(CouplingScanParams {
        base,
        scan: CouplingScanSettings {
            k_min: scan.k_min,
            k_max: scan.k_max,
            sample_count: scan.sample_count.max(1),
            burn_in_fraction: scan.burn_in_fraction,
        },
        output: ScanOutputPaths {
            directory: scan_output.directory.clone(),
            csv: scan_output.csv.clone(),
            json: scan_output.json.clone(),
            plot_png: scan_output.plot_png.clone(),
            plot_svg: scan_output.plot_svg.clone(),
            toggles: ScanOutputToggles {
                csv: scan_output.toggles.csv,
                json: scan_output.toggles.json,
                png: scan_output.toggles.png,
                svg: scan_output.toggles.svg,
            },
        },
    })
}

fn integrator_settings(section: &IntegratorSection) -> IntegratorSettings {
    IntegratorSettings {
        initial_step: section.initial_step,
        abs_tolerance: section.abs_tolerance,
        rel_tolerance: section.rel_tolerance,
        min_step: section.min_step,
        max_rejections: section.max_rejections,
    }
}

fn load_from_sections(
    simulation: &SimulationSection,
    integrator: &IntegratorSection,
    output: &OutputSection,
    overrides: &RunOverrides,
) -> Result<SimulationParams> {
    let initial_state = simulation
        .initial_state
        .clone()
        .map(|section| InitialStateSpec {
            frequencies: section.frequencies,
            phases: section.phases,
        });

    let oscillators = overrides
        .oscillators
        .or(simulation.oscillators)
        .or_else(|| initial_state.as_ref().map(|state| state.frequencies.len()))
        .ok_or_else(|| anyhow!("Oscillator count N is required"))?;
    let coupling = overrides
        .coupling
        .or(simulation.coupling)
        .ok_or_else(|| anyhow!("Coupling strength K is required"))?;
    let t_final = overrides
        .t_final
        .or(simulation.t_final)
        .ok_or_else(|| anyhow!("Simulation horizon t_final is required"))?;
    let sigma = overrides
        .sigma
        .or(simulation.sigma)
        .unwrap_or_else(default_sigma);

    ensure!(oscillators >= 1, "Oscillator count N must be positive");
    ensure!(coupling.is_finite(), "Coupling strength K must be finite");
    ensure!(
        t_final.is_finite() && t_final > 0.0,
        "Simulation horizon t_final must be positive"
    );
    ensure!(
        sigma.is_finite() && sigma >= 0.0,
        "Frequency spread sigma must be non-negative"
    );

    if let Some(state) = &initial_state {
        ensure!(
            state.frequencies.len() == oscillators && state.phases.len() == oscillators,
            "Explicit initial state must hold {} frequencies and {} phases (found {} and {})",
            oscillators,
            oscillators,
            state.frequencies.len(),
            state.phases.len()
        );
    }

    let integrator = integrator_settings(integrator);
    validate_integrator(&integrator)?;

    let mut delimiter = [0u8; 4];
    ensure!(
        output.delimiter.is_ascii(),
        "Output delimiter must be a single ASCII character"
    );
    output.delimiter.encode_utf8(&mut delimiter);
    ensure!(
        (1..=17).contains(&output.precision),
        "Output precision must be between 1 and 17 digits"
    );

    let directory = overrides
        .output_dir
        .clone()
        .unwrap_or_else(|| output.directory.clone());

    Ok(SimulationParams {
        oscillators,
        coupling,
        t_final,
        sigma,
        seed: overrides.seed.or(simulation.seed),
        initial_state,
        integrator,
        output: OutputPaths {
            directory,
            phases: output.phases.clone(),
            order: output.order.clone(),
            summary_json: output.summary_json.clone(),
            order_png: output.order_png.clone(),
            order_svg: output.order_svg.clone(),
            delimiter: delimiter[0],
            precision: output.precision,
            toggles: OutputToggles {
                json: output.toggles.json,
                png: output.toggles.png,
                svg: output.toggles.svg,
            },
        },
    })
}

fn validate_integrator(settings: &IntegratorSettings) -> Result<()> {
    ensure!(
        settings.initial_step.is_finite() && settings.initial_step > 0.0,
        "Initial step size must be positive"
    );
    ensure!(
        settings.min_step.is_finite() && settings.min_step > 0.0,
        "Minimum step size must be positive"
    );
    ensure!(
        settings.abs_tolerance >= 0.0 && settings.rel_tolerance >= 0.0,
        "Tolerances must be non-negative"
    );
    ensure!(
        settings.abs_tolerance > 0.0 || settings.rel_tolerance > 0.0,
        "At least one of abs_tolerance and rel_tolerance must be positive"
    );
    ensure!(
        settings.max_rejections >= 1,
        "max_rejections must be at least one"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(n: usize, k: f64, t_final: f64) -> RunOverrides {
        RunOverrides {
            oscillators: Some(n),
            coupling: Some(k),
            t_final: Some(t_final),
            ..RunOverrides::default()
        }
    }

    #[test]
    fn defaults_follow_reference_run() {
        let params = from_overrides(&cli(50, 0.5, 100.0)).unwrap();
        assert_eq!(params.oscillators, 50);
        assert_eq!(params.sigma, 0.5);
        assert_eq!(params.integrator.initial_step, 1e-2);
        assert_eq!(params.integrator.abs_tolerance, 1e-6);
        assert_eq!(params.integrator.rel_tolerance, 0.0);
        assert_eq!(params.integrator.min_step, 1e-5);
        assert_eq!(params.output.phases, PathBuf::from("osc.txt"));
        assert_eq!(params.output.order, PathBuf::from("order.txt"));
        assert_eq!(params.output.delimiter, b' ');
    }

    #[test]
    fn missing_invocation_parameters_are_fatal() {
        let err = from_overrides(&RunOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("Oscillator count"));

        let partial = RunOverrides {
            oscillators: Some(3),
            ..RunOverrides::default()
        };
        assert!(from_overrides(&partial).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(from_overrides(&cli(0, 1.0, 1.0)).is_err());
        assert!(from_overrides(&cli(3, f64::NAN, 1.0)).is_err());
        assert!(from_overrides(&cli(3, 1.0, 0.0)).is_err());
        assert!(from_overrides(&cli(3, 1.0, -2.0)).is_err());
    }

    #[test]
    fn file_values_are_overridden_by_cli() {
        let raw = r#"
            [simulation]
            oscillators = 10
            coupling = 2.0
            t_final = 5.0
            sigma = 0.1
            seed = 9

            [integrator]
            abs_tolerance = 1e-8

            [output]
            directory = "runs"
            delimiter = ","
            [output.toggles]
            png = false
        "#;
        let parsed: ConfigRoot = toml::from_str(raw).unwrap();
        let overrides = RunOverrides {
            coupling: Some(4.0),
            ..RunOverrides::default()
        };
        let params = load_from_sections(
            &parsed.simulation,
            &parsed.integrator,
            &parsed.output,
            &overrides,
        )
        .unwrap();

        assert_eq!(params.oscillators, 10);
        assert_eq!(params.coupling, 4.0);
        assert_eq!(params.seed, Some(9));
        assert_eq!(params.integrator.abs_tolerance, 1e-8);
        assert_eq!(params.integrator.initial_step, 1e-2);
        assert_eq!(params.output.directory, PathBuf::from("runs"));
        assert_eq!(params.output.delimiter, b',');
        assert!(!params.output.toggles.png);
        assert!(params.output.toggles.json);
    }

    #[test]
    fn explicit_initial_state_sets_oscillator_count() {
        let raw = r#"
            [simulation]
            coupling = 0.0
            t_final = 1.0
            [simulation.initial_state]
            frequencies = [-0.5, 0.5]
            phases = [0.0, 0.0]
        "#;
        let parsed: ConfigRoot = toml::from_str(raw).unwrap();
        let params = load_from_sections(
            &parsed.simulation,
            &parsed.integrator,
            &parsed.output,
            &RunOverrides::default(),
        )
        .unwrap();
        assert_eq!(params.oscillators, 2);
        assert!(params.initial_state.is_some());

        let mismatched = RunOverrides {
            oscillators: Some(3),
            ..RunOverrides::default()
        };
        assert!(
            load_from_sections(
                &parsed.simulation,
                &parsed.integrator,
                &parsed.output,
                &mismatched,
            )
            .is_err()
        );
    }

    #[test]
    fn integrator_settings_are_validated() {
        let mut settings = IntegratorSettings::default();
        assert!(validate_integrator(&settings).is_ok());
        settings.min_step = 0.0;
        assert!(validate_integrator(&settings).is_err());

        let mut settings = IntegratorSettings::default();
        settings.abs_tolerance = 0.0;
        assert!(validate_integrator(&settings).is_err());
    }
}
