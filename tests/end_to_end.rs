use std::fs;

use coupled_oscillators::analysis::order_parameter;
use coupled_oscillators::config::{self, IntegratorSettings, RunOverrides};
use coupled_oscillators::initial_conditions::build_ensemble;
use coupled_oscillators::output::{
    RunMetadata, TrajectoryWriter, resolve_artifacts, write_summary_json,
};
use coupled_oscillators::simulation::propagate;
use coupled_oscillators::state::EnsembleState;

struct Recorded {
    times: Vec<f64>,
    coherence: Vec<f64>,
    phases: Vec<Vec<f64>>,
}

fn run(state: &mut EnsembleState, coupling: f64, t_final: f64) -> Recorded {
    let mut recorded = Recorded {
        times: Vec::new(),
        coherence: Vec::new(),
        phases: Vec::new(),
    };
    propagate(state, coupling, t_final, &IntegratorSettings::default(), |step| {
        recorded.times.push(step.time);
        recorded.coherence.push(step.order.r);
        recorded.phases.push(step.phases.to_vec());
        Ok(())
    })
    .unwrap();
    recorded
}

#[test]
fn free_running_pair_drifts_apart() {
    let mut state = EnsembleState::from_raw(&[-0.5, 0.5], &[0.0, 0.0]).unwrap();
    let recorded = run(&mut state, 0.0, 1.0);

    assert_eq!(*recorded.times.last().unwrap(), 1.0);
    assert!((state.phases[0] + 0.5).abs() < 1e-9);
    assert!((state.phases[1] - 0.5).abs() < 1e-9);

    assert!(recorded.coherence[0] < 1.0);
    assert!(recorded.coherence.windows(2).all(|pair| pair[1] < pair[0]));
    for (t, r) in recorded.times.iter().zip(&recorded.coherence) {
        assert!((r - (0.5 * t).cos()).abs() < 1e-9);
    }
}

#[test]
fn strong_coupling_pulls_identical_oscillators_together() {
    let mut state = EnsembleState::from_raw(&[0.0, 0.0, 0.0], &[0.0, 1.0, 2.5]).unwrap();
    let initial_r = order_parameter(&state.phases).r;
    let recorded = run(&mut state, 100.0, 1.0);

    let spread = |phases: &[f64]| {
        let max = phases.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = phases.iter().cloned().fold(f64::INFINITY, f64::min);
        max - min
    };
    assert!(spread(&state.phases) < 1e-3);
    assert!(spread(&state.phases) < spread(&[0.0, 1.0, 2.5]));

    let final_r = *recorded.coherence.last().unwrap();
    assert!(final_r > initial_r);
    assert!(final_r > 0.999_999);
}

#[test]
fn lone_oscillator_is_always_coherent() {
    let mut state = EnsembleState::from_raw(&[0.8], &[0.3]).unwrap();
    let recorded = run(&mut state, 50.0, 5.0);

    // A single centered frequency is zero, so the phase never moves.
    assert_eq!(state.frequencies, vec![0.0]);
    assert!((state.phases[0] - 0.3).abs() < 1e-12);
    assert!(recorded.coherence.iter().all(|r| (r - 1.0).abs() < 1e-12));
}

#[test]
fn accepted_times_increase_to_the_horizon() {
    let params = config::from_overrides(&RunOverrides {
        oscillators: Some(20),
        coupling: Some(1.5),
        t_final: Some(7.5),
        seed: Some(99),
        ..RunOverrides::default()
    })
    .unwrap();
    let mut state = build_ensemble(&params, 99).unwrap();
    let recorded = run(&mut state, params.coupling, params.t_final);

    assert!(recorded.times.windows(2).all(|pair| pair[1] > pair[0]));
    assert_eq!(*recorded.times.last().unwrap(), 7.5);
    assert!(recorded.coherence.iter().all(|r| (0.0..=1.0).contains(r)));
    assert_eq!(recorded.phases.len(), recorded.times.len());
}

#[test]
fn sinks_hold_header_and_one_record_per_step() {
    let dir = tempfile::tempdir().unwrap();
    let params = config::from_overrides(&RunOverrides {
        oscillators: Some(2),
        coupling: Some(0.0),
        t_final: Some(1.0),
        output_dir: Some(dir.path().to_path_buf()),
        ..RunOverrides::default()
    })
    .unwrap();
    let artifacts = resolve_artifacts(&params.output);

    let mut state = EnsembleState::from_raw(&[0.5, -0.5], &[0.0, 0.0]).unwrap();
    let mut writer = TrajectoryWriter::create(&artifacts).unwrap();
    writer.write_frequencies(&state.frequencies).unwrap();
    let outcome = propagate(&mut state, 0.0, 1.0, &params.integrator, |step| {
        writer.write_step(step)
    })
    .unwrap();
    writer.finish().unwrap();

    let phases = fs::read_to_string(&artifacts.phases).unwrap();
    let lines: Vec<&str> = phases.lines().collect();
    assert_eq!(lines[0], "0.00000e0 -5.00000e-1 5.00000e-1");
    assert_eq!(lines.len() as u64, outcome.statistics.accepted_steps + 1);
    assert!(lines[1..].iter().all(|line| line.split(' ').count() == 3));
    assert!(lines.last().unwrap().starts_with("1.00000e0 "));

    let order = fs::read_to_string(&artifacts.order).unwrap();
    let rows: Vec<Vec<f64>> = order
        .lines()
        .map(|line| line.split(' ').map(|v| v.parse().unwrap()).collect())
        .collect();
    assert_eq!(rows.len() as u64, outcome.statistics.accepted_steps);
    assert!(rows.iter().all(|row| row.len() == 3));
    assert!(rows.windows(2).all(|pair| pair[1][0] > pair[0][0]));

    write_summary_json(
        &artifacts.summary_json,
        &RunMetadata::new(&params, 0),
        &state,
        &outcome,
    )
    .unwrap();
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&artifacts.summary_json).unwrap()).unwrap();
    assert_eq!(summary["metadata"]["oscillators"], 2);
    assert_eq!(summary["oscillators"].as_array().unwrap().len(), 2);
    assert_eq!(summary["final_time"], 1.0);
}

#[test]
fn failed_run_leaves_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let params = config::from_overrides(&RunOverrides {
        oscillators: Some(2),
        coupling: Some(500.0),
        t_final: Some(10.0),
        output_dir: Some(dir.path().to_path_buf()),
        ..RunOverrides::default()
    })
    .unwrap();
    let artifacts = resolve_artifacts(&params.output);
    let strict = IntegratorSettings {
        initial_step: 1.0,
        abs_tolerance: 1e-14,
        max_rejections: 1,
        ..params.integrator
    };

    let mut state = EnsembleState::from_raw(&[0.0, 0.0], &[0.0, 2.0]).unwrap();
    let mut writer = TrajectoryWriter::create(&artifacts).unwrap();
    writer.write_frequencies(&state.frequencies).unwrap();
    let result = propagate(&mut state, params.coupling, params.t_final, &strict, |step| {
        writer.write_step(step)
    });
    writer.finish().unwrap();

    assert!(result.is_err());
    assert_eq!(state.phases, vec![0.0, 2.0]);
    let phases = fs::read_to_string(&artifacts.phases).unwrap();
    assert_eq!(phases.lines().count(), 1);
    assert!(fs::read_to_string(&artifacts.order).unwrap().is_empty());
}
