use anyhow::{Context, Result, ensure};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::analysis::{OrderParameter, order_parameter};
use crate::config::IntegratorSettings;
use crate::dynamics::KuramotoSystem;
use crate::solver::{Rkf45, StepControl, Stats};
use crate::state::EnsembleState;

#[derive(Debug, Clone, Copy)]
pub struct AcceptedStep<'a> {
    pub index: u64,
    pub time: f64,
    pub phases: &'a [f64],
    pub order: OrderParameter,
    /// Step size the next call will start from, after the floor is applied.
    pub next_step: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunStatistics {
    pub accepted_steps: u64,
    pub rejected_steps: u64,
    pub fn_evals: u64,
    pub floor_clamps: u64,
    pub smallest_step: f64,
    pub largest_step: f64,
}

impl RunStatistics {
    fn from_solver(stats: Stats, floor_clamps: u64, smallest: f64, largest: f64) -> Self {
        Self {
            accepted_steps: stats.accepted_steps,
            rejected_steps: stats.rejected_steps,
            fn_evals: stats.fn_evals,
            floor_clamps,
            smallest_step: smallest,
            largest_step: largest,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunOutcome {
    pub final_time: f64,
    pub final_order: OrderParameter,
    pub statistics: RunStatistics,
}

/// Integrates the ensemble phases from t = 0 to `t_final`.
///
/// `on_step` sees every accepted step in time order. Phases in `state` are
/// advanced in place; after an error they hold the last accepted values.
pub fn propagate<F>(
    state: &mut EnsembleState,
    coupling: f64,
    t_final: f64,
    settings: &IntegratorSettings,
    mut on_step: F,
) -> Result<RunOutcome>
where
    F: FnMut(&AcceptedStep<'_>) -> Result<()>,
{
    ensure!(!state.is_empty(), "ensemble must contain at least one oscillator");
    ensure!(
        t_final.is_finite() && t_final > 0.0,
        "t_final must be positive, got {t_final}"
    );

    let EnsembleState {
        frequencies,
        phases,
        ..
    } = state;
    let system = KuramotoSystem::new(coupling, frequencies);
    let control = StepControl::new(settings.abs_tolerance, settings.rel_tolerance);
    let mut integrator = Rkf45::new(phases.len(), control, settings.max_rejections);

    let mut t = 0.0;
    let mut h = settings.initial_step;
    let mut index = 0u64;
    let mut floor_clamps = 0u64;
    let mut smallest = f64::INFINITY;
    let mut largest = 0.0_f64;
    let mut order = order_parameter(phases);

    info!(
        oscillators = phases.len(),
        coupling,
        t_final,
        r0 = order.r,
        "starting integration"
    );

    while t < t_final {
        let report = integrator
            .evolve_apply(&system, &mut t, t_final, &mut h, phases)
            .with_context(|| {
                format!(
                    "Integrator failed at t = {:.6} after {} accepted steps",
                    t,
                    integrator.stats().accepted_steps
                )
            })?;

        order = order_parameter(phases);

        if h < settings.min_step {
            debug!(t, h, min_step = settings.min_step, "step size clamped to floor");
            h = settings.min_step;
            floor_clamps += 1;
        }

        smallest = smallest.min(report.h_used);
        largest = largest.max(report.h_used);
        index += 1;

        trace!(
            index,
            t,
            h_used = report.h_used,
            rejections = report.rejections,
            r = order.r,
            "accepted step"
        );

        on_step(&AcceptedStep {
            index,
            time: t,
            phases,
            order,
            next_step: h,
        })?;
    }

    let statistics =
        RunStatistics::from_solver(integrator.stats(), floor_clamps, smallest, largest);

    info!(
        final_time = t,
        r = order.r,
        accepted = statistics.accepted_steps,
        rejected = statistics.rejected_steps,
        "integration finished"
    );

    Ok(RunOutcome {
        final_time: t,
        final_order: order,
        statistics,
    })
}
