use anyhow::{Context, Result};
use tracing::info;

use crate::analysis::{OrderParameter, OrderSample, time_averaged_coherence};
use crate::config::{CouplingScanSettings, IntegratorSettings};
use crate::simulation::{RunStatistics, propagate};
use crate::state::EnsembleState;

#[derive(Debug, Clone, Copy)]
pub struct CouplingScanPoint {
    pub coupling: f64,
    pub r_mean: f64,
    pub final_order: OrderParameter,
    pub statistics: RunStatistics,
}

#[derive(Debug, Clone)]
pub struct CouplingScanResult {
    pub points: Vec<CouplingScanPoint>,
    pub scan: CouplingScanSettings,
}

/// Integrates the same initial ensemble once per coupling strength.
pub fn run_coupling_scan(
    initial: &EnsembleState,
    t_final: f64,
    integrator: &IntegratorSettings,
    scan: &CouplingScanSettings,
) -> Result<CouplingScanResult> {
    let couplings = linspace(scan.k_min, scan.k_max, scan.sample_count);
    let burn_in = scan.burn_in_fraction * t_final;
    let mut points = Vec::with_capacity(couplings.len());

    for (idx, &coupling) in couplings.iter().enumerate() {
        info!(
            "[coupling-scan] running sample {}/{} with K = {:.6}",
            idx + 1,
            couplings.len(),
            coupling
        );

        let mut state = initial.clone();
        let mut trace: Vec<OrderSample> = Vec::new();
        let outcome = propagate(&mut state, coupling, t_final, integrator, |step| {
            trace.push(OrderSample {
                time: step.time,
                r: step.order.r,
                psi: step.order.psi,
            });
            Ok(())
        })
        .with_context(|| format!("Run failed for K = {:.6}", coupling))?;

        let r_mean =
            time_averaged_coherence(&trace, burn_in).unwrap_or(outcome.final_order.r);

        points.push(CouplingScanPoint {
            coupling,
            r_mean,
            final_order: outcome.final_order,
            statistics: outcome.statistics,
        });
    }

    Ok(CouplingScanResult {
        points,
        scan: *scan,
    })
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![start];
    }

    let step = (end - start) / (count as f64 - 1.0);
    (0..count).map(|i| start + step * i as f64).collect()
}
