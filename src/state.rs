use std::f64::consts::{PI, TAU};

use anyhow::{Result, ensure};
use serde::Serialize;

/// Frequencies are mean-centered and sorted ascending on construction.
/// `labels[k]` is the index the k-th oscillator had before sorting.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleState {
    pub frequencies: Vec<f64>,
    pub phases: Vec<f64>,
    pub labels: Vec<usize>,
}

impl EnsembleState {
    pub fn from_raw(raw_frequencies: &[f64], phases: &[f64]) -> Result<Self> {
        ensure!(
            !raw_frequencies.is_empty(),
            "ensemble must contain at least one oscillator"
        );
        ensure!(
            raw_frequencies.len() == phases.len(),
            "frequency count {} does not match phase count {}",
            raw_frequencies.len(),
            phases.len()
        );
        ensure!(
            raw_frequencies.iter().chain(phases).all(|v| v.is_finite()),
            "initial frequencies and phases must be finite"
        );

        let (frequencies, labels) = center_and_sort(raw_frequencies);
        let phases = labels.iter().map(|&index| phases[index]).collect();

        Ok(Self {
            frequencies,
            phases,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Maps a phase into (-π, π].
    pub fn wrap_phase(theta: f64) -> f64 {
        let wrapped = PI - (PI - theta).rem_euclid(TAU);
        if wrapped <= -PI { wrapped + TAU } else { wrapped }
    }

    pub fn wrapped_phases(&self) -> Vec<f64> {
        self.phases.iter().map(|&theta| Self::wrap_phase(theta)).collect()
    }
}

/// `order[k]` is the input index of the k-th output value.
pub fn center_and_sort(raw: &[f64]) -> (Vec<f64>, Vec<usize>) {
    if raw.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mean = raw.iter().sum::<f64>() / raw.len() as f64;

    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| raw[a].total_cmp(&raw[b]));

    let centered = order.iter().map(|&index| raw[index] - mean).collect();
    (centered, order)
}
