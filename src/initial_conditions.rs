use std::f64::consts::{PI, TAU};

use anyhow::{Context, Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::info;

use crate::config::{InitialStateSpec, SimulationParams};
use crate::state::EnsembleState;

pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) => seed,
        None => {
            let seed = rand::thread_rng().gen();
            info!(seed, "no seed configured, drew a fresh one");
            seed
        }
    }
}

/// Phases uniform on (-π, π], frequencies normal with standard deviation `sigma`.
pub fn random_ensemble<R: Rng + ?Sized>(
    rng: &mut R,
    oscillators: usize,
    sigma: f64,
) -> Result<EnsembleState> {
    ensure!(oscillators >= 1, "oscillator count must be positive");
    ensure!(
        sigma.is_finite() && sigma >= 0.0,
        "frequency spread sigma must be finite and non-negative, got {sigma}"
    );
    let normal = Normal::new(0.0, sigma)
        .with_context(|| format!("invalid frequency spread sigma = {sigma}"))?;

    let mut phases = Vec::with_capacity(oscillators);
    let mut frequencies = Vec::with_capacity(oscillators);
    for _ in 0..oscillators {
        phases.push(PI - TAU * rng.gen::<f64>());
        frequencies.push(normal.sample(rng));
    }

    EnsembleState::from_raw(&frequencies, &phases)
}

pub fn build_ensemble(params: &SimulationParams, seed: u64) -> Result<EnsembleState> {
    match &params.initial_state {
        Some(InitialStateSpec {
            frequencies,
            phases,
        }) => EnsembleState::from_raw(frequencies, phases)
            .context("invalid explicit initial state"),
        None => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            random_ensemble(&mut rng, params.oscillators, params.sigma)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_phases_stay_in_principal_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let state = random_ensemble(&mut rng, 500, 0.5).unwrap();
        assert_eq!(state.len(), 500);
        assert!(state.phases.iter().all(|&theta| theta > -PI && theta <= PI));
    }

    #[test]
    fn random_frequencies_are_centered_and_sorted() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let state = random_ensemble(&mut rng, 200, 0.5).unwrap();
        let sum: f64 = state.frequencies.iter().sum();
        assert!(sum.abs() < 1e-10);
        assert!(state.frequencies.windows(2).all(|pair| pair[0] <= pair[1]));

        let mut labels = state.labels.clone();
        labels.sort_unstable();
        assert_eq!(labels, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let first = random_ensemble(&mut ChaCha8Rng::seed_from_u64(3), 16, 0.5).unwrap();
        let second = random_ensemble(&mut ChaCha8Rng::seed_from_u64(3), 16, 0.5).unwrap();
        assert_eq!(first.frequencies, second.frequencies);
        assert_eq!(first.phases, second.phases);
    }

    #[test]
    fn zero_spread_gives_identical_frequencies() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let state = random_ensemble(&mut rng, 4, 0.0).unwrap();
        assert!(state.frequencies.iter().all(|&w| w == 0.0));
    }

    #[test]
    fn negative_spread_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert!(random_ensemble(&mut rng, 4, -1.0).is_err());
        assert!(random_ensemble(&mut rng, 4, -1e-9).is_err());
        assert!(random_ensemble(&mut rng, 4, f64::NAN).is_err());
    }
}
