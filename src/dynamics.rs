//! Phase dynamics of the mean-field Kuramoto model:
//!
//!   dθ_i/dt = ω_i + (K/N) Σ_j sin(θ_j − θ_i)

/// System of ordinary differential equations dy/dt = f(t, y).
pub trait OdeSystem {
    fn dimension(&self) -> usize;

    /// Writes f(t, y) into `dydt`. Both slices have length `dimension()`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Read-only coupling parameters: strength `K` and the natural frequencies.
#[derive(Debug, Clone, Copy)]
pub struct KuramotoSystem<'a> {
    pub coupling: f64,
    pub frequencies: &'a [f64],
}

impl<'a> KuramotoSystem<'a> {
    pub fn new(coupling: f64, frequencies: &'a [f64]) -> Self {
        Self {
            coupling,
            frequencies,
        }
    }

    /// Unscaled coupling sum Σ_j sin(θ_j − θ_i) for oscillator `i`.
    pub fn coupling_sum(phases: &[f64], i: usize) -> f64 {
        let theta_i = phases[i];
        phases.iter().map(|&theta_j| (theta_j - theta_i).sin()).sum()
    }
}

impl OdeSystem for KuramotoSystem<'_> {
    fn dimension(&self) -> usize {
        self.frequencies.len()
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let n = self.frequencies.len();
        debug_assert_eq!(y.len(), n);
        debug_assert_eq!(dydt.len(), n);
        if n == 0 {
            return;
        }

        let scale = self.coupling / n as f64;
        for (i, (out, &omega)) in dydt.iter_mut().zip(self.frequencies).enumerate() {
            *out = omega + scale * Self::coupling_sum(y, i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(system: &KuramotoSystem<'_>, phases: &[f64]) -> Vec<f64> {
        let mut dydt = vec![0.0; phases.len()];
        system.rhs(0.0, phases, &mut dydt);
        dydt
    }

    #[test]
    fn uncoupled_oscillators_run_at_natural_frequency() {
        let omega = [-0.3, 0.1, 0.2];
        let system = KuramotoSystem::new(0.0, &omega);
        let dydt = evaluate(&system, &[0.4, -2.0, 5.5]);
        assert_eq!(dydt, omega.to_vec());
    }

    #[test]
    fn single_oscillator_has_no_self_coupling() {
        let omega = [0.7];
        let system = KuramotoSystem::new(250.0, &omega);
        let dydt = evaluate(&system, &[1.3]);
        assert!((dydt[0] - 0.7).abs() < 1e-15);
    }

    #[test]
    fn pair_contributions_are_antisymmetric() {
        let phases = [0.3_f64, 1.9];
        let forward = (phases[1] - phases[0]).sin();
        let backward = (phases[0] - phases[1]).sin();
        assert!((forward + backward).abs() < 1e-15);

        let total: f64 = (0..4)
            .map(|i| KuramotoSystem::coupling_sum(&[0.3, 1.9, -0.8, 4.2], i))
            .sum();
        assert!(total.abs() < 1e-12);
    }

    #[test]
    fn global_phase_shift_leaves_derivative_unchanged() {
        let omega = [-0.5, 0.0, 0.25, 0.25];
        let phases = [0.1, 2.0, -1.2, 0.7];
        let shifted: Vec<f64> = phases.iter().map(|theta| theta + 3.7).collect();
        let system = KuramotoSystem::new(1.8, &omega);

        let base = evaluate(&system, &phases);
        let moved = evaluate(&system, &shifted);
        for (a, b) in base.iter().zip(&moved) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn two_oscillators_attract() {
        let omega = [0.0, 0.0];
        let system = KuramotoSystem::new(2.0, &omega);
        let dydt = evaluate(&system, &[0.0, 0.5]);
        assert!((dydt[0] - 0.5f64.sin()).abs() < 1e-12);
        assert!((dydt[1] + 0.5f64.sin()).abs() < 1e-12);
    }
}
