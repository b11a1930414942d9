use serde::Serialize;

/// Kuramoto order parameter r·e^{iψ} = (1/N) Σ_k e^{iθ_k}.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderParameter {
    pub r: f64,
    pub psi: f64,
}

pub fn order_parameter(phases: &[f64]) -> OrderParameter {
    if phases.is_empty() {
        return OrderParameter { r: 0.0, psi: 0.0 };
    }

    let n = phases.len() as f64;
    let (sum_cos, sum_sin) = phases
        .iter()
        .fold((0.0, 0.0), |(c, s), theta| (c + theta.cos(), s + theta.sin()));
    let rx = sum_cos / n;
    let ry = sum_sin / n;

    OrderParameter {
        r: rx.hypot(ry).min(1.0),
        psi: ry.atan2(rx),
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderSample {
    pub time: f64,
    pub r: f64,
    pub psi: f64,
}

/// Time-weighted mean of r over (from, t_last].
///
/// Each sample's r is held over the interval back to the previous sample.
/// The trace starts at t = 0, so the first sample covers (0, t_1].
pub fn time_averaged_coherence(trace: &[OrderSample], from: f64) -> Option<f64> {
    let mut weighted = 0.0;
    let mut span = 0.0;
    let mut previous_time = 0.0_f64;

    for sample in trace {
        if sample.time > from {
            let width = sample.time - previous_time.max(from);
            weighted += sample.r * width;
            span += width;
        }
        previous_time = sample.time;
    }

    if span > 0.0 {
        Some(weighted / span)
    } else {
        trace.last().map(|sample| sample.r)
    }
}
