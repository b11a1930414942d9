//! Embedded Runge-Kutta-Fehlberg (4,5) integrator with local error control.
//!
//! The fifth-order solution is propagated and the difference to the
//! embedded fourth-order solution is used as the error estimate.

use serde::Serialize;
use thiserror::Error;

use crate::dynamics::OdeSystem;

const STAGES: usize = 6;

// Stage nodes.
const C: [f64; STAGES] = [0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0];

const A21: f64 = 1.0 / 4.0;
const A3: [f64; 2] = [3.0 / 32.0, 9.0 / 32.0];
const A4: [f64; 3] = [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0];
const A5: [f64; 4] = [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0];
const A6: [f64; 5] = [
    -8.0 / 27.0,
    2.0,
    -3544.0 / 2565.0,
    1859.0 / 4104.0,
    -11.0 / 40.0,
];

// Fifth-order weights.
const B5: [f64; STAGES] = [
    16.0 / 135.0,
    0.0,
    6656.0 / 12825.0,
    28561.0 / 56430.0,
    -9.0 / 50.0,
    2.0 / 55.0,
];

// Fifth-order minus fourth-order weights.
const E: [f64; STAGES] = [
    1.0 / 360.0,
    0.0,
    -128.0 / 4275.0,
    -2197.0 / 75240.0,
    1.0 / 50.0,
    2.0 / 55.0,
];

const METHOD_ORDER: f64 = 5.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("state dimension {found} does not match system dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("step size must be positive and finite, got {h}")]
    InvalidStepSize { h: f64 },
    #[error("current time {t} is not before the target time {t_final}")]
    TargetReached { t: f64, t_final: f64 },
    #[error("step size {h:e} at t = {t} cannot be reduced further to meet the tolerance")]
    StepSizeUnderflow { t: f64, h: f64 },
    #[error("tolerance not met after {rejections} rejected attempts at t = {t} (h = {h:e})")]
    TooManyRejections { t: f64, h: f64, rejections: u32 },
    #[error("state became non-finite during a step at t = {t} (h = {h:e})")]
    NonFiniteState { t: f64, h: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAdjustment {
    Decreased,
    Unchanged,
    Increased,
}

/// Error-per-step controller on the state only:
/// D_i = abs_tolerance + rel_tolerance · |y_i|.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepControl {
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    pub safety: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl StepControl {
    pub fn new(abs_tolerance: f64, rel_tolerance: f64) -> Self {
        Self {
            abs_tolerance,
            rel_tolerance,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
        }
    }

    pub fn error_ratio(&self, y: &[f64], y_err: &[f64]) -> f64 {
        y.iter()
            .zip(y_err)
            .map(|(value, err)| {
                let allowed = self.abs_tolerance + self.rel_tolerance * value.abs();
                err.abs() / allowed
            })
            .fold(0.0, f64::max)
    }

    /// Rescales `h` from the error ratio of the last attempt.
    pub fn adjust(&self, ratio: f64, h: &mut f64) -> StepAdjustment {
        if ratio > 1.1 {
            let factor = (self.safety / ratio.powf(1.0 / METHOD_ORDER)).max(self.min_factor);
            *h *= factor;
            StepAdjustment::Decreased
        } else if ratio < 0.5 {
            let factor = if ratio > 0.0 {
                (self.safety / ratio.powf(1.0 / (METHOD_ORDER + 1.0)))
                    .clamp(1.0, self.max_factor)
            } else {
                self.max_factor
            };
            *h *= factor;
            StepAdjustment::Increased
        } else {
            StepAdjustment::Unchanged
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Stats {
    pub accepted_steps: u64,
    pub rejected_steps: u64,
    pub fn_evals: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    pub h_used: f64,
    pub rejections: u32,
    pub adjustment: StepAdjustment,
}

pub struct Rkf45 {
    control: StepControl,
    max_rejections: u32,
    k: [Vec<f64>; STAGES],
    y0: Vec<f64>,
    y_stage: Vec<f64>,
    y_err: Vec<f64>,
    stats: Stats,
}

impl Rkf45 {
    pub fn new(dimension: usize, control: StepControl, max_rejections: u32) -> Self {
        Self {
            control,
            max_rejections,
            k: std::array::from_fn(|_| vec![0.0; dimension]),
            y0: vec![0.0; dimension],
            y_stage: vec![0.0; dimension],
            y_err: vec![0.0; dimension],
            stats: Stats::default(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.y0.len()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Advances `(t, y)` by one accepted step toward `t_final`.
    ///
    /// The step never passes `t_final`; a truncated last step lands on it
    /// exactly. Rejected attempts shrink `h` and retry from the saved state.
    /// On return `h` holds the suggested size for the next call. On error
    /// `y` and `t` are left as they were on entry.
    pub fn evolve_apply<S: OdeSystem + ?Sized>(
        &mut self,
        system: &S,
        t: &mut f64,
        t_final: f64,
        h: &mut f64,
        y: &mut [f64],
    ) -> Result<StepReport, IntegrationError> {
        let n = self.dimension();
        if system.dimension() != n || y.len() != n {
            return Err(IntegrationError::DimensionMismatch {
                expected: n,
                found: if y.len() != n { y.len() } else { system.dimension() },
            });
        }
        if !h.is_finite() || *h <= 0.0 {
            return Err(IntegrationError::InvalidStepSize { h: *h });
        }
        let t0 = *t;
        let remaining = t_final - t0;
        if remaining <= 0.0 {
            return Err(IntegrationError::TargetReached { t: t0, t_final });
        }

        let mut h0 = *h;
        let mut final_step = false;
        if h0 >= remaining {
            h0 = remaining;
            final_step = true;
        }

        self.y0.copy_from_slice(y);
        let mut rejections = 0u32;

        let (h_used, adjustment) = loop {
            self.attempt(system, t0, h0, y);

            let finite = y.iter().chain(&self.y_err).all(|v| v.is_finite());
            if !finite {
                y.copy_from_slice(&self.y0);
                return Err(IntegrationError::NonFiniteState { t: t0, h: h0 });
            }

            let h_attempt = h0;
            let ratio = self.control.error_ratio(y, &self.y_err);
            match self.control.adjust(ratio, &mut h0) {
                StepAdjustment::Decreased => {
                    y.copy_from_slice(&self.y0);
                    if h0 >= h_attempt || h0.is_nan() || t0 + h0 == t0 {
                        return Err(IntegrationError::StepSizeUnderflow {
                            t: t0,
                            h: h_attempt,
                        });
                    }
                    rejections += 1;
                    self.stats.rejected_steps += 1;
                    if rejections > self.max_rejections {
                        return Err(IntegrationError::TooManyRejections {
                            t: t0,
                            h: h0,
                            rejections,
                        });
                    }
                    final_step = false;
                }
                adjustment => break (h_attempt, adjustment),
            }
        };

        let t_next = if final_step { t_final } else { t0 + h_used };
        if t_next <= t0 {
            y.copy_from_slice(&self.y0);
            return Err(IntegrationError::StepSizeUnderflow { t: t0, h: h_used });
        }

        *t = t_next;
        *h = h0;
        self.stats.accepted_steps += 1;

        Ok(StepReport {
            h_used,
            rejections,
            adjustment,
        })
    }

    /// One RKF45 attempt from `(t, y)` with step `h`. Writes the fifth-order
    /// solution into `y` and the error estimate into `self.y_err`.
    fn attempt<S: OdeSystem + ?Sized>(&mut self, system: &S, t: f64, h: f64, y: &mut [f64]) {
        let [k1, k2, k3, k4, k5, k6] = &mut self.k;
        let y0 = &self.y0;
        let ys = &mut self.y_stage;

        system.rhs(t + C[0] * h, y0, k1);

        for i in 0..ys.len() {
            ys[i] = y0[i] + h * A21 * k1[i];
        }
        system.rhs(t + C[1] * h, ys, k2);

        for i in 0..ys.len() {
            ys[i] = y0[i] + h * (A3[0] * k1[i] + A3[1] * k2[i]);
        }
        system.rhs(t + C[2] * h, ys, k3);

        for i in 0..ys.len() {
            ys[i] = y0[i] + h * (A4[0] * k1[i] + A4[1] * k2[i] + A4[2] * k3[i]);
        }
        system.rhs(t + C[3] * h, ys, k4);

        for i in 0..ys.len() {
            ys[i] = y0[i] + h * (A5[0] * k1[i] + A5[1] * k2[i] + A5[2] * k3[i] + A5[3] * k4[i]);
        }
        system.rhs(t + C[4] * h, ys, k5);

        for i in 0..ys.len() {
            ys[i] = y0[i]
                + h * (A6[0] * k1[i]
                    + A6[1] * k2[i]
                    + A6[2] * k3[i]
                    + A6[3] * k4[i]
                    + A6[4] * k5[i]);
        }
        system.rhs(t + C[5] * h, ys, k6);

        for i in 0..y.len() {
            let stages = [k1[i], k2[i], k3[i], k4[i], k5[i], k6[i]];
            let mut increment = 0.0;
            let mut error = 0.0;
            for s in 0..STAGES {
                increment += B5[s] * stages[s];
                error += E[s] * stages[s];
            }
            y[i] = y0[i] + h * increment;
            self.y_err[i] = h * error;
        }

        self.stats.fn_evals += STAGES as u64;
    }
}
