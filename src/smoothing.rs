//! Holt's linear-trend exponential smoothing with a fixed level parameter.
//!
//! The level parameter `alpha` is supplied by the caller. The trend parameter
//! `beta` and the initial state `(l0, b0)` are estimated together by
//! minimising the one-step-ahead sum of squared errors over every
//! observation, the first one included.
//!
//! For a fixed `beta` the filter is linear in `(l0, b0)`, so the best initial
//! state has a closed form from a 2x2 least-squares system. The remaining
//! one-dimensional search over `beta in [0, alpha]` uses a coarse grid to
//! locate the basin and golden-section search to refine it.

use tracing::debug;

use crate::error::{AnalyticsError, Result};

const GRID_POINTS: usize = 21;
const GOLDEN_ITERATIONS: usize = 80;
const GOLDEN_TOLERANCE: f64 = 1e-10;
/// Leading points used for the straight-line seed of the initial state.
const SEED_POINTS: usize = 10;

/// A fitted additive-trend smoothing model.
#[derive(Debug, Clone, PartialEq)]
pub struct HoltLinear {
    alpha: f64,
    beta: f64,
    initial: (f64, f64),
    level: f64,
    trend: f64,
    sse: f64,
}

/// One-step-ahead forecasts `l_{t-1} + b_{t-1}` for every observation,
/// starting from `(level, trend)` before the first one.
fn fitted_values(data: &[f64], alpha: f64, beta: f64, level: f64, trend: f64) -> Vec<f64> {
    let (mut level, mut trend) = (level, trend);
    let mut fitted = Vec::with_capacity(data.len());
    for &value in data {
        let forecast = level + trend;
        fitted.push(forecast);

        let prev_level = level;
        level = alpha * value + (1.0 - alpha) * forecast;
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }
    fitted
}

/// Final level, final trend and SSE from the given initial state.
fn run(data: &[f64], alpha: f64, beta: f64, initial: (f64, f64)) -> (f64, f64, f64) {
    let (mut level, mut trend) = initial;
    let mut sse = 0.0;
    for &value in data {
        let forecast = level + trend;
        let error = value - forecast;
        sse += error * error;

        let prev_level = level;
        level = alpha * value + (1.0 - alpha) * forecast;
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }
    (level, trend, sse)
}

/// Ordinary least-squares line through the leading points, shifted one step
/// back so that `l0 + b0` predicts the first observation.
fn seed_state(data: &[f64]) -> (f64, f64) {
    let head = &data[..data.len().min(SEED_POINTS)];
    let n = head.len() as f64;
    let mean_t = (n - 1.0) / 2.0;
    let mean_y = head.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (t, y) in head.iter().enumerate() {
        let dt = t as f64 - mean_t;
        sxy += dt * (y - mean_y);
        sxx += dt * dt;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_t;
    (intercept - slope, slope)
}

/// Initial state minimising SSE for a fixed `beta`.
///
/// The fitted values decompose as `base + l0 * u + b0 * v`, where `base` is
/// the filter driven by the data from a zero state and `u`, `v` are the
/// undriven responses to a unit level and a unit trend.
fn optimal_state(data: &[f64], alpha: f64, beta: f64) -> Option<(f64, f64)> {
    let zeros = vec![0.0; data.len()];
    let base = fitted_values(data, alpha, beta, 0.0, 0.0);
    let u = fitted_values(&zeros, alpha, beta, 1.0, 0.0);
    let v = fitted_values(&zeros, alpha, beta, 0.0, 1.0);

    let (mut suu, mut suv, mut svv, mut sur, mut svr) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for t in 0..data.len() {
        let r = data[t] - base[t];
        suu += u[t] * u[t];
        suv += u[t] * v[t];
        svv += v[t] * v[t];
        sur += u[t] * r;
        svr += v[t] * r;
    }

    let det = suu * svv - suv * suv;
    if !det.is_finite() || det <= 1e-12 * suu * svv {
        return None;
    }
    let level = (sur * svv - svr * suv) / det;
    let trend = (svr * suu - sur * suv) / det;
    (level.is_finite() && trend.is_finite()).then_some((level, trend))
}

fn initial_state(data: &[f64], alpha: f64, beta: f64) -> (f64, f64) {
    optimal_state(data, alpha, beta).unwrap_or_else(|| seed_state(data))
}

fn sse_at(data: &[f64], alpha: f64, beta: f64) -> f64 {
    let sse = run(data, alpha, beta, initial_state(data, alpha, beta)).2;
    if sse.is_finite() {
        sse
    } else {
        f64::INFINITY
    }
}

impl HoltLinear {
    pub fn fit(data: &[f64], alpha: f64) -> Result<Self> {
        if data.len() < 2 {
            return Err(AnalyticsError::FitFailure(format!(
                "need at least 2 observations, got {}",
                data.len()
            )));
        }
        if !(0.0 < alpha && alpha <= 1.0) {
            return Err(AnalyticsError::FitFailure(format!(
                "smoothing level {alpha} outside (0, 1]"
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::FitFailure(
                "series contains non-finite values".to_string(),
            ));
        }

        let step = alpha / (GRID_POINTS - 1) as f64;
        let (best_idx, best_sse) = (0..GRID_POINTS)
            .map(|i| (i, sse_at(data, alpha, i as f64 * step)))
            .fold((0, f64::INFINITY), |best, candidate| {
                if candidate.1 < best.1 {
                    candidate
                } else {
                    best
                }
            });
        if !best_sse.is_finite() {
            return Err(AnalyticsError::FitFailure(
                "sum of squared errors diverged for every trend parameter".to_string(),
            ));
        }

        let mut lo = (best_idx as f64 - 1.0).max(0.0) * step;
        let mut hi = ((best_idx + 1) as f64 * step).min(alpha);
        let ratio = (5f64.sqrt() - 1.0) / 2.0;
        for _ in 0..GOLDEN_ITERATIONS {
            if hi - lo < GOLDEN_TOLERANCE {
                break;
            }
            let a = hi - ratio * (hi - lo);
            let b = lo + ratio * (hi - lo);
            if sse_at(data, alpha, a) <= sse_at(data, alpha, b) {
                hi = b;
            } else {
                lo = a;
            }
        }

        let refined = (lo + hi) / 2.0;
        let beta = if sse_at(data, alpha, refined) <= best_sse {
            refined
        } else {
            best_idx as f64 * step
        };

        let initial = initial_state(data, alpha, beta);
        let (level, trend, sse) = run(data, alpha, beta, initial);
        if !(level.is_finite() && trend.is_finite() && sse.is_finite()) {
            return Err(AnalyticsError::FitFailure(
                "smoothing state did not converge".to_string(),
            ));
        }

        debug!(alpha, beta, l0 = initial.0, b0 = initial.1, sse, "holt smoothing fitted");
        Ok(Self {
            alpha,
            beta,
            initial,
            level,
            trend,
            sse,
        })
    }

    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        (1..=steps)
            .map(|h| self.level + h as f64 * self.trend)
            .collect()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Estimated `(level, trend)` before the first observation.
    pub fn initial_state(&self) -> (f64, f64) {
        self.initial
    }

    /// `(level, trend)` after the last observation.
    pub fn components(&self) -> (f64, f64) {
        (self.level, self.trend)
    }

    pub fn sse(&self) -> f64 {
        self.sse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn linear_series_is_extrapolated_exactly() {
        let data: Vec<f64> = (0..10).map(|i| 10.0 + 2.0 * i as f64).collect();
        let model = HoltLinear::fit(&data, 0.2).unwrap();
        let forecast = model.forecast(3);
        assert_abs_diff_eq!(forecast[0], 30.0, epsilon = 1e-6);
        assert_abs_diff_eq!(forecast[2], 34.0, epsilon = 1e-6);
        let (l0, b0) = model.initial_state();
        assert_abs_diff_eq!(l0, 8.0, epsilon = 1e-6);
        assert_abs_diff_eq!(b0, 2.0, epsilon = 1e-6);
        assert!(model.sse() < 1e-9);
    }

    #[test]
    fn noisy_start_does_not_set_the_trend() {
        // The jump from 1 to 9 on day two is noise, not slope.
        let data = [1.0, 9.0, 2.0, 2.0, 3.0, 2.0, 2.0, 3.0, 2.0, 2.0];
        let model = HoltLinear::fit(&data, 0.2).unwrap();
        assert_eq!(model.alpha(), 0.2);
        let (level, trend) = model.components();
        assert_abs_diff_eq!(level, 1.8589, epsilon = 1e-3);
        assert_abs_diff_eq!(trend, -0.2113, epsilon = 1e-3);
        let total: f64 = model.forecast(30).iter().sum();
        assert_abs_diff_eq!(total, -42.47, epsilon = 0.05);
    }

    #[test]
    fn joint_estimate_beats_first_difference_start() {
        let data = [1.0, 9.0, 2.0, 2.0, 3.0, 2.0, 2.0, 3.0, 2.0, 2.0];
        let model = HoltLinear::fit(&data, 0.2).unwrap();
        let naive = run(&data, 0.2, model.beta(), (data[0], data[1] - data[0])).2;
        assert!(model.sse() <= naive);
    }

    #[test]
    fn beta_stays_within_level_bound() {
        let data = [3.0, 0.0, 4.0, 1.0, 0.0, 6.0, 2.0, 5.0, 0.0, 7.0];
        let model = HoltLinear::fit(&data, 0.2).unwrap();
        assert!(model.beta() >= 0.0 && model.beta() <= 0.2);
        assert!(model.forecast(30).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fitted_sse_is_no_worse_than_grid_endpoints() {
        let data = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0, 8.0, 7.0, 9.0];
        let model = HoltLinear::fit(&data, 0.2).unwrap();
        assert!(model.sse() <= sse_at(&data, 0.2, 0.0) + 1e-12);
        assert!(model.sse() <= sse_at(&data, 0.2, 0.2) + 1e-12);
    }

    #[test]
    fn seed_line_predicts_first_point() {
        let (l0, b0) = seed_state(&[4.0, 6.0, 8.0]);
        assert_abs_diff_eq!(l0 + b0, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b0, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn too_short_or_invalid_series_fail() {
        assert!(matches!(
            HoltLinear::fit(&[1.0], 0.2),
            Err(AnalyticsError::FitFailure(_))
        ));
        assert!(matches!(
            HoltLinear::fit(&[1.0, f64::NAN, 2.0], 0.2),
            Err(AnalyticsError::FitFailure(_))
        ));
        assert!(matches!(
            HoltLinear::fit(&[1.0, 2.0], 0.0),
            Err(AnalyticsError::FitFailure(_))
        ));
    }

    #[test]
    fn overflowing_series_is_a_fit_failure() {
        let mut data = vec![3.0; 12];
        data[6] = 1e200;
        assert!(matches!(
            HoltLinear::fit(&data, 0.2),
            Err(AnalyticsError::FitFailure(_))
        ));
    }
}
