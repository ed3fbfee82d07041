//! Seasonal ARIMA forecaster restored from a fitted artifact.
//!
//! The artifact carries the fitted coefficients and the training series. The
//! seasonal and differencing polynomials are multiplied out once at load time
//! into a single ARMA recursion on the original scale:
//!
//! `y_t = sum(a_k * y_{t-k}) + e_t + sum(m_k * e_{t-k})`
//!
//! Point forecasts run that recursion with future innovations at zero;
//! interval widths come from the psi-weights of the same expansion.

use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnalyticsError, Result};

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarimaParams {
    #[serde(default)]
    pub ar: Vec<f64>,
    #[serde(default)]
    pub ma: Vec<f64>,
    #[serde(default)]
    pub seasonal_ar: Vec<f64>,
    #[serde(default)]
    pub seasonal_ma: Vec<f64>,
    pub sigma2: f64,
}

/// On-disk form of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarimaArtifact {
    /// `(p, d, q)`
    pub order: [usize; 3],
    /// `(P, D, Q, s)`
    pub seasonal_order: [usize; 4],
    pub params: SarimaParams,
    /// Date of `history[0]`; the series is daily.
    pub start_date: NaiveDate,
    pub history: Vec<f64>,
    /// In-sample innovations from the training filter, aligned with
    /// `history`. Recomputed by conditional sum of squares when absent.
    #[serde(default)]
    pub residuals: Option<Vec<f64>>,
}

/// Point forecast with symmetric interval bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalForecast {
    pub dates: Vec<NaiveDate>,
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalArima {
    ar_expanded: Vec<f64>,
    ma_expanded: Vec<f64>,
    sigma2: f64,
    start_date: NaiveDate,
    history: Vec<f64>,
    residuals: Vec<f64>,
}

fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 + sign * sum(c_i * B^(i * stride))`
fn lag_polynomial(coefficients: &[f64], stride: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coefficients.len() * stride + 1];
    poly[0] = 1.0;
    for (i, c) in coefficients.iter().enumerate() {
        poly[(i + 1) * stride] = sign * c;
    }
    poly
}

fn differencing(order: usize, stride: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..order {
        poly = multiply(&poly, &lag_polynomial(&[1.0], stride, -1.0));
    }
    poly
}

impl SeasonalArima {
    pub fn from_artifact(artifact: SarimaArtifact) -> std::result::Result<Self, String> {
        let [p, d, q] = artifact.order;
        let [sp, sd, sq, period] = artifact.seasonal_order;
        let params = &artifact.params;

        if params.ar.len() != p || params.ma.len() != q {
            return Err(format!(
                "order ({p}, {d}, {q}) does not match {} AR / {} MA coefficients",
                params.ar.len(),
                params.ma.len()
            ));
        }
        if params.seasonal_ar.len() != sp || params.seasonal_ma.len() != sq {
            return Err(format!(
                "seasonal order ({sp}, {sd}, {sq}, {period}) does not match {} / {} coefficients",
                params.seasonal_ar.len(),
                params.seasonal_ma.len()
            ));
        }
        if period == 0 && (sp + sd + sq) > 0 {
            return Err("seasonal period must be positive".to_string());
        }
        if !(params.sigma2.is_finite() && params.sigma2 >= 0.0) {
            return Err(format!("invalid innovation variance {}", params.sigma2));
        }

        let stride = period.max(1);
        let ar_poly = [
            lag_polynomial(&params.ar, 1, -1.0),
            lag_polynomial(&params.seasonal_ar, stride, -1.0),
            differencing(d, 1),
            differencing(sd, stride),
        ]
        .iter()
        .fold(vec![1.0], |acc, poly| multiply(&acc, poly));
        let ma_poly = multiply(
            &lag_polynomial(&params.ma, 1, 1.0),
            &lag_polynomial(&params.seasonal_ma, stride, 1.0),
        );

        let ar_expanded: Vec<f64> = ar_poly[1..].iter().map(|c| -c).collect();
        let ma_expanded = ma_poly[1..].to_vec();

        if artifact.history.len() <= ar_expanded.len() {
            return Err(format!(
                "history of {} days is too short for {} autoregressive lags",
                artifact.history.len(),
                ar_expanded.len()
            ));
        }
        if artifact.history.iter().any(|v| !v.is_finite()) {
            return Err("history contains non-finite values".to_string());
        }

        let residuals = match artifact.residuals {
            Some(residuals) if residuals.len() == artifact.history.len() => residuals,
            Some(residuals) => {
                return Err(format!(
                    "{} residuals for {} history points",
                    residuals.len(),
                    artifact.history.len()
                ))
            }
            None => conditional_residuals(&artifact.history, &ar_expanded, &ma_expanded),
        };

        Ok(Self {
            ar_expanded,
            ma_expanded,
            sigma2: params.sigma2,
            start_date: artifact.start_date,
            history: artifact.history,
            residuals,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let invalid = |reason: String| AnalyticsError::Artifact {
            path: origin.clone(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
        let artifact: SarimaArtifact =
            serde_json::from_str(&raw).map_err(|err| invalid(err.to_string()))?;
        let model = Self::from_artifact(artifact).map_err(invalid)?;
        info!(path = %origin, cutoff = %model.cutoff(), "seasonal forecaster loaded");
        Ok(model)
    }

    /// Last date of the training series.
    pub fn cutoff(&self) -> NaiveDate {
        self.start_date + Duration::days(self.history.len() as i64 - 1)
    }

    fn psi_weights(&self, count: usize) -> Vec<f64> {
        let mut psi = Vec::with_capacity(count);
        for j in 0..count {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = self.ma_expanded.get(j - 1).copied().unwrap_or(0.0);
            for (k, a) in self.ar_expanded.iter().enumerate().take(j) {
                value += a * psi[j - k - 1];
            }
            psi.push(value);
        }
        psi
    }

    /// Forecast `steps` days past the cutoff with `z`-scaled bounds.
    pub fn forecast(&self, steps: usize, z: f64) -> IntervalForecast {
        let n = self.history.len();
        let mut values = self.history.clone();
        values.reserve(steps);

        for t in n..n + steps {
            let mut pred: f64 = self
                .ar_expanded
                .iter()
                .enumerate()
                .map(|(k, a)| a * values[t - k - 1])
                .sum();
            for (k, m) in self.ma_expanded.iter().enumerate() {
                let lag = k + 1;
                // Future innovations have zero expectation.
                if lag <= t && t - lag < n {
                    pred += m * self.residuals[t - lag];
                }
            }
            values.push(pred);
        }

        let psi = self.psi_weights(steps);
        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(steps);
        let mut upper = Vec::with_capacity(steps);
        for (h, mean) in values[n..].iter().enumerate() {
            cumulative += psi[h] * psi[h];
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(mean - half_width);
            upper.push(mean + half_width);
        }

        let cutoff = self.cutoff();
        IntervalForecast {
            dates: (1..=steps as i64).map(|h| cutoff + Duration::days(h)).collect(),
            mean: values[n..].to_vec(),
            lower,
            upper,
        }
    }
}

fn conditional_residuals(history: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut residuals = vec![0.0; history.len()];
    for t in ar.len()..history.len() {
        let mut pred: f64 = ar
            .iter()
            .enumerate()
            .map(|(k, a)| a * history[t - k - 1])
            .sum();
        for (k, m) in ma.iter().enumerate() {
            if k < t {
                pred += m * residuals[t - k - 1];
            }
        }
        residuals[t] = history[t] - pred;
    }
    residuals
}
