//! Autoregressive forecaster with information-criterion order selection.
//!
//! The model is ARIMA(p, d, 0): closes are differenced `d` times (0 or 1),
//! an AR(p) with intercept is fitted by ordinary least squares for every
//! `p` up to `max_p`, and the order with the lowest AIC or BIC wins. All
//! candidate orders are fitted on the same sample (the first `max_p`
//! observations are held out) so their criteria are comparable.
//!
//! Forecast bands are 95% intervals from the model's ψ-weights; with `d = 1`
//! the weights are cumulated once so the interval grows like a random walk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use arimalab_core::domain::PriceSeries;

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.959_963_984_540_054;

/// Pivot magnitude below which the normal equations count as singular.
const PIVOT_EPSILON: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("normal equations are singular; the series has no usable variation")]
    Singular,

    #[error("forecast horizon must be at least 1, got {0}")]
    InvalidHorizon(usize),

    #[error("differencing order {0} is not supported (use 0 or 1)")]
    UnsupportedDifferencing(usize),
}

/// Order-selection criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Aic,
    Bic,
}

impl Criterion {
    /// `n·ln(σ²) + penalty·k` with `σ²` the maximum-likelihood residual variance.
    fn score(&self, rss: f64, n: usize, k: usize) -> f64 {
        let n_f = n as f64;
        let sigma2 = (rss / n_f).max(f64::MIN_POSITIVE);
        let penalty = match self {
            Criterion::Aic => 2.0,
            Criterion::Bic => n_f.ln(),
        };
        n_f * sigma2.ln() + penalty * k as f64
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criterion::Aic => f.write_str("AIC"),
            Criterion::Bic => f.write_str("BIC"),
        }
    }
}

/// Fits a forecasting model to a close series.
pub trait Forecaster {
    fn fit(&self, series: &PriceSeries) -> Result<FittedModel, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArForecaster {
    pub max_p: usize,
    pub diff: usize,
    pub criterion: Criterion,
}

impl Default for ArForecaster {
    fn default() -> Self {
        Self {
            max_p: 3,
            diff: 1,
            criterion: Criterion::Bic,
        }
    }
}

impl ArForecaster {
    /// Smallest series length that can be fitted.
    pub fn min_observations(&self) -> usize {
        self.diff + 2 * self.max_p + 2
    }
}

impl Forecaster for ArForecaster {
    fn fit(&self, series: &PriceSeries) -> Result<FittedModel, ModelError> {
        if self.diff > 1 {
            return Err(ModelError::UnsupportedDifferencing(self.diff));
        }
        let closes = series.closes();
        let needed = self.min_observations();
        if closes.len() < needed {
            return Err(ModelError::InsufficientData {
                needed,
                got: closes.len(),
            });
        }

        let y = difference(&closes, self.diff);
        let mut best: Option<Candidate> = None;
        for p in 0..=self.max_p {
            let candidate = match fit_ar(&y, p, self.max_p) {
                Ok(c) => c,
                Err(ModelError::Singular) => {
                    tracing::debug!(p, "skipping singular AR order");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let score = self.criterion.score(candidate.rss, candidate.n, p + 1);
            tracing::trace!(p, score, "candidate AR order");
            if best.as_ref().map_or(true, |b| score < b.score) {
                best = Some(Candidate { score, ..candidate });
            }
        }

        let best = best.ok_or(ModelError::Singular)?;
        let k = best.phi.len() + 1;
        let dof = best.n.saturating_sub(k).max(1);
        Ok(FittedModel {
            p: best.phi.len(),
            d: self.diff,
            intercept: best.intercept,
            phi: best.phi,
            sigma2: best.rss / dof as f64,
            criterion: self.criterion,
            criterion_value: best.score,
            n_obs: best.n,
            history: closes,
        })
    }
}

#[derive(Debug)]
struct Candidate {
    intercept: f64,
    phi: Vec<f64>,
    rss: f64,
    n: usize,
    score: f64,
}

/// Fit `y_t = c + Σ φ_i y_{t-i}` on `t in holdout..len`.
fn fit_ar(y: &[f64], p: usize, holdout: usize) -> Result<Candidate, ModelError> {
    let n = y.len().saturating_sub(holdout);
    let k = p + 1;
    if n <= k {
        return Err(ModelError::InsufficientData {
            needed: holdout + k + 1,
            got: y.len(),
        });
    }

    // Normal equations X'X β = X'y with X = [1, y_{t-1}, ..., y_{t-p}].
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    let mut row = vec![0.0; k];
    for t in holdout..y.len() {
        row[0] = 1.0;
        for i in 1..=p {
            row[i] = y[t - i];
        }
        for a in 0..k {
            xty[a] += row[a] * y[t];
            for b in 0..k {
                xtx[a][b] += row[a] * row[b];
            }
        }
    }
    let beta = solve(xtx, xty)?;

    let mut rss = 0.0;
    for t in holdout..y.len() {
        let fitted = beta[0] + (1..=p).map(|i| beta[i] * y[t - i]).sum::<f64>();
        rss += (y[t] - fitted).powi(2);
    }

    Ok(Candidate {
        intercept: beta[0],
        phi: beta[1..].to_vec(),
        rss,
        n,
        score: f64::INFINITY,
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|r| r.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON * scale {
            return Err(ModelError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for r in col + 1..n {
            let factor = a[r][col] / a[col][col];
            for c in col..n {
                a[r][c] -= factor * a[col][c];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for r in (0..n).rev() {
        let tail: f64 = (r + 1..n).map(|c| a[r][c] * x[c]).sum();
        x[r] = (b[r] - tail) / a[r][r];
    }
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(ModelError::Singular)
    }
}

fn difference(values: &[f64], d: usize) -> Vec<f64> {
    if d == 0 {
        return values.to_vec();
    }
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// A fitted ARIMA(p, d, 0) model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    p: usize,
    d: usize,
    intercept: f64,
    phi: Vec<f64>,
    sigma2: f64,
    criterion: Criterion,
    criterion_value: f64,
    n_obs: usize,
    history: Vec<f64>,
}

impl FittedModel {
    /// `(p, d, q)` with `q` always 0.
    pub fn order(&self) -> (usize, usize, usize) {
        (self.p, self.d, 0)
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.phi
    }

    /// Residual variance of the differenced series.
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    pub fn criterion_value(&self) -> f64 {
        self.criterion_value
    }

    /// Observations used in the fit, after differencing and holdout.
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Closes needed by [`forecast_from`](Self::forecast_from).
    pub fn min_history(&self) -> usize {
        self.p + self.d + 1
    }

    /// Forecast `horizon` steps past the end of the fitted series.
    pub fn predict(&self, horizon: usize) -> Result<Forecast, ModelError> {
        self.forecast_from(&self.history, horizon)
    }

    /// Forecast `horizon` steps past the end of `history` using the fitted
    /// coefficients.
    pub fn forecast_from(&self, history: &[f64], horizon: usize) -> Result<Forecast, ModelError> {
        if horizon == 0 {
            return Err(ModelError::InvalidHorizon(horizon));
        }
        if history.len() < self.min_history() {
            return Err(ModelError::InsufficientData {
                needed: self.min_history(),
                got: history.len(),
            });
        }

        let tail = &history[history.len() - self.min_history()..];
        let mut y = difference(tail, self.d);
        let mut mean = Vec::with_capacity(horizon);
        let mut level = tail[tail.len() - 1];
        for _ in 0..horizon {
            let n = y.len();
            let next = self.intercept
                + self
                    .phi
                    .iter()
                    .enumerate()
                    .map(|(i, phi)| phi * y[n - 1 - i])
                    .sum::<f64>();
            y.push(next);
            if self.d == 1 {
                level += next;
                mean.push(level);
            } else {
                mean.push(next);
            }
        }

        let weights = self.psi_weights(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        let mut cumulative = 0.0;
        for (h, m) in mean.iter().enumerate() {
            cumulative += weights[h].powi(2);
            let half_width = Z_95 * (self.sigma2 * cumulative).sqrt();
            lower.push(m - half_width);
            upper.push(m + half_width);
        }

        Ok(Forecast { mean, lower, upper })
    }

    /// ψ-weights of the AR polynomial, cumulated once when `d = 1`.
    fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let mut psi = vec![0.0; horizon];
        psi[0] = 1.0;
        for j in 1..horizon {
            psi[j] = (1..=self.p.min(j)).map(|i| self.phi[i - 1] * psi[j - i]).sum();
        }
        if self.d == 1 {
            let mut acc = 0.0;
            for w in psi.iter_mut() {
                acc += *w;
                *w = acc;
            }
        }
        psi
    }
}

/// Point forecasts with 95% confidence bounds, one entry per step ahead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Forecast {
    pub fn horizon(&self) -> usize {
        self.mean.len()
    }

    /// Lowest lower bound over all steps.
    pub fn band_low(&self) -> f64 {
        self.lower.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Highest upper bound over all steps.
    pub fn band_high(&self) -> f64 {
        self.upper.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn average(&self) -> f64 {
        if self.mean.is_empty() {
            return f64::NAN;
        }
        self.mean.iter().sum::<f64>() / self.mean.len() as f64
    }
}
