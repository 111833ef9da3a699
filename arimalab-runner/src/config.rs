//! Pipeline configuration, loaded from TOML.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration. CLI flags override individual fields after loading.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use arimalab_core::data::SourceSettings;
use arimalab_core::domain::{DateRange, DomainError};

use crate::backtest::Backtester;
use crate::model::{ArForecaster, Criterion};
use crate::strategy::BandAnchor;

/// Highest autoregressive order the fitter accepts.
pub const MAX_AR_ORDER: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid date range: {0}")]
    Range(#[from] DomainError),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub sources: SourceSettings,
    pub model: ModelConfig,
    pub forecast: ForecastConfig,
    pub backtest: BacktestConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub symbol: String,
    /// Seed for synthetic fallback and OHLCV synthesis.
    pub seed: u64,
    pub forecast_start: NaiveDate,
    /// Defaults to yesterday when absent.
    pub forecast_end: Option<NaiveDate>,
    pub backtest_start: NaiveDate,
    pub backtest_end: NaiveDate,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".into(),
            seed: 42,
            forecast_start: ymd(2024, 1, 1),
            forecast_end: None,
            backtest_start: ymd(2020, 1, 1),
            backtest_end: ymd(2025, 6, 24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub max_p: usize,
    pub diff: usize,
    /// Criterion for the forecast stage.
    pub criterion: Criterion,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_p: 3,
            diff: 1,
            criterion: Criterion::Bic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon: usize,
    /// Closes of history written next to the forecast.
    pub history_tail: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 5,
            history_tail: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub cash: f64,
    pub commission: f64,
    pub exclusive_orders: bool,
    pub band_horizon: usize,
    /// Bars seen before the rule starts deciding.
    pub min_history: usize,
    pub anchor: BandAnchor,
    /// Criterion for the model fitted on the backtest period.
    pub criterion: Criterion,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            commission: 0.001,
            exclusive_orders: true,
            band_horizon: 5,
            min_history: 30,
            anchor: BandAnchor::Trailing,
            criterion: Criterion::Aic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plots"),
        }
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };
        if self.data.symbol.trim().is_empty() {
            return Err(invalid("data.symbol", "must not be empty"));
        }
        if self.model.max_p > MAX_AR_ORDER {
            return Err(ConfigError::Invalid {
                field: "model.max_p",
                reason: format!("must be at most {MAX_AR_ORDER}"),
            });
        }
        if self.model.diff > 1 {
            return Err(invalid("model.diff", "must be 0 or 1"));
        }
        if self.forecast.horizon == 0 {
            return Err(invalid("forecast.horizon", "must be at least 1"));
        }
        if self.backtest.band_horizon == 0 {
            return Err(invalid("backtest.band_horizon", "must be at least 1"));
        }
        if !self.backtest.cash.is_finite() || self.backtest.cash <= 0.0 {
            return Err(invalid("backtest.cash", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.backtest.commission) {
            return Err(invalid("backtest.commission", "must be in [0, 1)"));
        }
        DateRange::new(self.data.backtest_start, self.data.backtest_end)?;
        if let Some(end) = self.data.forecast_end {
            DateRange::new(self.data.forecast_start, end)?;
        }
        Ok(())
    }

    /// Forecast window; an open end means the day before `today`.
    pub fn forecast_range(&self, today: NaiveDate) -> Result<DateRange, ConfigError> {
        let end = self
            .data
            .forecast_end
            .unwrap_or(today - Duration::days(1));
        Ok(DateRange::new(self.data.forecast_start, end)?)
    }

    pub fn backtest_range(&self) -> Result<DateRange, ConfigError> {
        Ok(DateRange::new(
            self.data.backtest_start,
            self.data.backtest_end,
        )?)
    }

    pub fn forecaster(&self) -> ArForecaster {
        ArForecaster {
            max_p: self.model.max_p,
            diff: self.model.diff,
            criterion: self.model.criterion,
        }
    }

    /// Same orders as the forecast model, scored with the backtest criterion.
    pub fn backtest_forecaster(&self) -> ArForecaster {
        ArForecaster {
            criterion: self.backtest.criterion,
            ..self.forecaster()
        }
    }

    pub fn backtester(&self) -> Backtester {
        Backtester {
            cash: self.backtest.cash,
            commission: self.backtest.commission,
            exclusive_orders: self.backtest.exclusive_orders,
        }
    }
}
