//! ArimaLab Runner: model fitting, band-rule backtests, metrics, reports.
//!
//! This crate builds on `arimalab-core` to provide:
//! - Autoregressive forecaster with AIC/BIC order selection
//! - Confidence-band decision rule and bar-by-bar backtester
//! - Performance metrics
//! - Text and CSV reports with SVG charts
//! - TOML pipeline configuration and the forecast/backtest stages

pub mod backtest;
pub mod chart;
pub mod config;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod strategy;

pub use backtest::{BacktestError, BacktestResult, Backtester, EquityPoint, Trade};
pub use config::{ConfigError, PipelineConfig};
pub use metrics::BacktestStats;
pub use model::{ArForecaster, Criterion, FittedModel, Forecast, Forecaster, ModelError};
pub use pipeline::{run_backtest, run_forecast, StageOutcome, StageReport};
pub use report::DatasetInfo;
pub use strategy::{BandAnchor, BandRule, Decision, DecisionRule, PositionSide};
