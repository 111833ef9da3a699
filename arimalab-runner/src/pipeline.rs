//! Forecast and backtest stages: acquire → fit → run → report and chart.
//!
//! Acquisition, snapshot and I/O problems propagate as errors. Model and
//! backtest failures end the stage with [`StageOutcome::Failed`] after an
//! `error` log, so the caller can exit cleanly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use arimalab_core::data::snapshot::load_snapshot;
use arimalab_core::data::{Acquired, DataSource, Orchestrator};
use arimalab_core::domain::{OhlcvTable, PriceSeries};
use arimalab_core::fingerprint::{series_fingerprint, table_fingerprint, DatasetHash};

use crate::config::PipelineConfig;
use crate::model::Forecaster;
use crate::report::{self, DatasetInfo};
use crate::strategy::BandRule;

/// What a finished stage produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub source: DataSource,
    pub order: (usize, usize, usize),
    pub artifacts: Vec<PathBuf>,
    /// The text report, for printing.
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(StageReport),
    Failed(String),
}

impl StageOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }
}

fn failed(stage: &str, error: impl std::fmt::Display) -> StageOutcome {
    tracing::error!(stage, error = %error, "stage failed");
    StageOutcome::Failed(format!("{stage} failed: {error}"))
}

fn dataset_info<T>(
    symbol: &str,
    acquired: &Acquired<T>,
    series: &PriceSeries,
    fingerprint: DatasetHash,
) -> Result<DatasetInfo> {
    let (first, last) = series
        .first()
        .zip(series.last())
        .context("acquired data has no rows")?;
    Ok(DatasetInfo {
        symbol: symbol.to_string(),
        source: acquired.source,
        failures: acquired.failures.clone(),
        start: first.date,
        end: last.date,
        rows: series.len(),
        fingerprint,
    })
}

/// Fit the forecaster on the forecast window and write a forecast of
/// `forecast.horizon` steps.
pub fn run_forecast(
    config: &PipelineConfig,
    orchestrator: &Orchestrator,
    now: NaiveDateTime,
) -> Result<StageOutcome> {
    let symbol = config.data.symbol.as_str();
    let range = config.forecast_range(now.date())?;
    let acquired = orchestrator
        .acquire_close(symbol, range)
        .with_context(|| format!("failed to acquire {symbol} for {range}"))?;
    let series = &acquired.data;
    let info = dataset_info(symbol, &acquired, series, series_fingerprint(series))?;
    tracing::info!(
        symbol,
        rows = info.rows,
        source = %info.source,
        fingerprint = info.fingerprint.short(),
        "forecast data ready"
    );

    let model = match config.forecaster().fit(series) {
        Ok(m) => m,
        Err(e) => return Ok(failed("model fitting", e)),
    };
    tracing::info!(order = ?model.order(), criterion = %model.criterion(), "selected model");
    let forecast = match model.predict(config.forecast.horizon) {
        Ok(f) => f,
        Err(e) => return Ok(failed("forecasting", e)),
    };

    let history = series.tail(config.forecast.history_tail);
    let last = history.last().context("forecast history is empty")?;
    let artifacts =
        report::save_forecast(&config.output.dir, &info, &model, history, &forecast, now)?;
    let summary = report::forecast_report(&info, &model, last, &forecast, now)?;

    Ok(StageOutcome::Completed(StageReport {
        source: info.source,
        order: model.order(),
        artifacts,
        summary,
    }))
}

/// Backtest the band rule on OHLCV bars, from `snapshot` when given and
/// from the sources otherwise.
pub fn run_backtest(
    config: &PipelineConfig,
    orchestrator: &Orchestrator,
    snapshot: Option<&Path>,
    now: NaiveDateTime,
) -> Result<StageOutcome> {
    let symbol = config.data.symbol.as_str();
    let acquired: Acquired<OhlcvTable> = match snapshot {
        Some(path) => load_snapshot(path)
            .with_context(|| format!("failed to load snapshot {}", path.display()))?,
        None => {
            let range = config.backtest_range()?;
            orchestrator
                .acquire_ohlcv(symbol, range)
                .with_context(|| format!("failed to acquire {symbol} for {range}"))?
        }
    };
    let table = &acquired.data;
    let closes = table.close_series();
    let info = dataset_info(symbol, &acquired, &closes, table_fingerprint(table))?;
    tracing::info!(
        symbol,
        rows = info.rows,
        source = %info.source,
        fingerprint = info.fingerprint.short(),
        "backtest data ready"
    );

    let model = match config.backtest_forecaster().fit(&closes) {
        Ok(m) => m,
        Err(e) => return Ok(failed("model fitting", e)),
    };
    tracing::info!(order = ?model.order(), criterion = %model.criterion(), "selected model");

    let rule = BandRule::new(
        model.clone(),
        config.backtest.band_horizon,
        config.backtest.min_history,
    )
    .with_anchor(config.backtest.anchor);
    let backtester = config.backtester();
    let result = match backtester.run(table, &rule) {
        Ok(r) => r,
        Err(e) => return Ok(failed("backtest", e)),
    };
    tracing::info!(
        trades = result.stats.trade_count,
        return_pct = result.stats.return_pct,
        "backtest finished"
    );

    let artifacts = report::save_backtest(
        &config.output.dir,
        &info,
        &model,
        &backtester,
        closes.points(),
        &result,
        now,
    )?;
    let summary = report::backtest_report(&info, &model, &backtester, &result, now)?;

    Ok(StageOutcome::Completed(StageReport {
        source: info.source,
        order: model.order(),
        artifacts,
        summary,
    }))
}
