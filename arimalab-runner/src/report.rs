//! Reporting and export: text reports, CSV series and charts.
//!
//! Every artifact lands in one output directory with a shared
//! `%Y%m%d_%H%M%S` timestamp in its filename:
//! - forecast: `arima_forecast_{ts}.csv`, `arima_forecast_report_{ts}.txt`,
//!   `arima_forecast_chart_{ts}.svg`
//! - backtest: `arima_backtest_report_{ts}.txt`,
//!   `arima_backtest_trades_{ts}.csv`, `arima_backtest_equity_{ts}.csv`,
//!   `arima_backtest_chart_{ts}.svg`

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use arimalab_core::data::{DataSource, SourceFailure};
use arimalab_core::domain::PricePoint;
use arimalab_core::fingerprint::DatasetHash;

use crate::backtest::{BacktestResult, Backtester, EquityPoint, Trade};
use crate::chart;
use crate::model::{FittedModel, Forecast};

const RULE: &str = "==================================================";

/// Provenance of the data a report was produced from.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub symbol: String,
    pub source: DataSource,
    pub failures: Vec<SourceFailure>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: usize,
    pub fingerprint: DatasetHash,
}

pub fn timestamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Calendar days following `last`, one per forecast step.
pub fn forecast_dates(last: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i64).map(|d| last + Duration::days(d)).collect()
}

fn write_dataset(out: &mut String, info: &DatasetInfo) -> std::fmt::Result {
    writeln!(out, "DATA INFORMATION:")?;
    writeln!(out, "• Symbol: {}", info.symbol)?;
    writeln!(out, "• Period: {} to {}", info.start, info.end)?;
    writeln!(out, "• Total Data Points: {}", info.rows)?;
    writeln!(out, "• Source: {}", info.source)?;
    writeln!(out, "• Fingerprint: {}", info.fingerprint)?;
    for failure in &info.failures {
        writeln!(out, "• Skipped {}: {}", failure.provider, failure.reason)?;
    }
    if info.source.is_synthetic() {
        writeln!(out)?;
        writeln!(
            out,
            "WARNING: every data source failed; these results use SYNTHETIC prices"
        )?;
        writeln!(out, "and say nothing about the real instrument.")?;
    }
    Ok(())
}

fn write_model(out: &mut String, model: &FittedModel) -> std::fmt::Result {
    let (p, d, q) = model.order();
    writeln!(out, "MODEL:")?;
    writeln!(out, "• Order: ARIMA({p},{d},{q})")?;
    writeln!(
        out,
        "• {}: {:.2} on {} observations",
        model.criterion(),
        model.criterion_value(),
        model.n_obs()
    )?;
    writeln!(out, "• Intercept: {:.6}", model.intercept())?;
    let coefs: Vec<String> = model
        .coefficients()
        .iter()
        .map(|c| format!("{c:.6}"))
        .collect();
    if !coefs.is_empty() {
        writeln!(out, "• AR coefficients: {}", coefs.join(", "))?;
    }
    writeln!(out, "• Residual variance: {:.6}", model.sigma2())
}

// ─── Forecast ───────────────────────────────────────────────────────

pub fn forecast_report(
    info: &DatasetInfo,
    model: &FittedModel,
    last: &PricePoint,
    forecast: &Forecast,
    generated: NaiveDateTime,
) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "ARIMA Price Forecast")?;
    writeln!(out, "Generated: {}", generated.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "{RULE}")?;
    writeln!(out)?;
    writeln!(out, "Current price ({}): ${:.2}", last.date, last.close)?;
    writeln!(out, "Forecast horizon: {} periods", forecast.horizon())?;
    writeln!(
        out,
        "Predicted range: ${:.2} - ${:.2}",
        forecast.band_low(),
        forecast.band_high()
    )?;
    writeln!(out, "Average forecast: ${:.2}", forecast.average())?;
    writeln!(out)?;
    writeln!(out, "Detailed forecast:")?;
    let dates = forecast_dates(last.date, forecast.horizon());
    for (i, date) in dates.iter().enumerate() {
        writeln!(
            out,
            "Day {} ({date}): ${:.2} (Range: ${:.2} - ${:.2})",
            i + 1,
            forecast.mean[i],
            forecast.lower[i],
            forecast.upper[i]
        )?;
    }
    writeln!(out)?;
    write_model(&mut out, model)?;
    writeln!(out)?;
    write_dataset(&mut out, info)?;
    Ok(out)
}

/// History tail followed by the forecast steps.
///
/// Columns: date, kind, close, forecast, lower, upper
pub fn export_forecast_csv(history: &[PricePoint], forecast: &Forecast) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "kind", "close", "forecast", "lower", "upper"])?;

    for p in history {
        wtr.write_record([
            &p.date.to_string(),
            "history",
            &format!("{:.4}", p.close),
            "",
            "",
            "",
        ])?;
    }
    if let Some(last) = history.last() {
        for (i, date) in forecast_dates(last.date, forecast.horizon()).iter().enumerate() {
            wtr.write_record([
                &date.to_string(),
                "forecast",
                "",
                &format!("{:.4}", forecast.mean[i]),
                &format!("{:.4}", forecast.lower[i]),
                &format!("{:.4}", forecast.upper[i]),
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Backtest ───────────────────────────────────────────────────────

fn pct_or_na(v: Option<f64>) -> String {
    v.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}%"))
}

pub fn backtest_report(
    info: &DatasetInfo,
    model: &FittedModel,
    settings: &Backtester,
    result: &BacktestResult,
    generated: NaiveDateTime,
) -> Result<String> {
    let s = &result.stats;
    let mut out = String::new();
    writeln!(out, "ARIMA Trading Strategy - Backtesting Report")?;
    writeln!(out, "Generated: {}", generated.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "{RULE}")?;
    writeln!(out)?;
    writeln!(out, "STRATEGY PERFORMANCE METRICS:")?;
    writeln!(out, "• Total Return: {:.2}%", s.return_pct)?;
    writeln!(out, "• Buy & Hold Return: {:.2}%", s.buy_and_hold_pct)?;
    writeln!(out, "• Sharpe Ratio: {:.3}", s.sharpe)?;
    writeln!(out, "• Max Drawdown: {:.2}%", s.max_drawdown_pct)?;
    writeln!(out, "• Volatility (Ann.): {:.2}%", s.volatility_ann_pct)?;
    writeln!(out, "• Number of Trades: {}", s.trade_count)?;
    writeln!(out, "• Win Rate: {}", pct_or_na(s.win_rate_pct))?;
    writeln!(out, "• Best Trade: {}", pct_or_na(s.best_trade_pct))?;
    writeln!(out, "• Worst Trade: {}", pct_or_na(s.worst_trade_pct))?;
    writeln!(out, "• Exposure: {:.2}%", s.exposure_pct)?;
    writeln!(out, "• Final Equity: ${:.2}", s.final_equity)?;
    writeln!(out)?;
    write_dataset(&mut out, info)?;
    writeln!(out, "• Initial Capital: ${:.2}", settings.cash)?;
    writeln!(out, "• Commission: {:.2}%", settings.commission * 100.0)?;
    writeln!(out)?;
    write_model(&mut out, model)?;
    writeln!(out)?;
    out.push_str(STRATEGY_NOTES);
    Ok(out)
}

const STRATEGY_NOTES: &str = "\
STRATEGY DESCRIPTION:
The strategy fits an autoregressive model to the closes and forecasts a few
steps ahead with 95% confidence bands. Signals compare the latest close with
the band:
- BUY when price < lowest lower bound
- SELL when price > highest upper bound
- CLOSE position when price is back within the band
Orders fill at the next bar's open.

RISK DISCLAIMER:
This backtesting analysis is for educational purposes only and does not constitute
investment advice. Past performance does not guarantee future results.
";

/// Columns: entry_date, entry_price, size, exit_date, exit_price, pnl, return_pct
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "entry_date",
        "entry_price",
        "size",
        "exit_date",
        "exit_price",
        "pnl",
        "return_pct",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.entry_date.to_string(),
            &format!("{:.4}", t.entry_price),
            &t.size.to_string(),
            &t.exit_date.to_string(),
            &format!("{:.4}", t.exit_price),
            &format!("{:.2}", t.pnl),
            &format!("{:.4}", t.return_pct),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "equity"])?;
    for p in equity {
        wtr.write_record([&p.date.to_string(), &format!("{:.2}", p.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact files ─────────────────────────────────────────────────

fn write_artifact(dir: &Path, name: String, content: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))
}

/// Write the forecast CSV, text report and chart. Returns their paths.
pub fn save_forecast(
    output_dir: &Path,
    info: &DatasetInfo,
    model: &FittedModel,
    history: &[PricePoint],
    forecast: &Forecast,
    generated: NaiveDateTime,
) -> Result<Vec<PathBuf>> {
    let last = history.last().context("forecast history is empty")?;
    ensure_dir(output_dir)?;
    let ts = timestamp(generated);

    let csv_path = write_artifact(
        output_dir,
        format!("arima_forecast_{ts}.csv"),
        &export_forecast_csv(history, forecast)?,
    )?;
    let report_path = write_artifact(
        output_dir,
        format!("arima_forecast_report_{ts}.txt"),
        &forecast_report(info, model, last, forecast, generated)?,
    )?;
    let chart_path = output_dir.join(format!("arima_forecast_chart_{ts}.svg"));
    chart::render_forecast_chart(&chart_path, &info.symbol, history, forecast)?;
    Ok(vec![csv_path, report_path, chart_path])
}

/// Write the backtest report, trade log, equity curve and chart. `prices`
/// are the traded closes. Returns the paths.
pub fn save_backtest(
    output_dir: &Path,
    info: &DatasetInfo,
    model: &FittedModel,
    settings: &Backtester,
    prices: &[PricePoint],
    result: &BacktestResult,
    generated: NaiveDateTime,
) -> Result<Vec<PathBuf>> {
    ensure_dir(output_dir)?;
    let ts = timestamp(generated);

    let report = write_artifact(
        output_dir,
        format!("arima_backtest_report_{ts}.txt"),
        &backtest_report(info, model, settings, result, generated)?,
    )?;
    let trades = write_artifact(
        output_dir,
        format!("arima_backtest_trades_{ts}.csv"),
        &export_trades_csv(&result.trades)?,
    )?;
    let equity = write_artifact(
        output_dir,
        format!("arima_backtest_equity_{ts}.csv"),
        &export_equity_csv(&result.equity)?,
    )?;
    let chart_path = output_dir.join(format!("arima_backtest_chart_{ts}.svg"));
    chart::render_backtest_chart(&chart_path, &info.symbol, prices, result)?;
    Ok(vec![report, trades, equity, chart_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BacktestStats;
    use crate::model::{ArForecaster, Forecaster};
    use arimalab_core::domain::PriceSeries;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn generated() -> NaiveDateTime {
        d(2024, 6, 1).and_hms_opt(9, 30, 5).unwrap()
    }

    fn info(source: DataSource) -> DatasetInfo {
        DatasetInfo {
            symbol: "SPY".into(),
            source,
            failures: vec![SourceFailure {
                provider: "yahoo".into(),
                reason: "HTTP 500 for SPY".into(),
            }],
            start: d(2024, 1, 1),
            end: d(2024, 1, 30),
            rows: 30,
            fingerprint: DatasetHash("ab".repeat(32)),
        }
    }

    fn history() -> Vec<PricePoint> {
        (0..30)
            .map(|i| PricePoint {
                date: d(2024, 1, 1) + Duration::days(i),
                close: 100.0 + i as f64,
            })
            .collect()
    }

    fn model() -> FittedModel {
        let series = PriceSeries::new("Close", history()).unwrap();
        ArForecaster::default().fit(&series).unwrap()
    }

    fn forecast() -> Forecast {
        Forecast {
            mean: vec![130.0, 131.0],
            lower: vec![128.0, 127.5],
            upper: vec![132.0, 134.5],
        }
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(timestamp(generated()), "20240601_093005");
    }

    #[test]
    fn forecast_dates_are_consecutive_calendar_days() {
        // Friday → Saturday, Sunday, Monday.
        let dates = forecast_dates(d(2024, 1, 5), 3);
        assert_eq!(dates, vec![d(2024, 1, 6), d(2024, 1, 7), d(2024, 1, 8)]);
    }

    #[test]
    fn forecast_report_lists_range_and_days() {
        let h = history();
        let text = forecast_report(
            &info(DataSource::YahooFinance),
            &model(),
            h.last().unwrap(),
            &forecast(),
            generated(),
        )
        .unwrap();
        assert!(text.contains("Current price (2024-01-30): $129.00"));
        assert!(text.contains("Predicted range: $127.50 - $134.50"));
        assert!(text.contains("Average forecast: $130.50"));
        assert!(text.contains("Day 2 (2024-02-01): $131.00 (Range: $127.50 - $134.50)"));
        assert!(text.contains("Order: ARIMA(0,1,0)"));
        assert!(!text.contains("SYNTHETIC"));
    }

    #[test]
    fn synthetic_data_is_flagged() {
        let h = history();
        let text = forecast_report(
            &info(DataSource::Synthetic),
            &model(),
            h.last().unwrap(),
            &forecast(),
            generated(),
        )
        .unwrap();
        assert!(text.contains("SYNTHETIC"));
        assert!(text.contains("Skipped yahoo: HTTP 500 for SPY"));
    }

    #[test]
    fn forecast_csv_has_history_then_forecast() {
        let h = history();
        let csv = export_forecast_csv(&h[25..], &forecast()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,kind,close,forecast,lower,upper");
        assert_eq!(lines.len(), 1 + 5 + 2);
        assert_eq!(lines[1], "2024-01-26,history,125.0000,,,");
        assert_eq!(lines[6], "2024-01-31,forecast,,130.0000,128.0000,132.0000");
    }

    fn backtest_result() -> BacktestResult {
        let trades = vec![Trade {
            entry_date: d(2024, 1, 2),
            entry_price: 100.0,
            size: -5,
            exit_date: d(2024, 1, 4),
            exit_price: 90.0,
            pnl: 49.0,
            return_pct: 9.8,
        }];
        let equity = vec![
            EquityPoint { date: d(2024, 1, 2), equity: 1_000.0 },
            EquityPoint { date: d(2024, 1, 3), equity: 1_020.0 },
            EquityPoint { date: d(2024, 1, 4), equity: 1_049.0 },
        ];
        let curve: Vec<f64> = equity.iter().map(|p| p.equity).collect();
        BacktestResult {
            stats: BacktestStats::compute(&curve, &trades, &[100.0, 95.0, 90.0], 2),
            trades,
            equity,
        }
    }

    #[test]
    fn backtest_report_has_metrics_and_settings() {
        let text = backtest_report(
            &info(DataSource::Fred),
            &model(),
            &Backtester::default(),
            &backtest_result(),
            generated(),
        )
        .unwrap();
        assert!(text.starts_with("ARIMA Trading Strategy - Backtesting Report"));
        assert!(text.contains("Generated: 2024-06-01 09:30:05"));
        assert!(text.contains("• Total Return: 4.90%"));
        assert!(text.contains("• Number of Trades: 1"));
        assert!(text.contains("• Win Rate: 100.00%"));
        assert!(text.contains("• Initial Capital: $10000.00"));
        assert!(text.contains("• Commission: 0.10%"));
        assert!(text.contains("• Source: FRED"));
        assert!(text.contains("RISK DISCLAIMER"));
    }

    #[test]
    fn trades_csv_keeps_signed_size() {
        let csv = export_trades_csv(&backtest_result().trades).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "entry_date,entry_price,size,exit_date,exit_price,pnl,return_pct"
        );
        assert_eq!(lines[1], "2024-01-02,100.0000,-5,2024-01-04,90.0000,49.00,9.8000");
    }

    #[test]
    fn save_backtest_writes_four_timestamped_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("plots");
        let prices: Vec<PricePoint> = [100.0, 95.0, 90.0]
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: d(2024, 1, 2) + Duration::days(i as i64),
                close,
            })
            .collect();
        let paths = save_backtest(
            &out,
            &info(DataSource::YahooFinance),
            &model(),
            &Backtester::default(),
            &prices,
            &backtest_result(),
            generated(),
        )
        .unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "arima_backtest_report_20240601_093005.txt",
                "arima_backtest_trades_20240601_093005.csv",
                "arima_backtest_equity_20240601_093005.csv",
                "arima_backtest_chart_20240601_093005.svg",
            ]
        );
        assert!(paths.iter().all(|p| p.exists()));
        let equity = std::fs::read_to_string(&paths[2]).unwrap();
        assert!(equity.contains("2024-01-04,1049.00"));
        let chart = std::fs::read_to_string(&paths[3]).unwrap();
        assert!(chart.contains("<svg"));
    }

    #[test]
    fn save_forecast_writes_csv_report_and_chart() {
        let dir = tempfile::tempdir().unwrap();
        let paths = save_forecast(
            dir.path(),
            &info(DataSource::YahooFinance),
            &model(),
            &history(),
            &forecast(),
            generated(),
        )
        .unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "arima_forecast_20240601_093005.csv",
                "arima_forecast_report_20240601_093005.txt",
                "arima_forecast_chart_20240601_093005.svg",
            ]
        );
        assert!(std::fs::read_to_string(&paths[2]).unwrap().contains("SPY price forecast"));
    }

    #[test]
    fn save_forecast_rejects_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_forecast(
            dir.path(),
            &info(DataSource::YahooFinance),
            &model(),
            &[],
            &forecast(),
            generated(),
        );
        assert!(err.is_err());
    }
}
