//! SVG charts written next to the text reports.
//!
//! - forecast: recent closes, forecast mean and the 95% band
//! - backtest: closes with trade markers over the equity curve

use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use plotters::prelude::*;

use arimalab_core::domain::PricePoint;

use crate::backtest::BacktestResult;
use crate::model::Forecast;
use crate::report::forecast_dates;

const HISTORY: RGBColor = RGBColor(30, 144, 255);
const FORECAST: RGBColor = RGBColor(220, 50, 32);
const EQUITY: RGBColor = RGBColor(0, 128, 96);
const LONG: RGBColor = RGBColor(0, 153, 76);
const SHORT: RGBColor = RGBColor(200, 0, 0);

/// Min and max of the finite values, padded by 5% of the spread (1% of the
/// level for a flat series).
fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(lo.abs() * 0.01).max(1e-6);
    (lo - pad)..(hi + pad)
}

fn date_span(first: NaiveDate, last: NaiveDate) -> Range<NaiveDate> {
    if last > first {
        first..last
    } else {
        first..first + Duration::days(1)
    }
}

pub fn render_forecast_chart(
    path: &Path,
    symbol: &str,
    history: &[PricePoint],
    forecast: &Forecast,
) -> Result<()> {
    let (first, last) = history
        .first()
        .zip(history.last())
        .context("forecast chart needs at least one close")?;
    let dates = forecast_dates(last.date, forecast.horizon());
    let end = dates.last().copied().unwrap_or(last.date);
    let y = value_range(
        history
            .iter()
            .map(|p| p.close)
            .chain(forecast.lower.iter().copied())
            .chain(forecast.upper.iter().copied()),
    );

    let root = SVGBackend::new(path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{symbol} price forecast"), ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(date_span(first.date, end), y)?;

    chart.configure_mesh().x_labels(8).y_labels(10).draw()?;

    // The band opens from the last close so it joins the history line.
    let anchor = (last.date, last.close);
    let band: Vec<(NaiveDate, f64)> = std::iter::once(anchor)
        .chain(dates.iter().copied().zip(forecast.upper.iter().copied()))
        .chain(dates.iter().rev().copied().zip(forecast.lower.iter().rev().copied()))
        .collect();
    chart
        .draw_series(std::iter::once(Polygon::new(band, FORECAST.mix(0.15).filled())))?
        .label("95% band")
        .legend(|(x, y)| {
            Rectangle::new([(x, y - 5), (x + 20, y + 5)], FORECAST.mix(0.15).filled())
        });

    chart
        .draw_series(LineSeries::new(history.iter().map(|p| (p.date, p.close)), &HISTORY))?
        .label("History")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &HISTORY));

    chart
        .draw_series(LineSeries::new(
            std::iter::once(anchor)
                .chain(dates.iter().copied().zip(forecast.mean.iter().copied())),
            &FORECAST,
        ))?
        .label("Forecast")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &FORECAST));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(&BLACK)
        .draw()?;

    root.present().with_context(|| format!("failed to write {}", path.display()))
}

/// Closes with entry (triangle) and exit (cross) markers on top, equity
/// below.
pub fn render_backtest_chart(
    path: &Path,
    symbol: &str,
    prices: &[PricePoint],
    result: &BacktestResult,
) -> Result<()> {
    let (first, last) = prices
        .first()
        .zip(prices.last())
        .context("backtest chart needs at least one close")?;
    let span = date_span(first.date, last.date);

    let root = SVGBackend::new(path, (1280, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&format!("{symbol} band strategy backtest"), ("sans-serif", 32))?;
    let (upper, lower) = root.split_vertically(500);

    let mut price = ChartBuilder::on(&upper)
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(span.clone(), value_range(prices.iter().map(|p| p.close)))?;
    price.configure_mesh().x_labels(8).y_labels(8).y_desc("Close").draw()?;

    price
        .draw_series(LineSeries::new(prices.iter().map(|p| (p.date, p.close)), &HISTORY))?
        .label("Close")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &HISTORY));
    price
        .draw_series(
            result
                .trades
                .iter()
                .filter(|t| t.size > 0)
                .map(|t| TriangleMarker::new((t.entry_date, t.entry_price), 7, LONG.filled())),
        )?
        .label("Long entry")
        .legend(|(x, y)| TriangleMarker::new((x + 10, y), 5, LONG.filled()));
    price
        .draw_series(
            result
                .trades
                .iter()
                .filter(|t| t.size < 0)
                .map(|t| TriangleMarker::new((t.entry_date, t.entry_price), 7, SHORT.filled())),
        )?
        .label("Short entry")
        .legend(|(x, y)| TriangleMarker::new((x + 10, y), 5, SHORT.filled()));
    price
        .draw_series(
            result
                .trades
                .iter()
                .map(|t| Cross::new((t.exit_date, t.exit_price), 5, BLACK.stroke_width(2))),
        )?
        .label("Exit")
        .legend(|(x, y)| Cross::new((x + 10, y), 4, BLACK.stroke_width(2)));
    price
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(&BLACK)
        .draw()?;

    let mut equity = ChartBuilder::on(&lower)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(span, value_range(result.equity.iter().map(|p| p.equity)))?;
    equity.configure_mesh().x_labels(8).y_labels(6).y_desc("Equity").draw()?;
    equity.draw_series(LineSeries::new(
        result.equity.iter().map(|p| (p.date, p.equity)),
        &EQUITY,
    ))?;

    root.present().with_context(|| format!("failed to write {}", path.display()))
}
