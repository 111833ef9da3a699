//! OHLCV synthesis and cleaning.
//!
//! Turns whatever a source produced into a backtesting-ready [`OhlcvTable`]:
//!
//! - a close-only series gets plausible open/high/low/volume derived from
//!   its own recent volatility;
//! - a table in Alpha Vantage naming (`1. open`, ..., `5. adjusted close`,
//!   `6. volume`) is mapped column for column;
//! - a table that already has `Open, High, Low, Close, Volume` is projected;
//!   when it also carries Yahoo's `Adj Close`, the bars are rescaled so the
//!   close is the adjusted close.
//!
//! Tables are then forward-filled, back-filled and stripped of rows that
//! still have gaps. Rows are never reordered.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use thiserror::Error;

use crate::domain::{DomainError, OhlcvRow, OhlcvTable, PriceSeries, RawData, RawTable};

/// Canonical column names, in row order.
pub const CANONICAL_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

/// Alpha Vantage names mapped onto [`CANONICAL_COLUMNS`]. The adjusted close
/// stands in for `Close`.
pub const ALPHA_VANTAGE_COLUMNS: [&str; 5] =
    ["1. open", "2. high", "3. low", "5. adjusted close", "6. volume"];

/// Yahoo's dividend and split adjusted close.
pub const ADJUSTED_CLOSE: &str = "Adj Close";

const ROLLING_WINDOW: usize = 20;
const FALLBACK_VOLATILITY: f64 = 0.02;
const BASE_VOLUME: f64 = 100_000_000.0;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("cannot convert data to OHLCV: unrecognized columns {columns:?}")]
    Format { columns: Vec<String> },

    #[error("normalized table is invalid: {0}")]
    Invalid(#[from] DomainError),
}

/// Normalize any source output into an OHLCV table. `seed` only matters for
/// close-only input.
pub fn synthesize_ohlcv(data: &RawData, seed: u64) -> Result<OhlcvTable, SynthError> {
    match data {
        RawData::Series(series) => Ok(ohlcv_from_closes(series, seed)),
        RawData::Table(table) => ohlcv_from_table(table),
    }
}

/// Derive OHLCV bars from closing prices.
///
/// Open sits a random fraction of the way from the previous close to this
/// close; high and low extend past the body by half the trailing 20-day
/// return volatility; volume grows with the size of the move.
pub fn ohlcv_from_closes(series: &PriceSeries, seed: u64) -> OhlcvTable {
    let closes = series.closes();
    let n = closes.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let returns = pct_change(&closes);
    let spreads: Vec<f64> = rolling_std(&returns, ROLLING_WINDOW)
        .into_iter()
        .map(|v| 0.5 * v.unwrap_or(FALLBACK_VOLATILITY))
        .collect();

    let fractions: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..0.9)).collect();
    let high_noise: Vec<f64> = spreads.iter().map(|s| scaled_normal(&mut rng, *s)).collect();
    let low_noise: Vec<f64> = spreads.iter().map(|s| scaled_normal(&mut rng, *s)).collect();

    let rows = series
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let prev = if i == 0 { p.close } else { closes[i - 1] };
            let open = prev + (p.close - prev) * fractions[i];
            OhlcvRow {
                date: p.date,
                open,
                high: open.max(p.close) * (1.0 + high_noise[i]),
                low: open.min(p.close) * (1.0 - low_noise[i]),
                close: p.close,
                volume: to_volume(BASE_VOLUME * (1.0 + 5.0 * returns[i].abs())),
            }
            .clamp()
        })
        .collect();
    OhlcvTable::from_validated(rows)
}

/// Map a source table onto canonical OHLCV, checking Alpha Vantage naming
/// first, then canonical naming.
///
/// A canonical table with an [`ADJUSTED_CLOSE`] column has open, high and
/// low scaled by `Adj Close / Close` and the adjusted value as its close.
pub fn ohlcv_from_table(table: &RawTable) -> Result<OhlcvTable, SynthError> {
    let names = [ALPHA_VANTAGE_COLUMNS, CANONICAL_COLUMNS]
        .into_iter()
        .find(|names| names.iter().all(|n| table.has_column(n)))
        .ok_or_else(|| SynthError::Format {
            columns: table.column_names(),
        })?;

    let mut columns: Vec<Vec<Option<f64>>> = names
        .iter()
        .map(|n| table.column(n).map(<[_]>::to_vec).unwrap_or_default())
        .collect();
    let mut adjusted = if names == CANONICAL_COLUMNS {
        table.column(ADJUSTED_CLOSE).map(<[_]>::to_vec)
    } else {
        None
    };
    for col in columns.iter_mut().chain(adjusted.iter_mut()) {
        forward_fill(col);
        back_fill(col);
    }

    let rows = table
        .dates()
        .iter()
        .enumerate()
        .filter_map(|(i, &date)| {
            let raw_close = columns[3][i]?;
            let (factor, close) = match adjusted.as_ref().and_then(|adj| adj[i]) {
                Some(adj) if raw_close > 0.0 => (adj / raw_close, adj),
                _ => (1.0, raw_close),
            };
            Some(
                OhlcvRow {
                    date,
                    open: columns[0][i]? * factor,
                    high: columns[1][i]? * factor,
                    low: columns[2][i]? * factor,
                    close,
                    volume: to_volume(columns[4][i]?),
                }
                .clamp(),
            )
        })
        .collect();
    Ok(OhlcvTable::new(rows)?)
}

/// Replace each gap with the last value seen before it.
pub fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for v in values.iter_mut() {
        match v {
            Some(x) => last = Some(*x),
            None => *v = last,
        }
    }
}

/// Replace each gap with the next value seen after it.
pub fn back_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
}

/// Simple returns; the first entry is 0.
fn pct_change(closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        if i == 0 || closes[i - 1] == 0.0 {
            out.push(0.0);
        } else {
            out.push(closes[i] / closes[i - 1] - 1.0);
        }
    }
    out
}

/// Sample standard deviation (ddof 1) over a trailing window that may be
/// shorter at the start. `None` when the window holds a single value.
fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let slice = &values[(i + 1).saturating_sub(window)..=i];
            if slice.len() < 2 {
                return None;
            }
            let n = slice.len() as f64;
            let mean = slice.iter().sum::<f64>() / n;
            let var = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(var.sqrt())
        })
        .collect()
}

fn scaled_normal(rng: &mut StdRng, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    (sd * z).abs()
}

/// Round to whole shares; non-positive volume becomes 1.
fn to_volume(v: f64) -> u64 {
    if v.is_finite() && v >= 1.0 {
        v.floor() as u64
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PricePoint;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn closes(values: &[f64]) -> PriceSeries {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: d(i as u32 + 1),
                close,
            })
            .collect();
        PriceSeries::new("Close", points).unwrap()
    }

    #[test]
    fn close_only_input_keeps_closes_and_dates() {
        let series = closes(&[100.0, 101.0, 99.5, 102.0, 102.5]);
        let table = ohlcv_from_closes(&series, 42);

        assert_eq!(table.closes(), series.closes());
        assert_eq!(table.dates(), series.dates());
        for row in table.rows() {
            assert!(row.is_sane());
        }
    }

    #[test]
    fn first_open_equals_first_close_and_volume_tracks_moves() {
        let table = ohlcv_from_closes(&closes(&[100.0, 110.0]), 1);
        let first = table.rows()[0];
        assert_eq!(first.open, 100.0);
        assert_eq!(first.volume, 100_000_000);
        // 10% move: 1e8 * (1 + 0.5)
        assert_eq!(table.rows()[1].volume, 150_000_000);
        assert!(table.rows()[1].open > 100.0 && table.rows()[1].open < 110.0);
    }

    #[test]
    fn close_only_synthesis_is_seeded() {
        let series = closes(&[100.0, 101.0, 102.0, 101.0, 100.0, 103.0]);
        assert_eq!(ohlcv_from_closes(&series, 9), ohlcv_from_closes(&series, 9));
    }

    #[test]
    fn alpha_vantage_naming_maps_adjusted_close() {
        let table = RawTable::new(vec![d(2), d(3)])
            .with_column("1. open", vec![Some(10.0), Some(11.0)])
            .unwrap()
            .with_column("2. high", vec![Some(12.0), Some(12.0)])
            .unwrap()
            .with_column("3. low", vec![Some(9.0), Some(10.0)])
            .unwrap()
            .with_column("4. close", vec![Some(11.0), Some(11.5)])
            .unwrap()
            .with_column("5. adjusted close", vec![Some(10.5), Some(11.2)])
            .unwrap()
            .with_column("6. volume", vec![Some(1000.0), Some(2000.0)])
            .unwrap();

        let out = ohlcv_from_table(&table).unwrap();
        assert_eq!(out.closes(), vec![10.5, 11.2]);
        assert_eq!(out.rows()[1].volume, 2000);
    }

    #[test]
    fn alpha_vantage_columns_map_row_by_row() {
        let table = RawTable::new(vec![d(2), d(3), d(4)])
            .with_column("1. open", vec![Some(10.0), Some(11.0), Some(12.0)])
            .unwrap()
            .with_column("2. high", vec![Some(13.0), Some(14.0), Some(15.0)])
            .unwrap()
            .with_column("3. low", vec![Some(8.0), Some(9.0), Some(10.0)])
            .unwrap()
            .with_column("4. close", vec![Some(99.0), Some(99.0), Some(99.0)])
            .unwrap()
            .with_column("5. adjusted close", vec![Some(11.5), Some(12.5), Some(13.5)])
            .unwrap()
            .with_column("6. volume", vec![Some(1000.0), Some(2000.0), Some(3000.0)])
            .unwrap();

        let out = ohlcv_from_table(&table).unwrap();
        let expected = [
            (d(2), 10.0, 13.0, 8.0, 11.5, 1000),
            (d(3), 11.0, 14.0, 9.0, 12.5, 2000),
            (d(4), 12.0, 15.0, 10.0, 13.5, 3000),
        ];
        assert_eq!(out.len(), expected.len());
        for (row, (date, open, high, low, close, volume)) in out.rows().iter().zip(expected) {
            assert_eq!(
                *row,
                OhlcvRow {
                    date,
                    open,
                    high,
                    low,
                    close,
                    volume
                }
            );
        }
    }

    #[test]
    fn yahoo_adjusted_close_rescales_the_bar() {
        let table = RawTable::new(vec![d(2), d(3)])
            .with_column("Open", vec![Some(470.0), Some(472.0)])
            .unwrap()
            .with_column("High", vec![Some(474.0), Some(475.0)])
            .unwrap()
            .with_column("Low", vec![Some(469.0), Some(471.0)])
            .unwrap()
            .with_column("Close", vec![Some(472.0), Some(473.0)])
            .unwrap()
            .with_column("Adj Close", vec![Some(460.0), Some(461.0)])
            .unwrap()
            .with_column("Volume", vec![Some(5.0), Some(6.0)])
            .unwrap();

        let out = ohlcv_from_table(&table).unwrap();
        assert_eq!(out.closes(), vec![460.0, 461.0]);
        let first = out.rows()[0];
        let factor = 460.0 / 472.0;
        assert!((first.open - 470.0 * factor).abs() < 1e-9);
        assert!((first.high - 474.0 * factor).abs() < 1e-9);
        assert!((first.low - 469.0 * factor).abs() < 1e-9);
        assert_eq!(first.volume, 5);
        assert!(out.rows().iter().all(|r| r.is_sane()));
    }

    #[test]
    fn missing_adjusted_close_keeps_the_raw_bar() {
        let table = RawTable::new(vec![d(2)])
            .with_column("Open", vec![Some(10.0)])
            .unwrap()
            .with_column("High", vec![Some(12.0)])
            .unwrap()
            .with_column("Low", vec![Some(9.0)])
            .unwrap()
            .with_column("Close", vec![Some(11.0)])
            .unwrap()
            .with_column("Adj Close", vec![None])
            .unwrap()
            .with_column("Volume", vec![Some(1.0)])
            .unwrap();
        let row = ohlcv_from_table(&table).unwrap().rows()[0];
        assert_eq!((row.open, row.close), (10.0, 11.0));
    }

    #[test]
    fn canonical_table_ignores_extra_columns_and_fills_gaps() {
        let table = RawTable::new(vec![d(2), d(3), d(4)])
            .with_column("Open", vec![None, Some(11.0), Some(12.0)])
            .unwrap()
            .with_column("High", vec![Some(12.0), Some(13.0), Some(14.0)])
            .unwrap()
            .with_column("Low", vec![Some(9.0), Some(10.0), Some(11.0)])
            .unwrap()
            .with_column("Close", vec![Some(11.0), None, Some(13.0)])
            .unwrap()
            .with_column("Volume", vec![Some(1.0), Some(0.0), Some(5.0)])
            .unwrap()
            .with_column("Dividends", vec![None, None, None])
            .unwrap();

        let out = ohlcv_from_table(&table).unwrap();
        assert_eq!(out.len(), 3);
        // Back-filled open, forward-filled close.
        assert_eq!(out.rows()[0].open, 11.0);
        assert_eq!(out.rows()[1].close, 11.0);
        // Zero volume is bumped to 1.
        assert_eq!(out.rows()[1].volume, 1);
    }

    #[test]
    fn all_missing_column_drops_every_row() {
        let table = RawTable::new(vec![d(2)])
            .with_column("Open", vec![Some(1.0)])
            .unwrap()
            .with_column("High", vec![Some(1.0)])
            .unwrap()
            .with_column("Low", vec![Some(1.0)])
            .unwrap()
            .with_column("Close", vec![None])
            .unwrap()
            .with_column("Volume", vec![Some(1.0)])
            .unwrap();
        assert!(ohlcv_from_table(&table).unwrap().is_empty());
    }

    #[test]
    fn unknown_schema_names_its_columns() {
        let table = RawTable::new(vec![d(2)])
            .with_column("SP500", vec![Some(4700.0)])
            .unwrap();
        let err = ohlcv_from_table(&table).unwrap_err();
        assert!(matches!(&err, SynthError::Format { columns } if columns == &["SP500"]));
        assert!(err.to_string().contains("SP500"));
    }

    #[test]
    fn rows_violating_ohlc_are_clamped() {
        let table = RawTable::new(vec![d(2)])
            .with_column("Open", vec![Some(10.0)])
            .unwrap()
            .with_column("High", vec![Some(9.0)])
            .unwrap()
            .with_column("Low", vec![Some(11.0)])
            .unwrap()
            .with_column("Close", vec![Some(10.5)])
            .unwrap()
            .with_column("Volume", vec![Some(100.0)])
            .unwrap();
        let row = ohlcv_from_table(&table).unwrap().rows()[0];
        assert_eq!((row.high, row.low), (10.5, 10.0));
    }

    #[test]
    fn rolling_std_matches_sample_definition() {
        let v = rolling_std(&[0.0, 0.1, -0.1], 20);
        assert_eq!(v[0], None);
        assert!((v[1].unwrap() - 0.070_710_678).abs() < 1e-8);
        assert!((v[2].unwrap() - 0.1).abs() < 1e-12);
    }
}
