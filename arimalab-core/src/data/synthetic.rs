//! Deterministic synthetic price generator.
//!
//! Last resort when every real source has failed. The output looks like an
//! index ETF trading around 450 with ~1.5% daily volatility and a faint
//! upward drift. Data produced here is always tagged
//! [`DataSource::Synthetic`](super::provider::DataSource::Synthetic) by the
//! orchestrator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::domain::{DateRange, OhlcvRow, OhlcvTable, PricePoint, PriceSeries};

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 42;

pub const BASE_PRICE: f64 = 450.0;
const MEAN_RETURN: f64 = 0.0005;
const RETURN_VOL: f64 = 0.015;
const TREND: f64 = 0.0002;
const OPEN_NOISE: f64 = 0.002;
const RANGE_NOISE: f64 = 0.008;
const VOLUME_MIN: u64 = 50_000_000;
const VOLUME_MAX: u64 = 200_000_000;

fn normal(rng: &mut StdRng, mean: f64, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + sd * z
}

/// Closing prices for `n` days. Consumes exactly `n` draws; the first draw
/// is discarded because the walk starts at [`BASE_PRICE`].
fn close_walk(rng: &mut StdRng, n: usize) -> Vec<f64> {
    let returns: Vec<f64> = (0..n).map(|_| normal(rng, MEAN_RETURN, RETURN_VOL)).collect();
    let mut closes = Vec::with_capacity(n);
    if n == 0 {
        return closes;
    }
    closes.push(BASE_PRICE);
    for (i, r) in returns.iter().enumerate().skip(1) {
        let trend = TREND * (i - 1) as f64 / n as f64;
        let prev = closes[i - 1];
        closes.push(prev * (1.0 + r + trend));
    }
    closes
}

/// Business-day close series named `Close`. Same range and seed give the same
/// series. A weekend-only range yields an empty series.
pub fn generate_series(range: &DateRange, seed: u64) -> PriceSeries {
    let days = range.business_days();
    let mut rng = StdRng::seed_from_u64(seed);
    let closes = close_walk(&mut rng, days.len());
    let points = days
        .into_iter()
        .zip(closes)
        .map(|(date, close)| PricePoint { date, close })
        .collect();
    PriceSeries::from_validated("Close", points)
}

/// Business-day OHLCV table. The close column equals [`generate_series`]
/// for the same range and seed.
pub fn generate_ohlcv(range: &DateRange, seed: u64) -> OhlcvTable {
    let days = range.business_days();
    let n = days.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let closes = close_walk(&mut rng, n);
    let opens: Vec<f64> = closes
        .iter()
        .map(|c| c * (1.0 + normal(&mut rng, 0.0, OPEN_NOISE)))
        .collect();
    let high_noise: Vec<f64> = (0..n).map(|_| normal(&mut rng, 0.0, RANGE_NOISE).abs()).collect();
    let low_noise: Vec<f64> = (0..n).map(|_| normal(&mut rng, 0.0, RANGE_NOISE).abs()).collect();
    let volumes: Vec<u64> = (0..n).map(|_| rng.gen_range(VOLUME_MIN..VOLUME_MAX)).collect();

    let rows = (0..n)
        .map(|i| {
            let (open, close) = (opens[i], closes[i]);
            OhlcvRow {
                date: days[i],
                open,
                high: open.max(close) * (1.0 + high_noise[i]),
                low: open.min(close) * (1.0 - low_noise[i]),
                close,
                volume: volumes[i],
            }
            .clamp()
        })
        .collect();
    OhlcvTable::from_validated(rows)
}
