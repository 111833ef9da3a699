//! Acquisition orchestrator.
//!
//! Walks the configured price sources in priority order and returns the
//! first usable result, normalized to the shape the caller asked for. When
//! every source fails, the deterministic synthetic generator takes over, so
//! for a valid request the orchestrator always produces data.
//!
//! Failure policy:
//! 1. An adapter error or an empty result is logged at `warn`, recorded in
//!    [`Acquired::failures`] and the next source is tried.
//! 2. When nothing is left, synthetic data is generated (logged at `info`)
//!    and tagged [`DataSource::Synthetic`].
//! 3. The only hard failure is a table in an unrecognized schema when OHLCV
//!    output was requested (logged at `error`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::alphavantage::AlphaVantageSource;
use super::fred::FredSource;
use super::provider::{DataSource, FetchError, PriceSource};
use super::settings::SourceSettings;
use super::synthesize::{synthesize_ohlcv, SynthError};
use super::synthetic;
use super::yahoo::YahooSource;
use crate::domain::{DateRange, OhlcvTable, PriceSeries, RawData};

/// Close column preference when projecting a table to a series.
const CLOSE_PREFERENCE: [&str; 3] = ["5. adjusted close", "Adj Close", "Close"];

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("date range {0} contains no business days")]
    NoBusinessDays(DateRange),

    #[error(transparent)]
    Format(#[from] SynthError),
}

/// Which canonical shape the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Close-only series, for forecasting.
    #[default]
    CloseOnly,
    /// Full OHLCV table, for backtesting.
    Ohlcv,
}

/// Data of either canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Close(PriceSeries),
    Ohlcv(OhlcvTable),
}

impl Dataset {
    pub fn len(&self) -> usize {
        match self {
            Dataset::Close(s) => s.len(),
            Dataset::Ohlcv(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close_series(&self) -> PriceSeries {
        match self {
            Dataset::Close(s) => s.clone(),
            Dataset::Ohlcv(t) => t.close_series(),
        }
    }
}

/// One source that was tried and did not produce data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub provider: String,
    pub reason: String,
}

/// Acquired data plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired<T> {
    pub data: T,
    pub source: DataSource,
    /// Sources tried before `source`, in order.
    pub failures: Vec<SourceFailure>,
}

impl<T> Acquired<T> {
    pub fn is_synthetic(&self) -> bool {
        self.source.is_synthetic()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Acquired<U> {
        Acquired {
            data: f(self.data),
            source: self.source,
            failures: self.failures,
        }
    }
}

pub struct Orchestrator {
    sources: Vec<Box<dyn PriceSource>>,
    seed: u64,
}

impl Orchestrator {
    /// Sources are tried in the order given. `seed` drives the synthetic
    /// fallback and close-only OHLCV synthesis.
    pub fn new(sources: Vec<Box<dyn PriceSource>>, seed: u64) -> Self {
        Self { sources, seed }
    }

    /// Yahoo Finance, then FRED, then Alpha Vantage.
    pub fn standard(settings: &SourceSettings, seed: u64) -> Result<Self, FetchError> {
        let sources: Vec<Box<dyn PriceSource>> = vec![
            Box::new(YahooSource::new(settings)?),
            Box::new(FredSource::new(settings)?),
            Box::new(AlphaVantageSource::new(settings)?),
        ];
        Ok(Self::new(sources, seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Close-only series for forecasting.
    pub fn acquire_close(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Acquired<PriceSeries>, AcquireError> {
        self.walk(
            symbol,
            range,
            |raw| Ok(project_close(raw).filter(|s| !s.is_empty())),
            || synthetic::generate_series(&range, self.seed),
        )
    }

    /// OHLCV table for backtesting.
    pub fn acquire_ohlcv(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Acquired<OhlcvTable>, AcquireError> {
        self.walk(
            symbol,
            range,
            |raw| {
                let table = synthesize_ohlcv(&raw, self.seed)?;
                Ok((!table.is_empty()).then_some(table))
            },
            || synthetic::generate_ohlcv(&range, self.seed),
        )
    }

    pub fn acquire(
        &self,
        symbol: &str,
        range: DateRange,
        shape: OutputShape,
    ) -> Result<Acquired<Dataset>, AcquireError> {
        match shape {
            OutputShape::CloseOnly => Ok(self.acquire_close(symbol, range)?.map(Dataset::Close)),
            OutputShape::Ohlcv => Ok(self.acquire_ohlcv(symbol, range)?.map(Dataset::Ohlcv)),
        }
    }

    /// Try each source, converting the first non-empty result. `convert`
    /// returns `None` for data that is empty once normalized.
    fn walk<T>(
        &self,
        symbol: &str,
        range: DateRange,
        convert: impl Fn(RawData) -> Result<Option<T>, AcquireError>,
        fallback: impl FnOnce() -> T,
    ) -> Result<Acquired<T>, AcquireError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(AcquireError::EmptySymbol);
        }
        if range.business_days().is_empty() {
            return Err(AcquireError::NoBusinessDays(range));
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            let reason = match source.fetch(symbol, range) {
                Ok(raw) => {
                    let raw = raw.restrict(&range);
                    if raw.is_empty() {
                        FetchError::Empty {
                            symbol: symbol.to_string(),
                        }
                        .to_string()
                    } else {
                        match convert(raw) {
                            Ok(Some(data)) => {
                                tracing::info!(
                                    symbol,
                                    provider = source.name(),
                                    "acquired price data"
                                );
                                return Ok(Acquired {
                                    data,
                                    source: source.source(),
                                    failures,
                                });
                            }
                            Ok(None) => format!("no usable rows for {symbol} after cleaning"),
                            Err(e) => {
                                tracing::error!(
                                    symbol,
                                    provider = source.name(),
                                    error = %e,
                                    "source returned data in an unrecognized format"
                                );
                                return Err(e);
                            }
                        }
                    }
                }
                Err(e) => e.to_string(),
            };

            tracing::warn!(
                symbol,
                provider = source.name(),
                reason = %reason,
                "price source failed"
            );
            failures.push(SourceFailure {
                provider: source.name().to_string(),
                reason,
            });
        }

        tracing::info!(
            symbol,
            %range,
            seed = self.seed,
            "all price sources failed, generating synthetic data"
        );
        Ok(Acquired {
            data: fallback(),
            source: DataSource::Synthetic,
            failures,
        })
    }
}

/// Close-only view of source data: the adjusted close when present, else
/// `Close`, else the first column. Missing values are dropped.
fn project_close(raw: RawData) -> Option<PriceSeries> {
    match raw {
        RawData::Series(series) => Some(series),
        RawData::Table(table) => {
            let values = CLOSE_PREFERENCE
                .iter()
                .find_map(|name| table.column(name))
                .or_else(|| table.columns().first().map(|c| c.values.as_slice()))?;
            PriceSeries::from_optional("Close", table.dates(), values).ok()
        }
    }
}
