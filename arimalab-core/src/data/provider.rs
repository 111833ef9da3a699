//! Price source trait and structured fetch errors.
//!
//! The PriceSource trait abstracts over the real data providers (Yahoo
//! Finance, FRED, Alpha Vantage) so the orchestrator can walk them in order
//! and tests can swap in fakes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DateRange, RawData};

/// Adapter-level failures. All of these are absorbed by the orchestrator
/// and trigger the next source in line.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("response format changed: {0}")]
    Parse(String),

    #[error("no data returned for {symbol}")]
    Empty { symbol: String },

    #[error("symbol {symbol} is not supported by {provider}")]
    UnsupportedSymbol { symbol: String, provider: String },

    #[error("circuit breaker open: provider disabled after repeated failures")]
    CircuitOpen,
}

/// Where acquired data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    Fred,
    AlphaVantage,
    Synthetic,
    Snapshot,
}

impl DataSource {
    pub fn label(&self) -> &'static str {
        match self {
            DataSource::YahooFinance => "Yahoo Finance",
            DataSource::Fred => "FRED",
            DataSource::AlphaVantage => "Alpha Vantage",
            DataSource::Synthetic => "synthetic",
            DataSource::Snapshot => "snapshot",
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataSource::Synthetic)
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A source of daily price data for one symbol.
///
/// Implementations perform blocking I/O. They report failure through
/// [`FetchError`] and never fall back on their own; fallback is the
/// orchestrator's job.
pub trait PriceSource: Send + Sync {
    /// Short machine-friendly name, used in logs.
    fn name(&self) -> &str;

    /// Provenance tag attached to data from this source.
    fn source(&self) -> DataSource;

    /// Fetch daily data for `symbol` covering `range`. May return rows outside
    /// the range; the caller trims.
    fn fetch(&self, symbol: &str, range: DateRange) -> Result<RawData, FetchError>;
}
