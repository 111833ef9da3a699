//! Domain types for ArimaLab

pub mod ohlcv;
pub mod range;
pub mod series;
pub mod table;

pub use ohlcv::{OhlcvRow, OhlcvTable};
pub use range::{parse_date, DateRange};
pub use series::{PricePoint, PriceSeries};
pub use table::{RawColumn, RawData, RawTable};

use chrono::NaiveDate;
use thiserror::Error;

/// Validation failures when building domain values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("dates must be strictly increasing: {prev} followed by {next}")]
    Unordered { prev: NaiveDate, next: NaiveDate },

    #[error("missing or non-finite value on {0}")]
    MissingValue(NaiveDate),

    #[error("OHLC invariant violated on {0}")]
    InsaneRow(NaiveDate),

    #[error("volume must be positive on {0}")]
    ZeroVolume(NaiveDate),

    #[error("column '{name}' has {got} values, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        got: usize,
    },
}
