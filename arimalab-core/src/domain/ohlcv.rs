//! Canonical OHLCV table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{DomainError, PricePoint, PriceSeries};

/// One daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl OhlcvRow {
    /// True when every price is finite.
    pub fn is_complete(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
    }

    /// `low <= min(open, close)` and `high >= max(open, close)`.
    pub fn is_sane(&self) -> bool {
        self.is_complete()
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
    }

    /// Widen high/low so the row satisfies [`is_sane`](Self::is_sane).
    /// Leaves open and close untouched.
    pub fn clamp(mut self) -> Self {
        self.high = self.high.max(self.open).max(self.close);
        self.low = self.low.min(self.open).min(self.close);
        self
    }
}

/// Backtesting-ready daily bars. Dates strictly increase, every row is sane
/// and has positive volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvTable {
    rows: Vec<OhlcvRow>,
}

impl OhlcvTable {
    pub fn new(rows: Vec<OhlcvRow>) -> Result<Self, DomainError> {
        for row in &rows {
            if !row.is_complete() {
                return Err(DomainError::MissingValue(row.date));
            }
            if !row.is_sane() {
                return Err(DomainError::InsaneRow(row.date));
            }
            if row.volume == 0 {
                return Err(DomainError::ZeroVolume(row.date));
            }
        }
        for w in rows.windows(2) {
            if w[0].date >= w[1].date {
                return Err(DomainError::Unordered {
                    prev: w[0].date,
                    next: w[1].date,
                });
            }
        }
        Ok(Self { rows })
    }

    /// Wrap rows built by a generator that upholds the invariants itself.
    pub(crate) fn from_validated(rows: Vec<OhlcvRow>) -> Self {
        debug_assert!(rows.iter().all(|r| r.is_sane() && r.volume > 0));
        debug_assert!(rows.windows(2).all(|w| w[0].date < w[1].date));
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[OhlcvRow] {
        &self.rows
    }

    pub fn first(&self) -> Option<&OhlcvRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&OhlcvRow> {
        self.rows.last()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    /// Project the close column.
    pub fn close_series(&self) -> PriceSeries {
        let points = self
            .rows
            .iter()
            .map(|r| PricePoint {
                date: r.date,
                close: r.close,
            })
            .collect();
        // Rows already satisfy the series invariants.
        PriceSeries::from_validated("Close", points)
    }
}
