//! Close-only price series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{DateRange, DomainError};

/// One `(date, close)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Ordered closing prices. Dates are strictly increasing and every value is
/// finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    name: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(name: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, DomainError> {
        for p in &points {
            if !p.close.is_finite() {
                return Err(DomainError::MissingValue(p.date));
            }
        }
        for w in points.windows(2) {
            if w[0].date >= w[1].date {
                return Err(DomainError::Unordered {
                    prev: w[0].date,
                    next: w[1].date,
                });
            }
        }
        Ok(Self {
            name: name.into(),
            points,
        })
    }

    /// Skip validation for points already known to be ordered and finite.
    pub(crate) fn from_validated(name: impl Into<String>, points: Vec<PricePoint>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].date < w[1].date));
        Self {
            name: name.into(),
            points,
        }
    }

    /// Build a series from parallel date/value slices, skipping missing values.
    pub fn from_optional(
        name: impl Into<String>,
        dates: &[NaiveDate],
        values: &[Option<f64>],
    ) -> Result<Self, DomainError> {
        let points = dates
            .iter()
            .zip(values)
            .filter_map(|(&date, v)| match v {
                Some(close) if close.is_finite() => Some(PricePoint {
                    date,
                    close: *close,
                }),
                _ => None,
            })
            .collect();
        Self::new(name, points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Lowest and highest close, or `None` for an empty series.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let first = self.points.first()?.close;
        Some(self.points.iter().fold((first, first), |(lo, hi), p| {
            (lo.min(p.close), hi.max(p.close))
        }))
    }

    /// Keep only the observations inside `range`.
    pub fn restrict(self, range: &DateRange) -> Self {
        Self {
            name: self.name,
            points: self
                .points
                .into_iter()
                .filter(|p| range.contains(p.date))
                .collect(),
        }
    }

    /// The last `n` observations (or all of them when shorter).
    pub fn tail(&self, n: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }
}
