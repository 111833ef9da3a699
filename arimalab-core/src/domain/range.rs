//! Inclusive calendar date range.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::DomainError;

/// Inclusive `(start, end)` pair of calendar dates with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, DomainError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn calendar_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Every Monday–Friday date in the range, ascending. Holidays are not
    /// excluded.
    pub fn business_days(&self) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DomainError::InvalidDate(s.to_string()))
}

#[derive(Serialize, Deserialize)]
struct RangeRepr {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RangeRepr> for DateRange {
    type Error = DomainError;

    fn try_from(repr: RangeRepr) -> Result<Self, Self::Error> {
        DateRange::new(repr.start, repr.end)
    }
}

impl From<DateRange> for RangeRepr {
    fn from(range: DateRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}
