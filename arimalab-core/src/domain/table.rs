//! Source-shaped tables, before normalization.
//!
//! Adapters hand back whatever column naming their provider uses. The
//! OHLCV synthesizer is the only place that interprets those names.

use chrono::NaiveDate;

use super::{DateRange, DomainError, PriceSeries};

/// A named column of optional values. `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// A date-indexed table with provider-specific column names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    dates: Vec<NaiveDate>,
    columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    /// Append a column. Non-finite values are stored as missing.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), DomainError> {
        let name = name.into();
        if values.len() != self.dates.len() {
            return Err(DomainError::ColumnLength {
                name,
                expected: self.dates.len(),
                got: values.len(),
            });
        }
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        self.columns.push(RawColumn { name, values });
        Ok(())
    }

    /// Builder form of [`push_column`](Self::push_column).
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, DomainError> {
        self.push_column(name, values)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Sort rows by date ascending and keep the first row for duplicate dates.
    pub fn sorted(self) -> Self {
        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&i| self.dates[i]);
        order.dedup_by_key(|i| self.dates[*i]);
        self.select_rows(&order)
    }

    /// Keep only rows dated inside `range`.
    pub fn restrict(self, range: &DateRange) -> Self {
        let keep: Vec<usize> = (0..self.dates.len())
            .filter(|&i| range.contains(self.dates[i]))
            .collect();
        self.select_rows(&keep)
    }

    fn select_rows(self, rows: &[usize]) -> Self {
        let dates = rows.iter().map(|&i| self.dates[i]).collect();
        let columns = self
            .columns
            .into_iter()
            .map(|c| RawColumn {
                values: rows.iter().map(|&i| c.values[i]).collect(),
                name: c.name,
            })
            .collect();
        Self { dates, columns }
    }
}

/// What a source adapter returns: a bare close series or a table.
#[derive(Debug, Clone, PartialEq)]
pub enum RawData {
    Series(PriceSeries),
    Table(RawTable),
}

impl RawData {
    pub fn len(&self) -> usize {
        match self {
            RawData::Series(s) => s.len(),
            RawData::Table(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sort, dedupe and drop rows outside `range`.
    pub fn restrict(self, range: &DateRange) -> Self {
        match self {
            RawData::Series(s) => RawData::Series(s.restrict(range)),
            RawData::Table(t) => RawData::Table(t.sorted().restrict(range)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn push_column_checks_length() {
        let mut t = RawTable::new(vec![d(2), d(3)]);
        let err = t.push_column("Close", vec![Some(1.0)]).unwrap_err();
        assert!(matches!(err, DomainError::ColumnLength { expected: 2, got: 1, .. }));
    }

    #[test]
    fn nan_is_stored_as_missing() {
        let t = RawTable::new(vec![d(2)])
            .with_column("Close", vec![Some(f64::NAN)])
            .unwrap();
        assert_eq!(t.column("Close"), Some(&[None][..]));
    }

    #[test]
    fn sorted_orders_and_dedupes() {
        let t = RawTable::new(vec![d(4), d(2), d(3), d(2)])
            .with_column("x", vec![Some(4.0), Some(2.0), Some(3.0), Some(9.0)])
            .unwrap()
            .sorted();
        assert_eq!(t.dates(), &[d(2), d(3), d(4)]);
        assert_eq!(t.column("x").unwrap(), &[Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn restrict_drops_out_of_range_rows() {
        let range = DateRange::new(d(3), d(4)).unwrap();
        let data = RawData::Table(
            RawTable::new(vec![d(5), d(4), d(3), d(2)])
                .with_column("x", vec![Some(5.0), Some(4.0), Some(3.0), Some(2.0)])
                .unwrap(),
        )
        .restrict(&range);
        match data {
            RawData::Table(t) => {
                assert_eq!(t.dates(), &[d(3), d(4)]);
                assert_eq!(t.column("x").unwrap(), &[Some(3.0), Some(4.0)]);
            }
            RawData::Series(_) => panic!("expected table"),
        }
    }
}
