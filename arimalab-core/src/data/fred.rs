//! FRED price source (second free source).
//!
//! FRED publishes index levels, not ETF prices, so this source only serves
//! symbols with a known proxy series (SPY is answered with the S&P 500
//! index). The graph CSV endpoint needs no API key.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataSource, FetchError, PriceSource};
use super::settings::{build_client, transport_error, SourceSettings};
use crate::domain::{parse_date, DateRange, PriceSeries, RawData};

/// Index series standing in for index-tracking symbols.
pub fn proxy_series(symbol: &str) -> Option<&'static str> {
    match symbol.to_ascii_uppercase().as_str() {
        "SPY" | "^GSPC" | "SP500" => Some("SP500"),
        "DIA" | "^DJI" | "DJIA" => Some("DJIA"),
        "QQQ" | "^NDX" | "NASDAQ100" => Some("NASDAQ100"),
        _ => None,
    }
}

pub struct FredSource {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: CircuitBreaker,
}

impl FredSource {
    pub fn new(settings: &SourceSettings) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: settings.fred_base_url.trim_end_matches('/').to_string(),
            circuit_breaker: CircuitBreaker::default_provider(),
        })
    }

    fn csv_url(&self, series_id: &str, range: DateRange) -> String {
        format!(
            "{}/graph/fredgraph.csv?id={series_id}&cosd={}&coed={}",
            self.base_url,
            range.start(),
            range.end()
        )
    }

    fn download(&self, series_id: &str, range: DateRange) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(self.csv_url(series_id, range))
            .send()
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                symbol: series_id.to_string(),
            });
        }
        resp.text().map_err(transport_error)
    }

    /// Parse a `fredgraph.csv` body: a date column and one value column,
    /// with `.` marking days without an observation.
    pub(crate) fn parse_csv(series_id: &str, body: &str) -> Result<PriceSeries, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| FetchError::Parse(format!("FRED header: {e}")))?;
        if headers.len() < 2 {
            return Err(FetchError::Parse(format!(
                "expected a date and a value column, got {:?}",
                headers.iter().collect::<Vec<_>>()
            )));
        }

        let mut dates = Vec::new();
        let mut values = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| FetchError::Parse(format!("FRED record: {e}")))?;
            let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
                continue;
            };
            let date = parse_date(date).map_err(|e| FetchError::Parse(e.to_string()))?;
            dates.push(date);
            values.push(value.parse::<f64>().ok());
        }

        let series = PriceSeries::from_optional("Close", &dates, &values)
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        if series.is_empty() {
            return Err(FetchError::Empty {
                symbol: series_id.to_string(),
            });
        }
        Ok(series)
    }
}

impl PriceSource for FredSource {
    fn name(&self) -> &str {
        "fred"
    }

    fn source(&self) -> DataSource {
        DataSource::Fred
    }

    fn fetch(&self, symbol: &str, range: DateRange) -> Result<RawData, FetchError> {
        let series_id = proxy_series(symbol).ok_or_else(|| FetchError::UnsupportedSymbol {
            symbol: symbol.to_string(),
            provider: self.name().to_string(),
        })?;
        if !self.circuit_breaker.is_allowed() {
            return Err(FetchError::CircuitOpen);
        }
        tracing::debug!(symbol, series_id, "requesting FRED proxy series");

        let body = self.download(series_id, range);
        self.circuit_breaker.record_outcome(&body);
        Self::parse_csv(series_id, &body?).map(RawData::Series)
    }
}
