//! Alpha Vantage price source (keyed API).
//!
//! Uses `TIME_SERIES_DAILY_ADJUSTED` with `outputsize=full`, so the whole
//! history comes back newest first; the orchestrator sorts and trims it.
//! Column names are kept exactly as Alpha Vantage sends them.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataSource, FetchError, PriceSource};
use super::settings::{build_client, transport_error, SourceSettings};
use crate::domain::{parse_date, DateRange, RawData, RawTable};

/// Columns read from each daily record, in output order.
pub const COLUMNS: [&str; 6] = [
    "1. open",
    "2. high",
    "3. low",
    "4. close",
    "5. adjusted close",
    "6. volume",
];

#[derive(Debug, Deserialize)]
pub(crate) struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, BTreeMap<String, String>>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

pub struct AlphaVantageSource {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    circuit_breaker: CircuitBreaker,
}

impl AlphaVantageSource {
    /// Resolve the key once. Without a usable key the demo key is used,
    /// which Alpha Vantage only honours for a few sample symbols.
    pub fn new(settings: &SourceSettings) -> Result<Self, FetchError> {
        let (api_key, real) = settings.resolve_api_key();
        if !real {
            tracing::info!("no Alpha Vantage API key configured, using the demo key");
        }
        Ok(Self {
            client: build_client(settings)?,
            base_url: settings.alpha_vantage_base_url.trim_end_matches('/').to_string(),
            api_key,
            circuit_breaker: CircuitBreaker::default_provider(),
        })
    }

    fn query_url(&self, symbol: &str) -> String {
        format!(
            "{}/query?function=TIME_SERIES_DAILY_ADJUSTED&symbol={symbol}\
             &outputsize=full&apikey={}",
            self.base_url, self.api_key
        )
    }

    fn download(&self, symbol: &str) -> Result<DailyResponse, FetchError> {
        let resp = self
            .client
            .get(self.query_url(symbol))
            .send()
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }
        resp.json().map_err(|e| {
            FetchError::Parse(format!("failed to parse response for {symbol}: {e}"))
        })
    }

    pub(crate) fn parse_response(
        symbol: &str,
        resp: DailyResponse,
    ) -> Result<RawTable, FetchError> {
        if let Some(msg) = resp.error_message.or(resp.information).or(resp.note) {
            return Err(FetchError::Rejected(msg));
        }
        let series = resp
            .series
            .ok_or_else(|| FetchError::Parse("missing \"Time Series (Daily)\"".into()))?;

        let mut dates = Vec::with_capacity(series.len());
        let mut cols: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(series.len()); COLUMNS.len()];

        // BTreeMap iteration yields ISO dates in ascending order.
        for (date, record) in &series {
            dates.push(parse_date(date).map_err(|e| FetchError::Parse(e.to_string()))?);
            for (col, name) in cols.iter_mut().zip(COLUMNS) {
                col.push(record.get(name).and_then(|v| v.trim().parse::<f64>().ok()));
            }
        }

        if dates.is_empty() {
            return Err(FetchError::Empty {
                symbol: symbol.to_string(),
            });
        }

        let mut table = RawTable::new(dates);
        for (name, values) in COLUMNS.into_iter().zip(cols) {
            table
                .push_column(name, values)
                .map_err(|e| FetchError::Parse(e.to_string()))?;
        }
        Ok(table)
    }
}

impl PriceSource for AlphaVantageSource {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn source(&self) -> DataSource {
        DataSource::AlphaVantage
    }

    fn fetch(&self, symbol: &str, _range: DateRange) -> Result<RawData, FetchError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(FetchError::CircuitOpen);
        }
        let body = self.download(symbol);
        self.circuit_breaker.record_outcome(&body);
        Self::parse_response(symbol, body?).map(RawData::Table)
    }
}
