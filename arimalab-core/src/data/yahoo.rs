//! Yahoo Finance price source (first free source).
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API. Handles rate limiting,
//! retries with exponential backoff, response parsing and the circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; a parse failure is just another reason to move to the next source.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataSource, FetchError, PriceSource};
use super::settings::{build_client, SourceSettings};
use crate::domain::{DateRange, RawData, RawTable};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooSource {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: CircuitBreaker,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooSource {
    pub fn new(settings: &SourceSettings) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: settings.yahoo_base_url.trim_end_matches('/').to_string(),
            circuit_breaker: CircuitBreaker::default_provider(),
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        })
    }

    /// Build the chart API URL for a symbol and date range.
    fn chart_url(&self, symbol: &str, range: DateRange) -> String {
        let start_ts = day_start_ts(range.start());
        let end_ts = day_start_ts(range.end()) + 86_399;
        format!(
            "{}/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true",
            self.base_url
        )
    }

    /// Parse a chart API response into a table with Yahoo's column names
    /// (`Open`, `High`, `Low`, `Close`, `Adj Close`, `Volume`).
    pub(crate) fn parse_response(
        symbol: &str,
        resp: ChartResponse,
    ) -> Result<RawTable, FetchError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => FetchError::Empty {
                symbol: symbol.to_string(),
            },
            Some(err) => FetchError::Parse(format!("{}: {}", err.code, err.description)),
            None => FetchError::Parse("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Parse("result array is empty".into()))?;

        // A symbol with no trades in the window comes back without timestamps.
        let Some(timestamps) = data.timestamp else {
            return Err(FetchError::Empty {
                symbol: symbol.to_string(),
            });
        };

        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose)
            .unwrap_or_default();

        let mut dates = Vec::with_capacity(timestamps.len());
        let mut cols: [Vec<Option<f64>>; 6] = Default::default();

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| FetchError::Parse(format!("invalid timestamp: {ts}")))?;

            let row = [
                cell(&quote.open, i),
                cell(&quote.high, i),
                cell(&quote.low, i),
                cell(&quote.close, i),
                cell(&adj_closes, i),
                cell(&quote.volume, i),
            ];

            // Holidays and halted days come back as all-null rows.
            if row.iter().all(Option::is_none) {
                continue;
            }

            dates.push(date);
            for (col, value) in cols.iter_mut().zip(row) {
                col.push(value);
            }
        }

        if dates.is_empty() {
            return Err(FetchError::Empty {
                symbol: symbol.to_string(),
            });
        }

        let mut table = RawTable::new(dates);
        let [open, high, low, close, adj_close, volume] = cols;
        for (name, values) in [
            ("Open", open),
            ("High", high),
            ("Low", low),
            ("Close", close),
            ("Adj Close", adj_close),
            ("Volume", volume),
        ] {
            table
                .push_column(name, values)
                .map_err(|e| FetchError::Parse(e.to_string()))?;
        }
        Ok(table)
    }

    /// Execute the request with retry and circuit breaker logic.
    fn fetch_with_retry(&self, symbol: &str, range: DateRange) -> Result<RawTable, FetchError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(FetchError::CircuitOpen);
        }

        let url = self.chart_url(symbol, range);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(
                    symbol,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying Yahoo request"
                );
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(FetchError::CircuitOpen);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(FetchError::Network(e.to_string()));
                    continue;
                }
                Err(e) => return Err(FetchError::Network(e.to_string())),
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    symbol: symbol.to_string(),
                });
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(FetchError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if status.is_server_error() {
                self.circuit_breaker.record_failure();
                last_error = Some(FetchError::Http {
                    status: status.as_u16(),
                    symbol: symbol.to_string(),
                });
                continue;
            }

            // 404 still carries a JSON body with a "Not Found" chart error.
            if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    symbol: symbol.to_string(),
                });
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                FetchError::Parse(format!("failed to parse response for {symbol}: {e}"))
            })?;

            let table = Self::parse_response(symbol, chart)?;
            self.circuit_breaker.record_success();
            return Ok(table);
        }

        Err(last_error.unwrap_or_else(|| FetchError::Network("max retries exceeded".into())))
    }
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn source(&self) -> DataSource {
        DataSource::YahooFinance
    }

    fn fetch(&self, symbol: &str, range: DateRange) -> Result<RawData, FetchError> {
        self.fetch_with_retry(symbol, range).map(RawData::Table)
    }
}

fn cell(col: &[Option<f64>], i: usize) -> Option<f64> {
    col.get(i).copied().flatten()
}

fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
