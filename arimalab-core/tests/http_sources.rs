//! HTTP adapters against a local stub server: retry policy, status
//! handling and circuit breakers.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use arimalab_core::data::alphavantage::AlphaVantageSource;
use arimalab_core::data::fred::FredSource;
use arimalab_core::data::yahoo::YahooSource;
use arimalab_core::data::{FetchError, PriceSource, SourceSettings};
use arimalab_core::domain::{DateRange, RawData};

const YAHOO_BODY: &str = include_str!("fixtures/yahoo_chart_spy.json");
const FRED_BODY: &str = include_str!("fixtures/fred_sp500.csv");
const NOT_FOUND_BODY: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;

// ── Stub server ──────────────────────────────────────────────────────

/// Serves the scripted responses in order, one connection each, then
/// stops listening. Records the request line of every request served.
struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl StubServer {
    fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        let handle = std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                let head = read_head(&mut stream);
                seen.lock().unwrap().push(head.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            base_url,
            requests,
            handle: Some(handle),
        }
    }

    /// Request lines served so far, once every scripted response is used.
    fn finish(mut self) -> Vec<String> {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        self.requests.lock().unwrap().clone()
    }
}

fn read_head(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn settings(base_url: &str) -> SourceSettings {
    SourceSettings {
        yahoo_base_url: base_url.to_string(),
        fred_base_url: base_url.to_string(),
        alpha_vantage_base_url: base_url.to_string(),
        alpha_vantage_api_key: Some("TESTKEY".into()),
        timeout_secs: 5,
        max_retries: 3,
        retry_base_delay_ms: 1,
    }
}

fn january() -> DateRange {
    DateRange::parse("2024-01-01", "2024-01-31").unwrap()
}

fn table_len(data: RawData) -> usize {
    match data {
        RawData::Table(t) => t.len(),
        RawData::Series(s) => s.len(),
    }
}

// ── Yahoo Finance ────────────────────────────────────────────────────

#[test]
fn yahoo_retries_server_errors_then_succeeds() {
    let server = StubServer::start(vec![(500, ""), (500, ""), (200, YAHOO_BODY)]);
    let source = YahooSource::new(&settings(&server.base_url)).unwrap();

    let data = source.fetch("SPY", january()).unwrap();

    assert_eq!(table_len(data), 3);
    let requests = server.finish();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].starts_with("GET /v8/finance/chart/SPY?"), "{}", requests[0]);
}

#[test]
fn yahoo_retries_rate_limit() {
    let server = StubServer::start(vec![(429, ""), (200, YAHOO_BODY)]);
    let source = YahooSource::new(&settings(&server.base_url)).unwrap();

    assert!(source.fetch("SPY", january()).is_ok());
    assert_eq!(server.finish().len(), 2);
}

#[test]
fn yahoo_forbidden_trips_breaker() {
    let server = StubServer::start(vec![(403, "")]);
    let source = YahooSource::new(&settings(&server.base_url)).unwrap();

    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::Http { status: 403, .. })
    ));
    assert_eq!(server.finish().len(), 1);

    // No request leaves the adapter while the breaker is open.
    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::CircuitOpen)
    ));
}

#[test]
fn yahoo_unauthorized_fails_without_retry() {
    let server = StubServer::start(vec![(401, "")]);
    let source = YahooSource::new(&settings(&server.base_url)).unwrap();

    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::Http { status: 401, .. })
    ));
    assert_eq!(server.finish().len(), 1);
}

#[test]
fn yahoo_not_found_body_means_no_data() {
    let server = StubServer::start(vec![(404, NOT_FOUND_BODY)]);
    let source = YahooSource::new(&settings(&server.base_url)).unwrap();

    assert!(matches!(
        source.fetch("NOPE", january()),
        Err(FetchError::Empty { .. })
    ));
    assert_eq!(server.finish().len(), 1);
}

#[test]
fn yahoo_persistent_server_errors_open_the_breaker() {
    let server = StubServer::start(vec![(503, ""), (503, ""), (503, "")]);
    let source = YahooSource::new(&settings(&server.base_url)).unwrap();

    // The third consecutive failure opens the breaker before the last retry.
    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::CircuitOpen)
    ));
    assert_eq!(server.finish().len(), 3);
}

// ── FRED and Alpha Vantage ───────────────────────────────────────────

#[test]
fn fred_reads_proxy_csv() {
    let server = StubServer::start(vec![(200, FRED_BODY)]);
    let source = FredSource::new(&settings(&server.base_url)).unwrap();

    let data = source.fetch("SPY", january()).unwrap();

    assert!(matches!(&data, RawData::Series(_)));
    assert_eq!(table_len(data), 4);
    let requests = server.finish();
    assert!(requests[0].contains("id=SP500"), "{}", requests[0]);
}

#[test]
fn fred_forbidden_trips_breaker() {
    let server = StubServer::start(vec![(403, "")]);
    let source = FredSource::new(&settings(&server.base_url)).unwrap();

    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::Http { status: 403, .. })
    ));
    server.finish();
    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::CircuitOpen)
    ));
}

#[test]
fn alpha_vantage_breaker_opens_after_three_server_errors() {
    let server = StubServer::start(vec![(500, ""), (500, ""), (500, "")]);
    let source = AlphaVantageSource::new(&settings(&server.base_url)).unwrap();

    for _ in 0..3 {
        assert!(matches!(
            source.fetch("SPY", january()),
            Err(FetchError::Http { status: 500, .. })
        ));
    }
    assert_eq!(server.finish().len(), 3);
    assert!(matches!(
        source.fetch("SPY", january()),
        Err(FetchError::CircuitOpen)
    ));
}

#[test]
fn alpha_vantage_rejection_does_not_count_against_breaker() {
    let note = r#"{"Note":"Our standard API rate limit is 25 requests per day."}"#;
    let server = StubServer::start(vec![(200, note), (200, note), (200, note), (200, note)]);
    let source = AlphaVantageSource::new(&settings(&server.base_url)).unwrap();

    for _ in 0..4 {
        assert!(matches!(
            source.fetch("SPY", january()),
            Err(FetchError::Rejected(_))
        ));
    }
    assert_eq!(server.finish().len(), 4);
}
