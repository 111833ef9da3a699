//! Connection settings shared by the HTTP price sources.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::FetchError;

/// Environment variable holding the Alpha Vantage key.
pub const ALPHA_VANTAGE_KEY_VAR: &str = "ALPHA_VANTAGE_API_KEY";

/// Placeholder value shipped in sample `.env` files; treated as "no key".
const PLACEHOLDER_KEY: &str = "your_api_key_here";

/// Key used when no real one is configured. Alpha Vantage serves a handful
/// of demo symbols with it and rejects the rest.
pub const DEMO_KEY: &str = "demo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub yahoo_base_url: String,
    pub fred_base_url: String,
    pub alpha_vantage_base_url: String,
    /// Overrides the environment variable when set.
    pub alpha_vantage_api_key: Option<String>,
    pub timeout_secs: u64,
    /// Retries on transient Yahoo failures (connect, timeout, 429, 5xx).
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            yahoo_base_url: "https://query2.finance.yahoo.com".into(),
            fred_base_url: "https://fred.stlouisfed.org".into(),
            alpha_vantage_base_url: "https://www.alphavantage.co".into(),
            alpha_vantage_api_key: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl SourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the Alpha Vantage key: explicit setting, then environment,
    /// then the demo key. The flag is true when a real key was found.
    pub fn resolve_api_key(&self) -> (String, bool) {
        let configured = self
            .alpha_vantage_api_key
            .clone()
            .or_else(|| std::env::var(ALPHA_VANTAGE_KEY_VAR).ok());
        match configured {
            Some(key) if is_real_key(&key) => (key.trim().to_string(), true),
            _ => (DEMO_KEY.to_string(), false),
        }
    }
}

fn is_real_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != PLACEHOLDER_KEY && key != DEMO_KEY
}

/// Build the blocking HTTP client used by every source.
pub fn build_client(settings: &SourceSettings) -> Result<reqwest::blocking::Client, FetchError> {
    reqwest::blocking::Client::builder()
        .timeout(settings.timeout())
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .build()
        .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))
}

/// Map a transport error onto the fetch taxonomy.
pub(crate) fn transport_error(e: reqwest::Error) -> FetchError {
    if let Some(status) = e.status() {
        return FetchError::Http {
            status: status.as_u16(),
            symbol: e.url().map(|u| u.path().to_string()).unwrap_or_default(),
        };
    }
    FetchError::Network(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_key_downgrades_to_demo() {
        let settings = SourceSettings {
            alpha_vantage_api_key: Some("your_api_key_here".into()),
            ..SourceSettings::default()
        };
        assert_eq!(settings.resolve_api_key(), ("demo".to_string(), false));
    }

    #[test]
    fn explicit_key_wins() {
        let settings = SourceSettings {
            alpha_vantage_api_key: Some(" ABC123 ".into()),
            ..SourceSettings::default()
        };
        assert_eq!(settings.resolve_api_key(), ("ABC123".to_string(), true));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let s: SourceSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, SourceSettings::default());
    }
}
