use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::FetchError;
use crate::providers::util::{build_client, http_status_error, malformed, request_error, validate_price};
use crate::providers::{Quote, QuoteProvider};

const PROVIDER: &str = "stooq";

/// Stooq CSV quote endpoint. Fallback for equity, fund and commodity
/// symbols when the primary chart API is unavailable.
///
/// Stooq does not report a currency; quotes are in the listing market's
/// currency and the market is encoded in the symbol suffix.
pub struct StooqProvider {
    base_url: String,
    timeout: Duration,
}

impl StooqProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        StooqProvider {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

/// Quote currency for a stooq market suffix, e.g. `aapl.us` or `sap.de`.
/// A symbol without a known suffix cannot be labeled reliably and is
/// rejected before any request is issued.
fn currency_for(symbol: &str) -> Option<&'static str> {
    let (_, suffix) = symbol.rsplit_once('.')?;
    match suffix.to_lowercase().as_str() {
        "us" => Some("USD"),
        "uk" => Some("GBP"),
        "de" | "fr" | "nl" | "it" | "es" | "pt" | "be" | "at" | "fi" | "ie" => Some("EUR"),
        "jp" => Some("JPY"),
        "pl" => Some("PLN"),
        "hu" => Some("HUF"),
        "hk" => Some("HKD"),
        "ch" => Some("CHF"),
        _ => None,
    }
}

/// Response body is `Symbol,Date,Time,Open,High,Low,Close,Volume` with a
/// header row; missing quotes come back as `N/D` fields.
fn parse_close(symbol: &str, body: &str) -> Result<f64, FetchError> {
    let line = body
        .lines()
        .nth(1)
        .ok_or_else(|| malformed(PROVIDER, symbol, "missing data row"))?;

    let close = line
        .split(',')
        .nth(6)
        .ok_or_else(|| malformed(PROVIDER, symbol, "missing close column"))?;

    close
        .trim()
        .parse::<f64>()
        .map_err(|_| malformed(PROVIDER, symbol, format!("unparseable close: '{close}'")))
}

#[async_trait]
impl QuoteProvider for StooqProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let currency = currency_for(symbol).ok_or_else(|| {
            malformed(PROVIDER, symbol, "unknown market suffix, cannot label currency")
        })?;
        let observed_at = Utc::now();
        let url = format!(
            "{}/q/l/?s={}&f=sd2t2ohlcv&h&e=csv",
            self.base_url,
            symbol.to_lowercase()
        );
        debug!("Requesting quote from {}", url);

        let client = build_client(PROVIDER, symbol, self.timeout)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, symbol, e))?;

        if !response.status().is_success() {
            return Err(http_status_error(PROVIDER, symbol, response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| request_error(PROVIDER, symbol, e))?;

        let price = validate_price(PROVIDER, symbol, parse_close(symbol, &body)?)?;

        Ok(Quote {
            price,
            currency: currency.to_string(),
            observed_at,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_csv_server(symbol: &str, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q/l/"))
            .and(query_param("s", symbol))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[test]
    fn test_currency_follows_market_suffix() {
        assert_eq!(currency_for("AAPL.US"), Some("USD"));
        assert_eq!(currency_for("sap.de"), Some("EUR"));
        assert_eq!(currency_for("7203.jp"), Some("JPY"));
        assert_eq!(currency_for("VOD.UK"), Some("GBP"));
        // No suffix or an unknown market cannot be labeled
        assert_eq!(currency_for("AAPL"), None);
        assert_eq!(currency_for("THYAO.IS"), None);
    }

    #[tokio::test]
    async fn test_successful_csv_fetch() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\nspy.us,2024-05-01,22:00:00,500.1,505.0,499.2,503.75,1000000\n";
        let mock_server = mock_csv_server("spy.us", body).await;
        let provider = StooqProvider::new(&mock_server.uri(), Duration::from_secs(5));

        let quote = provider.fetch_quote("SPY.US").await.unwrap();
        assert_eq!(quote.price, 503.75);
        assert_eq!(quote.currency, "USD");
    }

    #[tokio::test]
    async fn test_foreign_listing_keeps_market_currency() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\nsap.de,2024-05-01,17:30:00,180.1,184.0,179.2,182.40,500000\n";
        let mock_server = mock_csv_server("sap.de", body).await;
        let provider = StooqProvider::new(&mock_server.uri(), Duration::from_secs(5));

        let quote = provider.fetch_quote("SAP.DE").await.unwrap();
        assert_eq!(quote.price, 182.40);
        assert_eq!(quote.currency, "EUR");
    }

    #[tokio::test]
    async fn test_unknown_suffix_is_malformed_without_a_request() {
        // No mock mounted; the symbol is rejected before any request
        let provider = StooqProvider::new("http://127.0.0.1:1", Duration::from_secs(5));

        let result = provider.fetch_quote("THYAO.IS").await;
        assert!(matches!(result, Err(FetchError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_missing_quote_is_malformed() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\nbogus.us,N/D,N/D,N/D,N/D,N/D,N/D,N/D\n";
        let mock_server = mock_csv_server("bogus.us", body).await;
        let provider = StooqProvider::new(&mock_server.uri(), Duration::from_secs(5));

        let result = provider.fetch_quote("BOGUS.US").await;
        assert!(matches!(result, Err(FetchError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_empty_body_is_malformed() {
        let mock_server = mock_csv_server("empty.us", "").await;
        let provider = StooqProvider::new(&mock_server.uri(), Duration::from_secs(5));

        let result = provider.fetch_quote("EMPTY.US").await;
        assert!(matches!(result, Err(FetchError::Malformed { .. })));
    }
}
