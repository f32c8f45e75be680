use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::FetchError;
use crate::providers::util::{build_client, http_status_error, malformed, request_error, validate_price};
use crate::providers::{Quote, QuoteProvider};

const PROVIDER: &str = "coingecko";

/// CoinGecko uses slug ids rather than ticker symbols.
fn coin_id(symbol: &str) -> String {
    match symbol.to_uppercase().as_str() {
        "BTC" => "bitcoin".to_string(),
        "ETH" => "ethereum".to_string(),
        "SOL" => "solana".to_string(),
        "BNB" => "binancecoin".to_string(),
        "XRP" => "ripple".to_string(),
        "ADA" => "cardano".to_string(),
        "DOGE" => "dogecoin".to_string(),
        "DOT" => "polkadot".to_string(),
        "AVAX" => "avalanche-2".to_string(),
        "LTC" => "litecoin".to_string(),
        _ => symbol.to_lowercase(),
    }
}

/// CoinGecko simple-price API. Crypto fallback when the exchange REST
/// ticker is unavailable.
pub struct CoinGeckoProvider {
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        CoinGeckoProvider {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl QuoteProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let observed_at = Utc::now();
        let id = coin_id(symbol);
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd",
            self.base_url, id
        );
        debug!("Requesting simple price from {}", url);

        let client = build_client(PROVIDER, symbol, self.timeout)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, symbol, e))?;

        if !response.status().is_success() {
            return Err(http_status_error(PROVIDER, symbol, response.status()));
        }

        let data: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| malformed(PROVIDER, symbol, format!("invalid price payload: {e}")))?;

        let price = data
            .get(&id)
            .and_then(|prices| prices.get("usd"))
            .copied()
            .ok_or_else(|| malformed(PROVIDER, symbol, format!("no usd price for id '{id}'")))?;
        let price = validate_price(PROVIDER, symbol, price)?;

        Ok(Quote {
            price,
            currency: "USD".to_string(),
            observed_at,
            cached: false,
        })
    }
}
