use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::FetchError;
use crate::providers::util::{build_client, http_status_error, malformed, request_error, validate_price};
use crate::providers::{Quote, QuoteProvider};

const PROVIDER: &str = "binance";

/// Quote currency used for all crypto pairs. USDT is treated as USD for
/// valuation purposes.
const QUOTE_ASSET: &str = "USDT";

/// Maps a holding symbol to the exchange pair, e.g. `BTC` to `BTCUSDT`.
pub fn pair_for(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    if upper.ends_with(QUOTE_ASSET) {
        upper
    } else {
        format!("{upper}{QUOTE_ASSET}")
    }
}

/// Inverse of [`pair_for`]: recovers the holding symbol from a tick's pair.
pub fn symbol_from_pair(pair: &str) -> String {
    pair.strip_suffix(QUOTE_ASSET).unwrap_or(pair).to_string()
}

/// Stream name for the trade feed of a holding symbol, e.g. `btcusdt@trade`.
pub fn stream_name(symbol: &str) -> String {
    format!("{}@trade", pair_for(symbol).to_lowercase())
}

/// Binance spot REST ticker. Primary crypto source.
pub struct BinanceProvider {
    base_url: String,
    timeout: Duration,
}

impl BinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        BinanceProvider {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

#[derive(Deserialize, Debug)]
struct TickerPriceResponse {
    price: String,
}

#[async_trait]
impl QuoteProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let observed_at = Utc::now();
        let pair = pair_for(symbol);
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, pair);
        debug!("Requesting ticker from {}", url);

        let client = build_client(PROVIDER, symbol, self.timeout)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, symbol, e))?;

        if !response.status().is_success() {
            return Err(http_status_error(PROVIDER, symbol, response.status()));
        }

        let data: TickerPriceResponse = response
            .json()
            .await
            .map_err(|e| malformed(PROVIDER, symbol, format!("invalid ticker payload: {e}")))?;

        let price = data
            .price
            .parse::<f64>()
            .map_err(|_| malformed(PROVIDER, symbol, format!("unparseable price: '{}'", data.price)))?;
        let price = validate_price(PROVIDER, symbol, price)?;

        Ok(Quote {
            price,
            currency: "USD".to_string(),
            observed_at,
            cached: false,
        })
    }
}
