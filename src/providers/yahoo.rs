use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::errors::FetchError;
use crate::providers::util::{
    build_client, http_status_error, malformed, request_error, validate_price,
};
use crate::providers::{Quote, QuoteProvider, RateProvider};

const PROVIDER: &str = "yahoo";

/// Yahoo Finance chart endpoint. Primary source for stocks, funds,
/// eurobonds and commodity futures symbols.
pub struct YahooProvider {
    base_url: String,
    timeout: Duration,
}

impl YahooProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        YahooProvider {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    currency: String,
}

async fn fetch_chart_meta(
    base_url: &str,
    symbol: &str,
    timeout: Duration,
) -> Result<ChartMeta, FetchError> {
    let url = format!("{base_url}/v8/finance/chart/{symbol}?interval=1d&range=1d");
    debug!("Requesting price data from {}", url);

    let client = build_client(PROVIDER, symbol, timeout)?;
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| request_error(PROVIDER, symbol, e))?;

    if !response.status().is_success() {
        return Err(http_status_error(PROVIDER, symbol, response.status()));
    }

    let text = response
        .text()
        .await
        .map_err(|e| request_error(PROVIDER, symbol, e))?;

    let data: YahooChartResponse = serde_json::from_str(&text)
        .map_err(|e| malformed(PROVIDER, symbol, format!("invalid chart payload: {e}")))?;

    data.chart
        .result
        .and_then(|items| items.into_iter().next())
        .map(|item| item.meta)
        .ok_or_else(|| malformed(PROVIDER, symbol, "no chart result"))
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(name = "YahooQuoteFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let observed_at = Utc::now();
        let meta = fetch_chart_meta(&self.base_url, symbol, self.timeout).await?;
        let price = validate_price(PROVIDER, symbol, meta.regular_market_price)?;

        Ok(Quote {
            price,
            currency: meta.currency,
            observed_at,
            cached: false,
        })
    }
}

/// FX rates via Yahoo's `{from}{to}=X` synthetic symbols.
pub struct YahooRates {
    base_url: String,
    timeout: Duration,
}

impl YahooRates {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        YahooRates {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl RateProvider for YahooRates {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, FetchError> {
        let symbol = format!("{from}{to}=X");
        let meta = fetch_chart_meta(&self.base_url, &symbol, self.timeout).await?;
        validate_price(PROVIDER, &symbol, meta.regular_market_price)
    }
}
