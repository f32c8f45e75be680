use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::FetchError;
use crate::providers::util::{build_client, http_status_error, malformed, request_error, validate_price};
use crate::providers::RateProvider;

const PROVIDER: &str = "frankfurter";

/// Frankfurter ECB-reference rates. FX fallback when the primary rate
/// source is unavailable.
pub struct FrankfurterProvider {
    base_url: String,
    timeout: Duration,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        FrankfurterProvider {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

#[derive(Deserialize, Debug)]
struct LatestRatesResponse {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, FetchError> {
        let pair = format!("{from}{to}");
        let url = format!(
            "{}/v1/latest?base={}&symbols={}",
            self.base_url, from, to
        );
        debug!("Requesting rate from {}", url);

        let client = build_client(PROVIDER, &pair, self.timeout)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &pair, e))?;

        if !response.status().is_success() {
            return Err(http_status_error(PROVIDER, &pair, response.status()));
        }

        let data: LatestRatesResponse = response
            .json()
            .await
            .map_err(|e| malformed(PROVIDER, &pair, format!("invalid rates payload: {e}")))?;

        let rate = data
            .rates
            .get(to)
            .copied()
            .ok_or_else(|| malformed(PROVIDER, &pair, format!("no rate for '{to}'")))?;
        validate_price(PROVIDER, &pair, rate)
    }
}
