//! FX rate fallback and multi-leg currency conversion.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::core::cache::FetchCache;
use crate::core::errors::FetchError;
use crate::core::model::PriceSource;
use crate::providers::{PriceAdapter, Quote, RateProvider};

/// Ordered FX rate sources behind the fetch cache. Identity conversions
/// short-circuit to 1.0 without touching any upstream.
pub struct RateChain {
    providers: Vec<Arc<dyn RateProvider>>,
    cache: Arc<FetchCache<f64>>,
    ttl: Duration,
}

impl RateChain {
    pub fn new(
        providers: Vec<Arc<dyn RateProvider>>,
        cache: Arc<FetchCache<f64>>,
        ttl: Duration,
    ) -> Self {
        RateChain {
            providers,
            cache,
            ttl,
        }
    }

    pub async fn get_rate(&self, from: &str, to: &str) -> Result<(f64, PriceSource), FetchError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok((1.0, PriceSource::Poll));
        }

        let key = format!("fx:{from}{to}");
        if let Some(rate) = self.cache.get(&key).await {
            return Ok((rate, PriceSource::Cache));
        }

        let mut attempts = Vec::with_capacity(self.providers.len());
        for (index, provider) in self.providers.iter().enumerate() {
            match provider.get_rate(from, to).await {
                Ok(rate) => {
                    self.cache.put(&key, rate, self.ttl).await;
                    let source = if index == 0 {
                        PriceSource::Poll
                    } else {
                        PriceSource::Fallback
                    };
                    return Ok((rate, source));
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        from, to, error = %e,
                        "Rate provider failed, falling through"
                    );
                    attempts.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        Err(FetchError::UpstreamUnavailable {
            symbol: format!("{from}{to}"),
            attempts,
        })
    }
}

/// Multi-leg adapter: fetches the native-currency quote through the inner
/// adapter and converts into the base currency. If the FX leg fails the
/// whole fetch fails; a partial composite is never returned.
pub struct ConvertedAdapter {
    inner: Arc<dyn PriceAdapter>,
    rates: Arc<RateChain>,
    base_currency: String,
}

impl ConvertedAdapter {
    pub fn new(inner: Arc<dyn PriceAdapter>, rates: Arc<RateChain>, base_currency: &str) -> Self {
        ConvertedAdapter {
            inner,
            rates,
            base_currency: base_currency.to_string(),
        }
    }
}

#[async_trait]
impl PriceAdapter for ConvertedAdapter {
    async fn fetch_price(&self, symbol: &str) -> Result<(Quote, PriceSource), FetchError> {
        let (quote, source) = self.inner.fetch_price(symbol).await?;
        if quote.currency.eq_ignore_ascii_case(&self.base_currency) {
            return Ok((quote, source));
        }

        let (rate, _) = self.rates.get_rate(&quote.currency, &self.base_currency).await?;
        Ok((
            Quote {
                price: quote.price * rate,
                currency: self.base_currency.clone(),
                ..quote
            },
            source,
        ))
    }
}

/// Prices a foreign-cash holding: the "price" of `EUR` in a USD-based
/// portfolio is the EUR to USD rate.
pub struct CurrencyAdapter {
    rates: Arc<RateChain>,
    base_currency: String,
}

impl CurrencyAdapter {
    pub fn new(rates: Arc<RateChain>, base_currency: &str) -> Self {
        CurrencyAdapter {
            rates,
            base_currency: base_currency.to_string(),
        }
    }
}

#[async_trait]
impl PriceAdapter for CurrencyAdapter {
    async fn fetch_price(&self, symbol: &str) -> Result<(Quote, PriceSource), FetchError> {
        let observed_at = Utc::now();
        let (rate, source) = self.rates.get_rate(symbol, &self.base_currency).await?;
        Ok((
            Quote {
                price: rate,
                currency: self.base_currency.clone(),
                observed_at,
                cached: source == PriceSource::Cache,
            },
            source,
        ))
    }
}
