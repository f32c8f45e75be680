//! Cache wrapper and ordered fallback chain over quote providers.
//!
//! The fallback policy is data-driven: providers are tried in list order
//! and the chain fails only after every provider has been attempted.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::core::cache::FetchCache;
use crate::core::errors::FetchError;
use crate::core::model::PriceSource;
use crate::providers::{PriceAdapter, Quote, QuoteProvider};

/// Wraps a provider with the TTL fetch cache, keyed `"{provider}:{symbol}"`.
/// Hits are returned with `cached` set; failures are never cached, so a
/// recovering provider is retried on the next cycle.
pub struct CachedProvider {
    inner: Arc<dyn QuoteProvider>,
    cache: Arc<FetchCache<Quote>>,
    ttl: Duration,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn QuoteProvider>, cache: Arc<FetchCache<Quote>>, ttl: Duration) -> Self {
        CachedProvider { inner, cache, ttl }
    }

    fn key(&self, symbol: &str) -> String {
        format!("{}:{}", self.inner.name(), symbol)
    }
}

#[async_trait]
impl QuoteProvider for CachedProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let key = self.key(symbol);
        if let Some(quote) = self.cache.get(&key).await {
            return Ok(Quote {
                cached: true,
                ..quote
            });
        }

        let quote = self.inner.fetch_quote(symbol).await?;
        self.cache.put(&key, quote.clone(), self.ttl).await;
        Ok(quote)
    }
}

/// Ordered list of providers for one asset class. The first provider is
/// the primary; any timeout, HTTP failure or malformed payload falls
/// through to the next.
pub struct FallbackChain {
    providers: Vec<Arc<dyn QuoteProvider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        FallbackChain { providers }
    }
}

#[async_trait]
impl PriceAdapter for FallbackChain {
    async fn fetch_price(&self, symbol: &str) -> Result<(Quote, PriceSource), FetchError> {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            match provider.fetch_quote(symbol).await {
                Ok(quote) => {
                    let source = if quote.cached {
                        PriceSource::Cache
                    } else if index == 0 {
                        PriceSource::Poll
                    } else {
                        PriceSource::Fallback
                    };
                    return Ok((quote, source));
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        symbol, error = %e,
                        "Provider failed, falling through"
                    );
                    attempts.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        error!(symbol, "All providers exhausted");
        Err(FetchError::UpstreamUnavailable {
            symbol: symbol.to_string(),
            attempts,
        })
    }
}
