//! Upstream price adapters and their combinators.
//!
//! One provider per upstream API; per asset class they are assembled into
//! an ordered [`chain::FallbackChain`] behind the TTL fetch cache.

pub mod binance;
pub mod chain;
pub mod coingecko;
pub mod convert;
pub mod frankfurter;
pub mod stooq;
pub mod util;
pub mod yahoo;

use crate::core::errors::FetchError;
use crate::core::model::PriceSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A single normalized provider response. `observed_at` is captured when
/// the request is issued, not when the response arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub currency: String,
    pub observed_at: DateTime<Utc>,
    pub cached: bool,
}

/// One upstream quote source. Implementations normalize the provider's
/// response shape and reject non-positive or non-finite prices as
/// [`FetchError::Malformed`].
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError>;
}

/// One upstream FX rate source.
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, FetchError>;
}

/// Asset-class entry point used by the polling aggregator: a fallback
/// chain, possibly composed with FX conversion.
#[async_trait]
pub trait PriceAdapter: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<(Quote, PriceSource), FetchError>;
}

pub use chain::{CachedProvider, FallbackChain};
pub use convert::{ConvertedAdapter, CurrencyAdapter, RateChain};
