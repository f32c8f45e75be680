use crate::core::errors::FetchError;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = "quotewatch/0.1";

/// Builds a client carrying the per-fetch timeout. Timeout expiry surfaces
/// through [`request_error`] as `FetchError::Timeout`.
pub(crate) fn build_client(
    provider: &'static str,
    symbol: &str,
    timeout: Duration,
) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Malformed {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
            reason: format!("client build failed: {e}"),
        })
}

/// Maps a transport-level reqwest error onto the fetch taxonomy.
pub(crate) fn request_error(
    provider: &'static str,
    symbol: &str,
    err: reqwest::Error,
) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
        }
    } else {
        FetchError::Http {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

pub(crate) fn http_status_error(
    provider: &'static str,
    symbol: &str,
    status: reqwest::StatusCode,
) -> FetchError {
    FetchError::Http {
        provider: provider.to_string(),
        symbol: symbol.to_string(),
        status: Some(status.as_u16()),
    }
}

pub(crate) fn malformed(
    provider: &'static str,
    symbol: &str,
    reason: impl Into<String>,
) -> FetchError {
    FetchError::Malformed {
        provider: provider.to_string(),
        symbol: symbol.to_string(),
        reason: reason.into(),
    }
}

/// A zero, negative or non-finite upstream price is a parse failure, not a
/// valid market price; it must trigger fallback.
pub(crate) fn validate_price(
    provider: &'static str,
    symbol: &str,
    price: f64,
) -> Result<f64, FetchError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(malformed(
            provider,
            symbol,
            format!("non-positive or non-finite price: {price}"),
        ))
    }
}
