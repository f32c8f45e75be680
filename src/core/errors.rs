//! Error taxonomy for the provider and streaming layers.
//!
//! Provider errors are recovered inside a fallback chain and never surface
//! past `UpstreamUnavailable`. Stream errors are absorbed by the reconnect
//! loop and only become visible as connection status changes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("provider {provider} timed out for {symbol}")]
    Timeout { provider: String, symbol: String },

    #[error("provider {provider} request failed for {symbol} (status: {status:?})")]
    Http {
        provider: String,
        symbol: String,
        /// None for connection-level failures without an HTTP status.
        status: Option<u16>,
    },

    #[error("provider {provider} returned malformed payload for {symbol}: {reason}")]
    Malformed {
        provider: String,
        symbol: String,
        reason: String,
    },

    #[error("all providers exhausted for {symbol}: [{}]", attempts.join("; "))]
    UpstreamUnavailable {
        symbol: String,
        attempts: Vec<String>,
    },
}

impl FetchError {
    pub fn provider(&self) -> Option<&str> {
        match self {
            FetchError::Timeout { provider, .. }
            | FetchError::Http { provider, .. }
            | FetchError::Malformed { provider, .. } => Some(provider),
            FetchError::UpstreamUnavailable { .. } => None,
        }
    }
}

/// Why a live connection ended. Logged and folded into the reconnect
/// state machine, never returned to callers.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("stream closed unexpectedly")]
    UnexpectedClose,

    #[error("subscribe frame could not be sent: {0}")]
    Subscribe(String),
}
