//! Core abstractions: canonical records, errors, config, cache

pub mod cache;
pub mod config;
pub mod errors;
pub mod log;
pub mod model;

// Re-export main types for cleaner imports
pub use cache::FetchCache;
pub use config::AppConfig;
pub use errors::{FetchError, StreamError};
pub use model::{
    AssetType, Holding, HoldingsStore, PriceRecord, PriceSource, PriceUpdate, RefreshOutcome,
};
