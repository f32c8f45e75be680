//! Canonical price records and holding types shared across the engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Crypto,
    Currency,
    Fund,
    Eurobond,
    Commodity,
}

impl AssetType {
    pub const ALL: [AssetType; 6] = [
        AssetType::Stock,
        AssetType::Crypto,
        AssetType::Currency,
        AssetType::Fund,
        AssetType::Eurobond,
        AssetType::Commodity,
    ];
}

impl Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetType::Stock => "stock",
                AssetType::Crypto => "crypto",
                AssetType::Currency => "currency",
                AssetType::Fund => "fund",
                AssetType::Eurobond => "eurobond",
                AssetType::Commodity => "commodity",
            }
        )
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" => Ok(AssetType::Stock),
            "crypto" => Ok(AssetType::Crypto),
            "currency" => Ok(AssetType::Currency),
            "fund" => Ok(AssetType::Fund),
            "eurobond" => Ok(AssetType::Eurobond),
            "commodity" => Ok(AssetType::Commodity),
            _ => Err(anyhow::anyhow!("Invalid asset type: {}", s)),
        }
    }
}

/// Where a price observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Stream,
    Poll,
    Cache,
    Fallback,
}

impl Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PriceSource::Stream => "stream",
                PriceSource::Poll => "poll",
                PriceSource::Cache => "cache",
                PriceSource::Fallback => "fallback",
            }
        )
    }
}

/// One reconciled price observation for a symbol.
///
/// A record never carries 0, NaN or a negative price; such values are
/// rejected at the provider boundary before a record is ever built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    pub source: PriceSource,
    pub observed_at: DateTime<Utc>,
    pub asset_type: AssetType,
}

impl PriceRecord {
    /// A price usable by consumers: strictly positive and finite.
    pub fn is_valid_price(price: f64) -> bool {
        price.is_finite() && price > 0.0
    }
}

/// Payload broadcast on every accepted table write.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub source: PriceSource,
}

/// A position as stored by the persistence collaborator. The engine reads
/// everything and only ever produces `current_price` updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub id: String,
    pub symbol: String,
    pub asset_type: AssetType,
    pub quantity: f64,
    pub purchase_price: f64,
    pub current_price: Option<f64>,
}

/// Persistence collaborator for holdings. Implementations own storage;
/// the engine never mutates quantity or purchase price.
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    async fn list_holdings(&self) -> Result<Vec<Holding>>;
    async fn update_holding_price(
        &self,
        id: &str,
        price: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Result of one polling cycle. Failed symbols are omitted from `prices`;
/// `offline` is set only when every fetch in the cycle failed, and is a
/// boundary marker for the UI, never written into the price table.
#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub prices: HashMap<String, f64>,
    pub offline: bool,
}
