use crate::core::model::{AssetType, Holding};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HoldingConfig {
    pub symbol: String,
    pub asset_type: AssetType,
    pub quantity: f64,
    pub purchase_price: f64,
}

impl HoldingConfig {
    pub fn to_holding(&self) -> Holding {
        Holding {
            id: format!("{}-{}", self.asset_type, self.symbol.to_lowercase()),
            symbol: self.symbol.clone(),
            asset_type: self.asset_type,
            quantity: self.quantity,
            purchase_price: self.purchase_price,
            current_price: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub stream_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<ProviderEndpoint>,
    pub stooq: Option<ProviderEndpoint>,
    pub binance: Option<BinanceConfig>,
    pub coingecko: Option<ProviderEndpoint>,
    pub frankfurter: Option<ProviderEndpoint>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(ProviderEndpoint {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
            stooq: Some(ProviderEndpoint {
                base_url: "https://stooq.com".to_string(),
            }),
            binance: Some(BinanceConfig {
                base_url: "https://api.binance.com".to_string(),
                stream_url: "wss://stream.binance.com:9443/ws".to_string(),
            }),
            coingecko: Some(ProviderEndpoint {
                base_url: "https://api.coingecko.com".to_string(),
            }),
            frankfurter: Some(ProviderEndpoint {
                base_url: "https://api.frankfurter.dev".to_string(),
            }),
        }
    }
}

/// Engine tuning. Every knob has a default matching production behavior;
/// tests shrink the timings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_cache_sweep_secs")]
    pub cache_sweep_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    #[serde(default = "default_skew_tolerance_ms")]
    pub skew_tolerance_ms: u64,
}

fn default_poll_interval_secs() -> u64 {
    3
}
fn default_cache_sweep_secs() -> u64 {
    60
}
fn default_fetch_timeout_secs() -> u64 {
    8
}
fn default_fetch_concurrency() -> usize {
    5
}
fn default_reconnect_base_ms() -> u64 {
    1000
}
fn default_reconnect_cap_ms() -> u64 {
    30000
}
fn default_skew_tolerance_ms() -> u64 {
    2000
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            poll_interval_secs: default_poll_interval_secs(),
            cache_sweep_secs: default_cache_sweep_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_concurrency: default_fetch_concurrency(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            skew_tolerance_ms: default_skew_tolerance_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub holdings: Vec<HoldingConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub currency: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "quotewatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
