//! Injectable engine facade.
//!
//! Owns the price table, the fetch caches, the polling loop and the
//! streaming connection. Constructed explicitly and passed by reference;
//! collaborators read prices only through the query methods here.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::cache::FetchCache;
use crate::core::config::AppConfig;
use crate::core::model::{AssetType, HoldingsStore, PriceRecord, PriceUpdate, RefreshOutcome};
use crate::poller::Poller;
use crate::providers::binance::BinanceProvider;
use crate::providers::coingecko::CoinGeckoProvider;
use crate::providers::frankfurter::FrankfurterProvider;
use crate::providers::stooq::StooqProvider;
use crate::providers::yahoo::{YahooProvider, YahooRates};
use crate::providers::{
    CachedProvider, ConvertedAdapter, CurrencyAdapter, FallbackChain, PriceAdapter, Quote,
    QuoteProvider, RateChain, RateProvider,
};
use crate::stream::{ConnectionState, StreamConfig, StreamManager};
use crate::table::PriceTable;

// Cache TTLs per asset class: seconds for fast-moving classes, minutes
// where providers rate-limit aggressively.
const CRYPTO_TTL: Duration = Duration::from_secs(5);
const FX_TTL: Duration = Duration::from_secs(10);
const STOCK_TTL: Duration = Duration::from_secs(120);
const FUND_TTL: Duration = Duration::from_secs(300);
const EUROBOND_TTL: Duration = Duration::from_secs(300);
const COMMODITY_TTL: Duration = Duration::from_secs(60);

pub struct PriceEngine {
    table: Arc<PriceTable>,
    quote_cache: Arc<FetchCache<Quote>>,
    rate_cache: Arc<FetchCache<f64>>,
    poller: Arc<Poller>,
    stream_config: StreamConfig,
    stream: std::sync::Mutex<Option<Arc<StreamManager>>>,
    poll_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    status_forward: std::sync::Mutex<Option<JoinHandle<()>>>,
    status_tx: Arc<watch::Sender<ConnectionState>>,
    status_rx: watch::Receiver<ConnectionState>,
    active_tx: watch::Sender<bool>,
    active_rx: watch::Receiver<bool>,
    poll_interval: Duration,
}

impl PriceEngine {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let engine_cfg = &config.engine;
        let timeout = Duration::from_secs(engine_cfg.fetch_timeout_secs);
        let sweep = Duration::from_secs(engine_cfg.cache_sweep_secs);
        let base_currency = config.currency.as_str();

        let table = PriceTable::new(chrono::Duration::milliseconds(
            engine_cfg.skew_tolerance_ms as i64,
        ));
        let quote_cache = Arc::new(FetchCache::<Quote>::new(sweep));
        let rate_cache = Arc::new(FetchCache::<f64>::new(sweep));

        let providers = &config.providers;
        let yahoo_url = providers
            .yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url);
        let stooq_url = providers
            .stooq
            .as_ref()
            .map_or("https://stooq.com", |p| &p.base_url);
        let binance_url = providers
            .binance
            .as_ref()
            .map_or("https://api.binance.com", |p| &p.base_url);
        let stream_url = providers
            .binance
            .as_ref()
            .map_or("wss://stream.binance.com:9443/ws", |p| &p.stream_url);
        let coingecko_url = providers
            .coingecko
            .as_ref()
            .map_or("https://api.coingecko.com", |p| &p.base_url);
        let frankfurter_url = providers
            .frankfurter
            .as_ref()
            .map_or("https://api.frankfurter.dev", |p| &p.base_url);

        let rates = Arc::new(RateChain::new(
            vec![
                Arc::new(YahooRates::new(yahoo_url, timeout)) as Arc<dyn RateProvider>,
                Arc::new(FrankfurterProvider::new(frankfurter_url, timeout)),
            ],
            Arc::clone(&rate_cache),
            FX_TTL,
        ));

        let cached = |provider: Arc<dyn QuoteProvider>, ttl: Duration| -> Arc<dyn QuoteProvider> {
            Arc::new(CachedProvider::new(provider, Arc::clone(&quote_cache), ttl))
        };
        let converted = |chain: FallbackChain| -> Arc<dyn PriceAdapter> {
            Arc::new(ConvertedAdapter::new(
                Arc::new(chain),
                Arc::clone(&rates),
                base_currency,
            ))
        };

        let mut adapters: HashMap<AssetType, Arc<dyn PriceAdapter>> = HashMap::new();
        adapters.insert(
            AssetType::Crypto,
            converted(FallbackChain::new(vec![
                cached(Arc::new(BinanceProvider::new(binance_url, timeout)), CRYPTO_TTL),
                cached(
                    Arc::new(CoinGeckoProvider::new(coingecko_url, timeout)),
                    CRYPTO_TTL,
                ),
            ])),
        );
        adapters.insert(
            AssetType::Stock,
            converted(FallbackChain::new(vec![
                cached(Arc::new(YahooProvider::new(yahoo_url, timeout)), STOCK_TTL),
                cached(Arc::new(StooqProvider::new(stooq_url, timeout)), STOCK_TTL),
            ])),
        );
        adapters.insert(
            AssetType::Fund,
            converted(FallbackChain::new(vec![
                cached(Arc::new(YahooProvider::new(yahoo_url, timeout)), FUND_TTL),
                cached(Arc::new(StooqProvider::new(stooq_url, timeout)), FUND_TTL),
            ])),
        );
        adapters.insert(
            AssetType::Eurobond,
            converted(FallbackChain::new(vec![cached(
                Arc::new(YahooProvider::new(yahoo_url, timeout)),
                EUROBOND_TTL,
            )])),
        );
        adapters.insert(
            AssetType::Commodity,
            converted(FallbackChain::new(vec![
                cached(Arc::new(YahooProvider::new(yahoo_url, timeout)), COMMODITY_TTL),
                cached(Arc::new(StooqProvider::new(stooq_url, timeout)), COMMODITY_TTL),
            ])),
        );
        adapters.insert(
            AssetType::Currency,
            Arc::new(CurrencyAdapter::new(Arc::clone(&rates), base_currency)),
        );

        let poller = Arc::new(Poller::new(
            adapters,
            Arc::clone(&table),
            engine_cfg.fetch_concurrency,
        ));

        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let (active_tx, active_rx) = watch::channel(true);

        Ok(PriceEngine {
            table,
            quote_cache,
            rate_cache,
            poller,
            stream_config: StreamConfig {
                url: stream_url.to_string(),
                reconnect_base: Duration::from_millis(engine_cfg.reconnect_base_ms),
                reconnect_cap: Duration::from_millis(engine_cfg.reconnect_cap_ms),
            },
            stream: std::sync::Mutex::new(None),
            poll_task: std::sync::Mutex::new(None),
            status_forward: std::sync::Mutex::new(None),
            status_tx: Arc::new(status_tx),
            status_rx,
            active_tx,
            active_rx,
            poll_interval: Duration::from_secs(engine_cfg.poll_interval_secs),
        })
    }

    /// Runs one polling cycle and returns the merged result. Failures are
    /// recovered by omission; the call itself does not error.
    pub async fn fetch_multiple_prices(
        &self,
        holdings: &[(String, AssetType)],
    ) -> RefreshOutcome {
        self.poller.refresh_all(holdings).await
    }

    /// Starts the fixed-interval polling loop for the given holdings.
    /// Replaces any previously started loop.
    pub fn start_polling(&self, holdings: Vec<(String, AssetType)>) {
        let handle = Arc::clone(&self.poller).spawn_loop(
            holdings,
            self.poll_interval,
            self.active_rx.clone(),
        );
        if let Some(previous) = self.poll_task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Pauses polling cycles; the streaming connection is unaffected.
    pub fn pause(&self) {
        let _ = self.active_tx.send(false);
    }

    pub fn resume(&self) {
        let _ = self.active_tx.send(true);
    }

    /// Opens the streaming connection for the given symbols, or replaces
    /// the subscription set if already connected.
    pub fn initialize_streaming_connection(&self, symbols: Vec<String>) {
        let mut stream = self.stream.lock().unwrap();
        match stream.as_ref() {
            Some(manager) => manager.set_symbols(symbols),
            None => {
                info!("Opening streaming connection for {} symbols", symbols.len());
                let manager = Arc::new(StreamManager::connect(
                    self.stream_config.clone(),
                    symbols,
                    Arc::clone(&self.table),
                ));

                // Forward the manager's status into the engine-lifetime
                // channel so subscribers survive stream restarts.
                let mut manager_status = manager.status();
                let status_tx = Arc::clone(&self.status_tx);
                let forward = tokio::spawn(async move {
                    status_tx.send_replace(*manager_status.borrow());
                    while manager_status.changed().await.is_ok() {
                        status_tx.send_replace(*manager_status.borrow());
                    }
                });
                if let Some(previous) = self.status_forward.lock().unwrap().replace(forward) {
                    previous.abort();
                }

                *stream = Some(manager);
            }
        }
    }

    pub async fn close_streaming_connection(&self) {
        let manager = self.stream.lock().unwrap().take();
        if let Some(manager) = manager {
            manager.shutdown().await;
        }
        self.status_tx.send_replace(ConnectionState::Disconnected);
    }

    pub fn subscribe_connection_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }

    pub fn subscribe_price_updates(&self) -> broadcast::Receiver<PriceUpdate> {
        self.table.subscribe()
    }

    pub async fn get_price(&self, symbol: &str) -> Option<f64> {
        self.table.get(symbol).await.map(|record| record.price)
    }

    pub async fn snapshot(&self) -> HashMap<String, PriceRecord> {
        self.table.snapshot().await
    }

    pub async fn get_all_prices(&self) -> HashMap<String, f64> {
        self.table
            .snapshot()
            .await
            .into_iter()
            .map(|(symbol, record)| (symbol, record.price))
            .collect()
    }

    /// Refreshes every holding in the store and pushes the new prices
    /// back through the collaborator. Quantity and purchase price are
    /// never touched.
    pub async fn sync_holdings(&self, store: &dyn HoldingsStore) -> Result<RefreshOutcome> {
        let holdings = store.list_holdings().await?;
        let symbols: Vec<(String, AssetType)> = holdings
            .iter()
            .map(|h| (h.symbol.clone(), h.asset_type))
            .collect();

        let outcome = self.fetch_multiple_prices(&symbols).await;
        let updated_at = Utc::now();
        for holding in &holdings {
            if let Some(price) = outcome.prices.get(&holding.symbol) {
                store
                    .update_holding_price(&holding.id, *price, updated_at)
                    .await?;
            }
        }
        debug!(
            holdings = holdings.len(),
            refreshed = outcome.prices.len(),
            "Holdings sync complete"
        );
        Ok(outcome)
    }

    /// Tears down the engine: streaming connection, polling loop and
    /// cache sweeps all stop.
    pub async fn dispose(&self) {
        self.close_streaming_connection().await;
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.status_forward.lock().unwrap().take() {
            task.abort();
        }
        self.quote_cache.shutdown();
        self.rate_cache.shutdown();
        info!("Engine disposed");
    }
}
