//! Periodic batched fetch across all held symbols.
//!
//! Holdings are partitioned by asset type and dispatched to the matching
//! adapter with bounded concurrency. Failed symbols are omitted from the
//! cycle result so the table keeps its last-known value.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::model::{AssetType, PriceRecord, RefreshOutcome};
use crate::providers::PriceAdapter;
use crate::table::PriceTable;

pub struct Poller {
    adapters: HashMap<AssetType, Arc<dyn PriceAdapter>>,
    table: Arc<PriceTable>,
    concurrency: usize,
}

impl Poller {
    pub fn new(
        adapters: HashMap<AssetType, Arc<dyn PriceAdapter>>,
        table: Arc<PriceTable>,
        concurrency: usize,
    ) -> Self {
        Poller {
            adapters,
            table,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs one polling cycle over the given symbols. Per-symbol results
    /// arrive in any order and are applied to the table independently.
    pub async fn refresh_all(&self, holdings: &[(String, AssetType)]) -> RefreshOutcome {
        let mut partitions: HashMap<AssetType, Vec<String>> = HashMap::new();
        for (symbol, asset_type) in holdings {
            let partition = partitions.entry(*asset_type).or_default();
            if !partition.contains(symbol) {
                partition.push(symbol.clone());
            }
        }

        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let mut prices = HashMap::new();

        let partition_futures = partitions.into_iter().map(|(asset_type, symbols)| {
            let adapter = self.adapters.get(&asset_type).cloned();
            async move {
                let Some(adapter) = adapter else {
                    warn!(%asset_type, "No adapter configured for asset class");
                    return Vec::new();
                };

                // Bounded fan-out per asset class to respect provider limits
                stream::iter(symbols)
                    .map(|symbol| {
                        let adapter = Arc::clone(&adapter);
                        async move {
                            let result = adapter.fetch_price(&symbol).await;
                            (symbol, result)
                        }
                    })
                    .buffer_unordered(self.concurrency)
                    .map(|(symbol, result)| (asset_type, symbol, result))
                    .collect::<Vec<_>>()
                    .await
            }
        });

        let results = futures::future::join_all(partition_futures).await;
        for (asset_type, symbol, result) in results.into_iter().flatten() {
            attempted += 1;
            match result {
                Ok((quote, source)) => {
                    succeeded += 1;
                    let record = PriceRecord {
                        symbol: symbol.clone(),
                        price: quote.price,
                        source,
                        observed_at: quote.observed_at,
                        asset_type,
                    };
                    if self.table.apply(record).await {
                        prices.insert(symbol, quote.price);
                    } else {
                        // Superseded by a fresher record; the fetch still
                        // succeeded, so report the table's current value
                        debug!(symbol, "Cycle result superseded by a fresher record");
                        if let Some(current) = self.table.get(&symbol).await {
                            prices.insert(symbol, current.price);
                        }
                    }
                }
                Err(e) => {
                    // Recovered by omission; the prior table value stands
                    warn!(symbol, error = %e, "Fetch failed, leaving last-known value");
                }
            }
        }

        RefreshOutcome {
            offline: attempted > 0 && succeeded == 0,
            prices,
        }
    }

    /// Spawns the fixed-interval polling loop with one eager cycle. The
    /// `active` flag pauses and resumes cycles; the host toggles it.
    pub fn spawn_loop(
        self: Arc<Self>,
        holdings: Vec<(String, AssetType)>,
        interval: Duration,
        mut active: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                if !*active.borrow() {
                    // Paused: wait for the flag to flip instead of polling
                    if active.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                // First tick fires immediately, giving the eager cycle
                ticker.tick().await;
                let outcome = self.refresh_all(&holdings).await;
                debug!(
                    refreshed = outcome.prices.len(),
                    offline = outcome.offline,
                    "Polling cycle complete"
                );
            }
        })
    }
}
