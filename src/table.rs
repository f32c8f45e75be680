//! Shared last-known-price state with timestamp-based reconciliation.
//!
//! Streaming and polled writers are peers: a new record wins unless its
//! observation is older than the current one by more than the skew
//! tolerance. Ties and in-tolerance writes are last-write-wins by arrival.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::core::model::{PriceRecord, PriceUpdate};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

pub struct PriceTable {
    inner: Mutex<HashMap<String, PriceRecord>>,
    updates: broadcast::Sender<PriceUpdate>,
    skew_tolerance: Duration,
}

impl PriceTable {
    pub fn new(skew_tolerance: Duration) -> Arc<Self> {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Arc::new(PriceTable {
            inner: Mutex::new(HashMap::new()),
            updates,
            skew_tolerance,
        })
    }

    /// Applies a record under the reconciliation rule. Returns whether the
    /// table changed. Records carrying an invalid price are always
    /// rejected, so a symbol never regresses to 0 or NaN.
    pub async fn apply(&self, record: PriceRecord) -> bool {
        if !PriceRecord::is_valid_price(record.price) {
            debug!(
                symbol = %record.symbol,
                price = record.price,
                "Rejected record with invalid price"
            );
            return false;
        }

        let mut table = self.inner.lock().await;
        if let Some(existing) = table.get(&record.symbol) {
            let cutoff = existing.observed_at - self.skew_tolerance;
            if record.observed_at < cutoff {
                debug!(
                    symbol = %record.symbol,
                    incoming = %record.observed_at,
                    existing = %existing.observed_at,
                    "Rejected stale record"
                );
                return false;
            }
        }

        let update = PriceUpdate {
            symbol: record.symbol.clone(),
            price: record.price,
            source: record.source,
        };
        table.insert(record.symbol.clone(), record);
        // Receivers may come and go; a send error only means nobody is
        // listening right now.
        let _ = self.updates.send(update);
        true
    }

    pub async fn get(&self, symbol: &str) -> Option<PriceRecord> {
        let table = self.inner.lock().await;
        table.get(symbol).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, PriceRecord> {
        let table = self.inner.lock().await;
        table.clone()
    }

    /// Subscribes to every accepted table write. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.updates.subscribe()
    }
}
