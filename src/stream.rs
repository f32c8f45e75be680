//! Persistent ticker stream with auto-reconnection.
//!
//! One logical connection per engine. The state machine is
//! `Disconnected -> Connecting -> Connected -> (Error -> Connecting)` with
//! exponential backoff between attempts; an explicit `close()` is terminal.
//! Incoming ticks are written to the price table tagged `source: stream`.

use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::core::errors::StreamError;
use crate::core::model::{AssetType, PriceRecord, PriceSource};
use crate::providers::binance::{stream_name, symbol_from_pair};
use crate::table::PriceTable;

/// Coarse connectivity state published to UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ConnectionState::Disconnected => "disconnected",
                ConnectionState::Connecting => "connecting",
                ConnectionState::Connected => "connected",
                ConnectionState::Error => "error",
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            url: "wss://stream.binance.com:9443/ws".to_string(),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum StreamCommand {
    SetSymbols(Vec<String>),
    Close,
}

/// Doubling backoff from `base`, capped at `cap`. `attempt` is zero-based
/// and resets after each successful connect.
pub(crate) fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(cap)
}

#[derive(Deserialize, Debug)]
struct TradeTick {
    #[serde(rename = "s")]
    pair: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time_ms: Option<i64>,
}

/// Parses one trade frame into a table record. Malformed frames yield
/// `None` and are skipped by the caller.
fn parse_tick(text: &str) -> Option<PriceRecord> {
    let tick: TradeTick = serde_json::from_str(text).ok()?;
    let price = tick.price.parse::<f64>().ok()?;
    if !PriceRecord::is_valid_price(price) {
        return None;
    }

    let observed_at = tick
        .trade_time_ms
        .and_then(chrono::DateTime::from_timestamp_millis)
        .unwrap_or_else(chrono::Utc::now);

    Some(PriceRecord {
        symbol: symbol_from_pair(&tick.pair),
        price,
        source: PriceSource::Stream,
        observed_at,
        asset_type: AssetType::Crypto,
    })
}

pub struct StreamManager {
    command_tx: mpsc::UnboundedSender<StreamCommand>,
    status_rx: watch::Receiver<ConnectionState>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StreamManager {
    /// Spawns the connection task subscribed to the given symbol set.
    pub fn connect(config: StreamConfig, symbols: Vec<String>, table: Arc<PriceTable>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);

        let task = tokio::spawn(connection_task(
            config, symbols, table, command_rx, status_tx,
        ));

        StreamManager {
            command_tx,
            status_rx,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Replaces the subscribed symbol set. The full set is resent to the
    /// feed, so nothing is silently dropped across reconnects.
    pub fn set_symbols(&self, symbols: Vec<String>) {
        let _ = self.command_tx.send(StreamCommand::SetSymbols(symbols));
    }

    /// Requests a terminal disconnect; no further auto-reconnect.
    pub fn close(&self) {
        let _ = self.command_tx.send(StreamCommand::Close);
    }

    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }

    /// Closes and waits briefly for the task to wind down, aborting it if
    /// it is stuck mid-connect.
    pub async fn shutdown(&self) {
        self.close();
        let handle = self.task.lock().unwrap().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                warn!("Stream task did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

async fn send_subscribe<S>(write: &mut S, symbols: &[String], id: u64) -> Result<(), StreamError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let params: Vec<String> = symbols.iter().map(|s| stream_name(s)).collect();
    let frame = serde_json::json!({
        "method": "SUBSCRIBE",
        "params": params,
        "id": id,
    });
    info!("Subscribing to {} streams", params.len());
    write
        .send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|e| StreamError::Subscribe(e.to_string()))
}

async fn connection_task(
    config: StreamConfig,
    mut symbols: Vec<String>,
    table: Arc<PriceTable>,
    mut command_rx: mpsc::UnboundedReceiver<StreamCommand>,
    status_tx: watch::Sender<ConnectionState>,
) {
    let mut attempt: u32 = 0;
    let mut subscribe_id: u64 = 0;

    'reconnect: loop {
        status_tx.send_replace(ConnectionState::Connecting);
        info!("Connecting to ticker stream: {}", config.url);

        match connect_async(&config.url).await {
            Ok((ws_stream, _)) => {
                status_tx.send_replace(ConnectionState::Connected);
                attempt = 0;
                let (mut write, mut read) = ws_stream.split();

                subscribe_id += 1;
                if let Err(e) = send_subscribe(&mut write, &symbols, subscribe_id).await {
                    warn!(error = %e, "Failed to send subscribe frame");
                } else {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        match parse_tick(text.as_str()) {
                                            Some(record) => {
                                                table.apply(record).await;
                                            }
                                            None => {
                                                debug!("Ignoring non-tick frame: {}", text);
                                            }
                                        }
                                    }
                                    Some(Ok(Message::Ping(payload))) => {
                                        if write.send(Message::Pong(payload)).await.is_err() {
                                            warn!("Failed to answer ping");
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) => {
                                        warn!(error = %StreamError::UnexpectedClose, "Stream closed by server");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        warn!(error = %StreamError::Transport(e), "Stream read failed");
                                        break;
                                    }
                                    None => {
                                        warn!(error = %StreamError::UnexpectedClose, "Stream ended");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                            cmd = command_rx.recv() => {
                                match cmd {
                                    Some(StreamCommand::SetSymbols(new_symbols)) => {
                                        symbols = new_symbols;
                                        subscribe_id += 1;
                                        // Resend the full set, not a diff
                                        if let Err(e) = send_subscribe(&mut write, &symbols, subscribe_id).await {
                                            warn!(error = %e, "Failed to resubscribe");
                                            break;
                                        }
                                    }
                                    Some(StreamCommand::Close) | None => {
                                        let _ = write.send(Message::Close(None)).await;
                                        status_tx.send_replace(ConnectionState::Disconnected);
                                        info!("Stream closed");
                                        break 'reconnect;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Stream connect failed: {}", e);
            }
        }

        status_tx.send_replace(ConnectionState::Error);
        let delay = backoff_delay(config.reconnect_base, config.reconnect_cap, attempt);
        attempt = attempt.saturating_add(1);
        warn!("Reconnecting in {:?} (attempt {})", delay, attempt);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            cmd = command_rx.recv() => {
                match cmd {
                    Some(StreamCommand::SetSymbols(new_symbols)) => {
                        symbols = new_symbols;
                    }
                    Some(StreamCommand::Close) | None => {
                        status_tx.send_replace(ConnectionState::Disconnected);
                        break 'reconnect;
                    }
                }
            }
        }
    }
}
