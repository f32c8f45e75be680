//! Live dashboard: polling plus the streaming ticker feed.

use anyhow::Result;
use console::Term;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{dashboard, prices, ui};
use crate::core::config::AppConfig;
use crate::core::model::{AssetType, Holding};
use crate::engine::PriceEngine;
use crate::stream::ConnectionState;
use tokio::sync::watch;

const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(engine: &PriceEngine, config: &AppConfig) -> Result<()> {
    let (holdings, symbols) = prices::holdings_from_config(config);

    engine.start_polling(symbols.clone());

    let crypto_symbols: Vec<String> = symbols
        .iter()
        .filter(|(_, asset_type)| *asset_type == AssetType::Crypto)
        .map(|(symbol, _)| symbol.clone())
        .collect();
    if !crypto_symbols.is_empty() {
        engine.initialize_streaming_connection(crypto_symbols);
    }

    let mut updates = engine.subscribe_price_updates();
    let status = engine.subscribe_connection_status();
    let term = Term::stdout();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = redraw.tick() => {
                draw(&term, engine, &holdings, &status, &config.currency).await?;
            }
            update = updates.recv() => {
                match update {
                    Ok(_) => {}
                    // Lagging only means we missed intermediate ticks; the
                    // next redraw reads the table directly
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    engine.close_streaming_connection().await;
    Ok(())
}

async fn draw(
    term: &Term,
    engine: &PriceEngine,
    holdings: &[Holding],
    status: &watch::Receiver<ConnectionState>,
    currency: &str,
) -> Result<()> {
    let records = engine.snapshot().await;
    term.clear_screen()?;
    println!("{}", dashboard::render(holdings, &records, currency));
    println!("\n{}", ui::status_line(*status.borrow()));
    println!(
        "{}",
        ui::style_text("Press Ctrl-C to exit", ui::StyleType::Subtle)
    );
    Ok(())
}
