//! One-shot price fetch over every configured holding.

use anyhow::Result;

use super::{dashboard, ui};
use crate::core::config::AppConfig;
use crate::core::model::{AssetType, Holding};
use crate::engine::PriceEngine;

pub(crate) fn holdings_from_config(config: &AppConfig) -> (Vec<Holding>, Vec<(String, AssetType)>) {
    let holdings: Vec<Holding> = config.holdings.iter().map(|h| h.to_holding()).collect();
    let symbols = holdings
        .iter()
        .map(|h| (h.symbol.clone(), h.asset_type))
        .collect();
    (holdings, symbols)
}

pub async fn run(engine: &PriceEngine, config: &AppConfig) -> Result<()> {
    let (holdings, symbols) = holdings_from_config(config);

    let pb = ui::new_progress_bar(symbols.len() as u64, true);
    pb.set_message("Fetching prices...");
    let outcome = engine.fetch_multiple_prices(&symbols).await;
    pb.finish_and_clear();

    if outcome.offline {
        println!(
            "{}",
            ui::style_text(
                "No provider reachable; showing last-known prices only",
                ui::StyleType::Error
            )
        );
    }

    let records = engine.snapshot().await;
    println!("{}", dashboard::render(&holdings, &records, &config.currency));
    Ok(())
}
