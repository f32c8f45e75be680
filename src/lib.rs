pub mod cli;
pub mod core;
pub mod engine;
pub mod poller;
pub mod providers;
pub mod stream;
pub mod table;

use anyhow::Result;
use tracing::{debug, info};

use crate::core::config::AppConfig;
use crate::engine::PriceEngine;

#[derive(Debug, Clone, Copy)]
pub enum AppCommand {
    Prices,
    Watch,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("quotewatch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let engine = PriceEngine::new(&config)?;

    let result = match command {
        AppCommand::Prices => cli::prices::run(&engine, &config).await,
        AppCommand::Watch => cli::watch::run(&engine, &config).await,
    };

    engine.dispose().await;
    result
}
