use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use quotewatch::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for quotewatch::AppCommand {
    fn from(cmd: Commands) -> quotewatch::AppCommand {
        match cmd {
            Commands::Prices => quotewatch::AppCommand::Prices,
            Commands::Watch => quotewatch::AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch prices once and display the portfolio
    Prices,
    /// Live dashboard with polling and streaming updates
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => quotewatch::cli::setup::setup(),
        Some(cmd) => quotewatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
