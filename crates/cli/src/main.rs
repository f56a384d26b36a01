//! Rent Pricing CLI
//!
//! A command-line tool for pricing properties, listing the registered
//! models and checking the health of the Rent Pricing service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, models, predict};

const DEFAULT_ALGORITHM: &str = "LightGBM";

/// Rent Pricing CLI
#[derive(Parser)]
#[command(name = "rentp")]
#[command(author, version, about = "CLI for the Rent Pricing service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (falls back to ~/.config/rentp/config.json, then http://localhost:8080)
    #[arg(long, env = "RENTP_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict the nightly price of a property
    Predict(predict::PredictArgs),

    /// List registered models and whether they are loaded
    Models,

    /// Show service health and readiness
    Health,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Predict(args) => {
            let default_algorithm = config
                .default_algorithm
                .as_deref()
                .unwrap_or(DEFAULT_ALGORITHM);
            predict::predict(&client, &args, default_algorithm, cli.format).await?;
        }
        Commands::Models => {
            models::list_models(&client, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
