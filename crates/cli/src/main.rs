//! Node autoscaler CLI
//!
//! Queries hourly usage from a running autoscaler and seeds a local store
//! with synthetic history.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{backfill, metrics};
use scaler_lib::backfill::DEFAULT_BACKFILL_HOURS;
use std::path::PathBuf;

/// Node autoscaler CLI
#[derive(Parser)]
#[command(name = "scalectl")]
#[command(author, version, about = "CLI for the Node Autoscaler", long_about = None)]
pub struct Cli {
    /// Autoscaler API URL (can also be set via SCALECTL_API_URL env var)
    #[arg(long, env = "SCALECTL_API_URL", default_value = "http://localhost:3001")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show hourly usage for a node or pod
    Metrics {
        /// Resource name as reported by the metrics source
        resource: String,

        /// Window start, epoch seconds
        #[arg(long)]
        start: Option<i64>,

        /// Window end, epoch seconds (defaults to now)
        #[arg(long)]
        end: Option<i64>,

        /// Lookback when --start is not given (e.g., 90m, 24h, 7d)
        #[arg(long, default_value = "24h")]
        since: String,
    },

    /// Seed a local store with synthetic hourly history
    Backfill {
        /// Path to the autoscaler's store file
        #[arg(long, env = "AUTOSCALER_STORE_PATH", default_value = "./autoscaler.redb")]
        store: PathBuf,

        /// Number of hours to generate, ending at the last closed hour
        #[arg(long, default_value_t = DEFAULT_BACKFILL_HOURS)]
        hours: u32,

        /// Metrics source used to discover resources
        #[arg(long, env = "AUTOSCALER_METRICS_SOURCE__BASE_URL", default_value = "http://127.0.0.1:8001")]
        source_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Metrics {
            resource,
            start,
            end,
            since,
        } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            metrics::show_metrics(&client, &resource, start, end, &since, cli.format).await?;
        }
        Commands::Backfill {
            store,
            hours,
            source_url,
        } => {
            backfill::run_backfill(&store, &source_url, hours, cli.format).await?;
        }
    }

    Ok(())
}
