//! Temperature Forecaster CLI
//!
//! A command-line tool for reading the forecast history, the latest
//! prediction and the forecaster's status.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, settings, status};

/// Temperature Forecaster CLI
#[derive(Parser)]
#[command(name = "fcst")]
#[command(author, version, about = "CLI for the Temperature Forecaster", long_about = None)]
pub struct Cli {
    /// API endpoint URL [default: http://localhost:8080]
    #[arg(long, env = "FCST_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show observed readings next to the predictions
    History {
        /// Only the most recent rows
        #[arg(long, short)]
        limit: Option<usize>,

        /// Write the history as JSON to a file
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Show the most recent prediction
    Latest,

    /// Show the model version and component health
    Status,

    /// Show or change the stored CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the stored settings
    Show,

    /// Store default values
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default row limit for `history`
        #[arg(long)]
        history_limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let stored = config::Config::load()?;
    let client = || client::ApiClient::new(&stored.resolve_api_url(cli.api_url.clone()));

    match cli.command {
        Commands::History { limit, output } => {
            history::show_history(&client()?, limit.or(stored.history_limit), output, cli.format)
                .await?;
        }
        Commands::Latest => {
            history::show_latest(&client()?, cli.format).await?;
        }
        Commands::Status => {
            status::show_status(&client()?, cli.format).await?;
        }
        Commands::Config(ConfigCommands::Show) => {
            settings::show(&stored)?;
        }
        Commands::Config(ConfigCommands::Set {
            api_url,
            history_limit,
        }) => {
            settings::set(stored.clone(), api_url, history_limit)?;
        }
    }

    Ok(())
}
