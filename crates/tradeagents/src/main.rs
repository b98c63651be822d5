use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tradeagents_models::{RunStatus, TradeAgentsConfig};

#[derive(Parser, Debug)]
#[command(name = "tradeagents", about = "Layered multi-agent trade decision orchestrator")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tradeagents.toml")]
    config: String,

    /// Instrument to analyze (e.g. 600519, AAPL, 0700.HK)
    #[arg(short, long)]
    ticker: String,

    /// As-of date (YYYY-MM-DD); defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Print only the transcript instead of the whole run outcome
    #[arg(long)]
    transcript: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // A missing config file falls back to defaults; a malformed one is an error.
    let config: TradeAgentsConfig = match std::fs::read_to_string(&cli.config) {
        Ok(config_str) => toml::from_str(&config_str).with_context(|| "Failed to parse config")?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %cli.config, "Config file not found; using defaults");
            TradeAgentsConfig::default()
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read config: {}", cli.config)),
    };

    let orchestrator = Arc::new(
        tradeagents::build_orchestrator(&config).context("Failed to build orchestrator")?,
    );

    let as_of_date = cli.date.unwrap_or_else(|| Local::now().date_naive());
    let handle = tradeagents::start_run(&orchestrator, &config, &cli.ticker, as_of_date);

    // Ctrl-C cancels at the next layer or round boundary.
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            cancel.cancel();
        }
    });

    let outcome = handle
        .wait()
        .await
        .map_err(|e| anyhow::anyhow!("Run failed: {e}"))?;

    // Output as JSON to stdout
    let output = match (cli.transcript, cli.pretty) {
        (true, true) => serde_json::to_string_pretty(outcome.state.transcript())?,
        (true, false) => serde_json::to_string(outcome.state.transcript())?,
        (false, true) => serde_json::to_string_pretty(&outcome)?,
        (false, false) => serde_json::to_string(&outcome)?,
    };
    println!("{output}");

    if let RunStatus::Failed { stage, reason } = &outcome.status {
        anyhow::bail!("Run failed at {stage}: {reason}");
    }
    Ok(())
}
