//! Tidal Simulator
//!
//! Builds a pool from configuration, replays a JSON scenario of funding,
//! actions and clock steps through an in-memory ledger, and prints every
//! pool event as one JSON line.
//!
//! Architecture:
//! scenario.json → Runner → Pool (+ MemoryLedger) → events on stdout

mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tidal_config::{load_config, LoggingSettings};
use tracing::info;

use scenario::{Runner, Scenario};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tidal_simulator")]
#[command(about = "Replay a scenario against a Tidal pool")]
struct Args {
    /// Scenario file (JSON)
    scenario: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "config/tidal.toml")]
    config: PathBuf,

    /// Environment (development, staging, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Abort on the first rejected step instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Print the final pool state after the replay
    #[arg(long)]
    summary: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

fn init_tracing(logging: &LoggingSettings) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;
    // events go to stdout, logs to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(Some(&args.config), args.environment.as_deref())
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    init_tracing(&config.logging)?;

    info!("Tidal simulator starting");
    info!("Config file: {:?}", args.config);
    let path = args.scenario.context("A scenario file is required")?;
    info!("Scenario: {:?}", path);

    let scenario = Scenario::load(&path)?;
    let settings = scenario.pool.clone().unwrap_or(config.pool);
    let mut runner = Runner::new(&settings, scenario.pool_account, args.fail_fast)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = runner.run(&scenario.steps, |event| {
        serde_json::to_writer(&mut out, event)?;
        writeln!(out)?;
        Ok(())
    })?;

    if args.summary {
        let pool = runner.pool();
        let report = serde_json::json!({
            "steps": summary.steps,
            "rejected": summary.rejected,
            "events": summary.events,
            "price": pool.price_info(),
            "lps": pool.lp_count(),
            "swappers": pool.swapper_count(),
            "protocol_fees": pool.protocol_fees(),
            "matured_flows": pool.matured_flows(),
            "pool_balances": runner.balances(scenario.pool_account).map(|b| b.to_string()),
        });
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    }
    Ok(())
}
