//! Roulette engine operator tool
//!
//! Loads configuration, then runs a seeded house-edge simulation against a
//! full settlement engine and prints the report as JSON.

use clap::Parser;
use roulette_engine::config::{generate_sample_config, ConfigLoader, LogLevel};
use roulette_engine::simulation::{HouseEdgeSimulation, SimulationConfig};
use roulette_engine::units::{format_signed, format_units, parse_units};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "roulette-engine")]
#[command(about = "Roulette settlement engine: configuration and house-edge simulation", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<String>,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    generate_config: Option<String>,

    /// Simulated rounds
    #[arg(long, default_value = "100")]
    rounds: u32,

    /// Simulated players
    #[arg(long, default_value = "10")]
    players: u32,

    /// RNG seed for bets and mock outcomes
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Owner funding for the reserve, in whole units
    #[arg(long, default_value = "10")]
    reserve: String,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = &args.generate_config {
        generate_sample_config(path)?;
        println!("Sample configuration written to {}", path);
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    let level = args.log_level.unwrap_or(config.monitoring.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.as_filter().into()),
        )
        .init();

    info!(
        owner = %config.ledger.owner,
        chain_id = config.randomness.chain_id,
        provider = ?config.randomness.provider,
        min_balance = %format_units(config.ledger.min_balance),
        max_balance = %format_units(config.ledger.max_balance),
        "Configuration loaded"
    );

    let simulation = SimulationConfig {
        rounds: args.rounds,
        players: args.players,
        seed: args.seed,
        reserve: parse_units(&args.reserve)?,
    };
    let report = HouseEdgeSimulation::new(config, simulation).run().await?;

    info!(
        house_net = %format_signed(report.house_net),
        staked = %format_units(report.total_staked),
        "Simulation report ready"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.custody_conserved || !report.deltas_balance_reserve {
        return Err("conservation check failed".into());
    }
    Ok(())
}
