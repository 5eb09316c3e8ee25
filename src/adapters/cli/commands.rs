//! CLI Command Definitions
//!
//! Every command talks to the shared store named in the config file, so two
//! processes pointed at the same store act as two execution contexts.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spread Scanner - scan orchestration for a DEX/CEX arbitrage dashboard
#[derive(Parser, Debug)]
#[command(
    name = "spread-scanner",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Batch price scanner with cross-context start/stop control",
    long_about = "Spread Scanner walks token catalogs in batches, fetching prices from every \
                  configured exchange. Scans started by one process can be stopped from any \
                  other process sharing the same store."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan one or more scopes until done or stopped
    Scan(ScanCmd),

    /// Stop a running scope (from any process)
    Stop(StopCmd),

    /// Clear a stale running marker left by a crashed process
    ForceStop(ForceStopCmd),

    /// Show run-state and catalog sizes per scope
    Status(StatusCmd),

    /// Merge exchange wallet status into the catalogs
    Wallets(WalletsCmd),

    /// Replace a scope's token catalog from a JSON file
    Import(ImportCmd),
}

/// Scan scopes
#[derive(Parser, Debug)]
pub struct ScanCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/scanner.toml")]
    pub config: PathBuf,

    /// Chain to scan (repeatable); defaults to the stored scanner settings
    #[arg(long = "chain", value_name = "CHAIN")]
    pub chains: Vec<String>,

    /// Scan the aggregate multichain catalog
    #[arg(long)]
    pub multichain: bool,

    /// Keep scanning pass after pass until stopped
    #[arg(long)]
    pub continuous: bool,
}

/// Stop a scope
#[derive(Parser, Debug)]
pub struct StopCmd {
    /// Chain id or "multichain"
    #[arg(value_name = "SCOPE")]
    pub scope: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/scanner.toml")]
    pub config: PathBuf,

    /// Also reinitialize this context after stopping
    #[arg(long)]
    pub hard: bool,
}

/// Operator override for a stale run marker
#[derive(Parser, Debug)]
pub struct ForceStopCmd {
    /// Chain id or "multichain"
    #[arg(value_name = "SCOPE")]
    pub scope: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/scanner.toml")]
    pub config: PathBuf,
}

/// Show status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/scanner.toml")]
    pub config: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Update wallet status
#[derive(Parser, Debug)]
pub struct WalletsCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/scanner.toml")]
    pub config: PathBuf,

    /// Import a wallet status document before merging
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// List every unmatched (token, exchange) pair
    #[arg(long)]
    pub show_misses: bool,
}

/// Import a catalog
#[derive(Parser, Debug)]
pub struct ImportCmd {
    /// Chain id or "multichain"
    #[arg(value_name = "SCOPE")]
    pub scope: String,

    /// JSON array of token records
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/scanner.toml")]
    pub config: PathBuf,
}
