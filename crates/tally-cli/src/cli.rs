use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tally",
    about = "Tally: fiscal and operational event ledger for the POS back office",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "tally.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stage, sign and commit a fiscal event
    LogFiscal(LogFiscalArgs),
    /// Append an operational event
    LogOperational(LogOperationalArgs),
    /// Commit signed rows and expire stale ones
    Recover,
    /// Verify both hash chains
    Verify,
    /// List pending fiscal operations
    Pending(PendingArgs),
    /// Show ledger entries
    Show(ShowArgs),
}

#[derive(Args)]
pub struct LogFiscalArgs {
    /// Event type, e.g. `sale` or `storno`
    pub event_type: String,
    /// JSON payload sent to the signing device
    #[arg(long, default_value = "null")]
    pub payload: String,
    #[arg(long)]
    pub user: Option<i64>,
}

#[derive(Args)]
pub struct LogOperationalArgs {
    pub event_type: String,
    /// JSON details of the event
    #[arg(long, default_value = "null")]
    pub details: String,
    #[arg(long)]
    pub user: Option<i64>,
}

#[derive(Args)]
pub struct PendingArgs {
    /// Only rows in this status (repeatable); defaults to non-terminal rows
    #[arg(long = "status")]
    pub statuses: Vec<String>,
    /// Show a single row
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(value_enum, default_value = "fiscal")]
    pub chain: ChainArg,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ChainArg {
    Fiscal,
    Operational,
}
