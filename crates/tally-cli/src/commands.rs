use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tally_ledger::{LedgerService, LogOutcome, RecoveryReport, ValidationReport};
use tally_store::JournalDatabase;
use tally_tse::{SigningDevice, SoftwareTse};
use tally_types::{Document, OperationId, PendingFiscalOperation, PendingStatus, UserId};
use tracing::info;

use crate::cli::*;
use crate::config::TallyConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = TallyConfig::load(&cli.config)?;
    let service = open_service(&config)?;

    if config.ledger.recover_on_start && !matches!(cli.command, Command::Recover) {
        let report = service.recover().await?;
        if report.scanned > 0 {
            info!(
                committed = report.committed,
                expired = report.expired,
                in_flight = report.in_flight,
                "startup recovery"
            );
        }
    }

    let format = cli.format;
    match cli.command {
        Command::LogFiscal(args) => cmd_log_fiscal(&service, args, format).await,
        Command::LogOperational(args) => cmd_log_operational(&service, args, format).await,
        Command::Recover => cmd_recover(&service, format).await,
        Command::Verify => cmd_verify(&service, format),
        Command::Pending(args) => cmd_pending(&service, args, format),
        Command::Show(args) => cmd_show(&service, args, format),
    }
}

fn open_service(config: &TallyConfig) -> anyhow::Result<LedgerService> {
    let journal_path = &config.storage.journal_path;
    if let Some(parent) = journal_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = JournalDatabase::open(journal_path, config.journal())
        .with_context(|| format!("opening journal {}", journal_path.display()))?;
    let device = SoftwareTse::open(&config.device.state_path)
        .with_context(|| format!("loading device state {}", config.device.state_path.display()))?;
    info!(serial = device.serial(), journal = %journal_path.display(), "ledger opened");

    LedgerService::new(Arc::new(db), Arc::new(device), config.ledger())
        .context("invalid [ledger] settings")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_log_fiscal(
    service: &LedgerService,
    args: LogFiscalArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let payload = Document::parse(&args.payload).context("payload is not valid JSON")?;
    let outcome = service
        .log_fiscal_event(&args.event_type, args.user.map(UserId), payload)
        .await?;

    match outcome {
        LogOutcome::Logged(entry) => {
            if format == OutputFormat::Json {
                return print_json(&entry);
            }
            println!("{} Fiscal event logged", "✓".green().bold());
            println!("  Sequence: {}", entry.sequence.to_string().bold());
            println!("  Log id: {}", entry.log_id.to_string().yellow());
            println!(
                "  TSE: tx {} / sig {} ({})",
                entry.tse_response.transaction_number,
                entry.tse_response.signature_counter,
                entry.tse_response.device_serial.cyan()
            );
            println!("  Hash: {}", entry.current_log_hash.short_hex().dimmed());
            Ok(())
        }
        LogOutcome::Failed { operation_id, error } => {
            println!("{} Signing device failed: {}", "✗".red().bold(), error);
            println!(
                "  Attempt {} recorded as {}",
                operation_id.to_string().yellow(),
                PendingStatus::TseFailed.to_string().red()
            );
            bail!("fiscal event {operation_id} was not logged")
        }
    }
}

async fn cmd_log_operational(
    service: &LedgerService,
    args: LogOperationalArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let details = Document::parse(&args.details).context("details are not valid JSON")?;
    let entry = service
        .log_operational_event(&args.event_type, args.user.map(UserId), details)
        .await?;

    if format == OutputFormat::Json {
        return print_json(&entry);
    }
    println!("{} Operational event logged", "✓".green().bold());
    println!("  Sequence: {}", entry.sequence.to_string().bold());
    println!("  Hash: {}", entry.current_log_hash.short_hex().dimmed());
    Ok(())
}

async fn cmd_recover(service: &LedgerService, format: OutputFormat) -> anyhow::Result<()> {
    let report = service.recover().await?;
    if format == OutputFormat::Json {
        return print_json(&RecoverySummary::from(&report));
    }

    let mark = if report.is_clean() { "✓".green().bold() } else { "✗".red().bold() };
    println!("{} Recovery scanned {} rows", mark, report.scanned);
    println!("  Committed: {}", report.committed.to_string().green());
    println!("  Already committed: {}", report.already_committed);
    println!("  Expired: {}", report.expired.to_string().yellow());
    println!("  In flight: {}", report.in_flight);
    for failure in &report.failures {
        println!(
            "  {} {} ({}): {}",
            "failed".red(),
            failure.operation_id,
            failure.status,
            failure.error
        );
    }
    if !report.is_clean() {
        bail!("{} rows could not be reconciled", report.failures.len());
    }
    Ok(())
}

fn cmd_verify(service: &LedgerService, format: OutputFormat) -> anyhow::Result<()> {
    let reports = service.verify()?;
    if format == OutputFormat::Json {
        let summaries: Vec<ChainSummary> = reports.iter().map(ChainSummary::from).collect();
        print_json(&summaries)?;
    } else {
        for report in &reports {
            print_validation(report);
        }
    }

    let broken = reports.iter().filter(|r| !r.is_valid()).count();
    if broken > 0 {
        bail!("{broken} chain(s) failed verification");
    }
    Ok(())
}

fn print_validation(report: &ValidationReport) {
    let head = report
        .head
        .map(|h| h.short_hex())
        .unwrap_or_else(|| "genesis".into());
    if report.is_valid() {
        println!(
            "{} {} chain: {} entries, head {}",
            "✓".green().bold(),
            report.chain,
            report.entry_count.to_string().bold(),
            head.dimmed()
        );
        return;
    }
    println!(
        "{} {} chain: {} violations in {} entries",
        "✗".red().bold(),
        report.chain,
        report.violations.len().to_string().red(),
        report.entry_count
    );
    for v in &report.violations {
        println!("  #{} {:?}: {}", v.sequence, v.kind, v.description);
    }
}

fn cmd_pending(service: &LedgerService, args: PendingArgs, format: OutputFormat) -> anyhow::Result<()> {
    let rows = match &args.id {
        Some(id) => {
            let id = OperationId::from_str(id)?;
            match service.pending_operation(&id)? {
                Some(row) => vec![row],
                None => bail!("no pending operation {id}"),
            }
        }
        None => service.pending_operations(&parse_statuses(&args.statuses)?)?,
    };

    if format == OutputFormat::Json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No pending operations.");
    }
    for row in &rows {
        print_pending(row);
    }
    Ok(())
}

fn print_pending(row: &PendingFiscalOperation) {
    let status = match row.status {
        PendingStatus::Committed => row.status.to_string().green(),
        PendingStatus::TseSuccess => row.status.to_string().cyan(),
        PendingStatus::Pending => row.status.to_string().yellow(),
        PendingStatus::TseFailed => row.status.to_string().red(),
    };
    println!(
        "{}  {:<12} {}  {}",
        row.operation_id.short_id().yellow(),
        status,
        row.event_type,
        row.created_at.to_string().dimmed()
    );
    if let Some(error) = &row.last_error {
        println!("    {}", error);
    }
}

/// Statuses named on the command line, or every non-terminal status.
fn parse_statuses(raw: &[String]) -> anyhow::Result<Vec<PendingStatus>> {
    if raw.is_empty() {
        return Ok(PendingStatus::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .collect());
    }
    raw.iter()
        .map(|s| PendingStatus::from_str(s).map_err(anyhow::Error::from))
        .collect()
}

fn cmd_show(service: &LedgerService, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    match args.chain {
        ChainArg::Fiscal => {
            let entries = service.fiscal_entries()?;
            let tail = &entries[entries.len().saturating_sub(args.limit)..];
            if format == OutputFormat::Json {
                return print_json(&tail);
            }
            for e in tail {
                println!(
                    "{}  {}  {}  tx {}  {}",
                    format!("#{}", e.sequence).yellow().bold(),
                    e.current_log_hash.short_hex().dimmed(),
                    e.event_type,
                    e.transaction_number_tse,
                    e.timestamp_utc
                );
            }
        }
        ChainArg::Operational => {
            let entries = service.operational_entries()?;
            let tail = &entries[entries.len().saturating_sub(args.limit)..];
            if format == OutputFormat::Json {
                return print_json(&tail);
            }
            for e in tail {
                println!(
                    "{}  {}  {}  {}",
                    format!("#{}", e.sequence).yellow().bold(),
                    e.current_log_hash.short_hex().dimmed(),
                    e.event_type,
                    e.timestamp_utc
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct RecoverySummary {
    scanned: usize,
    committed: usize,
    already_committed: usize,
    expired: usize,
    in_flight: usize,
    failures: Vec<String>,
}

impl From<&RecoveryReport> for RecoverySummary {
    fn from(r: &RecoveryReport) -> Self {
        Self {
            scanned: r.scanned,
            committed: r.committed,
            already_committed: r.already_committed,
            expired: r.expired,
            in_flight: r.in_flight,
            failures: r
                .failures
                .iter()
                .map(|f| format!("{} ({}): {}", f.operation_id, f.status, f.error))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ChainSummary {
    chain: String,
    entry_count: u64,
    head: Option<String>,
    violations: Vec<String>,
}

impl From<&ValidationReport> for ChainSummary {
    fn from(r: &ValidationReport) -> Self {
        Self {
            chain: r.chain.to_string(),
            entry_count: r.entry_count,
            head: r.head.map(|h| h.to_hex()),
            violations: r
                .violations
                .iter()
                .map(|v| format!("#{} {:?}: {}", v.sequence, v.kind, v.description))
                .collect(),
        }
    }
}
