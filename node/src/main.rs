//! # ClearNet Node
//!
//! Entry point for the `clearnet-node` binary: the single-writer host that
//! owns a ClearNet ledger.
//!
//! - `init`    — create a ledger and write its genesis snapshot
//! - `apply`   — apply an ordered JSON call log and persist the result
//! - `stats`   — print contract stats and the custody report
//! - `export`  — write the latest snapshot as JSON
//! - `version` — print build version information

mod cli;
mod host;
mod logging;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use clearnet_contracts::{ClearNet, LedgerStore, SerialExecutor};

use cli::{ClearNetNodeCli, Commands};

fn main() -> Result<()> {
    let cli = ClearNetNodeCli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVE, cli.log_format);

    match cli.command {
        Commands::Init(args) => init_ledger(args),
        Commands::Apply(args) => apply_calls(args),
        Commands::Stats(args) => print_stats(&args.data_dir),
        Commands::Export(args) => export_snapshot(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("ledger")
}

fn open_store(data_dir: &Path) -> Result<LedgerStore> {
    let path = db_path(data_dir);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create database directory: {}", path.display()))?;
    LedgerStore::open(&path).with_context(|| format!("failed to open database at {}", path.display()))
}

fn load_ledger(store: &LedgerStore, data_dir: &Path) -> Result<ClearNet> {
    store
        .load_latest()
        .context("failed to read latest snapshot")?
        .with_context(|| {
            format!(
                "no ledger in {}; run `clearnet-node init` first",
                data_dir.display()
            )
        })
}

/// Creates the ledger and persists the genesis snapshot.
fn init_ledger(args: cli::InitArgs) -> Result<()> {
    let data_dir = &args.store.data_dir;
    let store = open_store(data_dir)?;
    if !args.force && store.latest_seq()?.is_some() {
        bail!(
            "{} already holds a ledger; pass --force to start over",
            data_dir.display()
        );
    }

    let config = host::load_config(args.config.as_deref())?;
    let ledger = ClearNet::new(args.owner, config).context("invalid ledger config")?;
    let seq = store.save(&ledger).context("failed to save genesis snapshot")?;

    tracing::info!(
        owner = %args.owner,
        custody = %ledger.custody_address(),
        data_dir = %data_dir.display(),
        seq,
        "ledger initialized"
    );

    let summary = serde_json::json!({
        "owner": ledger.owner(),
        "custody": ledger.custody_address(),
        "faucet": ledger.faucet().account(),
        "config": ledger.config(),
        "snapshot": seq,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Applies a call log on top of the latest snapshot.
fn apply_calls(args: cli::ApplyArgs) -> Result<()> {
    let data_dir = &args.store.data_dir;
    let store = open_store(data_dir)?;
    let ledger = load_ledger(&store, data_dir)?;

    let text = if args.calls.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read call log from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.calls)
            .with_context(|| format!("failed to read call log {}", args.calls.display()))?
    };
    let entries = host::parse_call_log(&text)?;
    tracing::info!(calls = entries.len(), "applying call log");

    let executor = SerialExecutor::new(ledger);
    let receipts = host::apply_entries(&executor, entries, args.fail_fast);
    for receipt in &receipts {
        println!("{}", serde_json::to_string(receipt)?);
    }

    let ledger = executor.into_inner();
    let report = ledger.verify_custody()?;
    let seq = store.save(&ledger).context("failed to save snapshot")?;

    let rejected = receipts.iter().filter(|r| !r.accepted()).count();
    tracing::info!(
        applied = receipts.len() - rejected,
        rejected,
        seq,
        held = %report.held,
        "call log applied"
    );
    Ok(())
}

fn print_stats(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let ledger = load_ledger(&store, data_dir)?;
    let report = host::StatsReport::from_ledger(&ledger);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn export_snapshot(args: cli::ExportArgs) -> Result<()> {
    let data_dir = &args.store.data_dir;
    let store = open_store(data_dir)?;
    let json = store
        .export_json()
        .context("failed to export snapshot")?
        .with_context(|| format!("no ledger in {}", data_dir.display()))?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "snapshot exported");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_version() {
    println!("clearnet-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", rustc_version());
}

/// Rust compiler version used to build this binary, if recorded.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
