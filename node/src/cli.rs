//! # CLI Interface
//!
//! Command-line structure for `clearnet-node`, using `clap` derive. Every
//! flag has a `CLEARNET_*` environment equivalent.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use clearnet_contracts::Address;

use crate::logging::LogFormat;

/// ClearNet ledger host.
///
/// Owns one settlement ledger, applies externally ordered call logs to it
/// one call at a time, and persists a snapshot after every batch.
#[derive(Parser, Debug)]
#[command(
    name = "clearnet-node",
    about = "ClearNet settlement ledger host",
    version,
    propagate_version = true
)]
pub struct ClearNetNodeCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "CLEARNET_LOG_FORMAT",
        default_value = "pretty"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a ledger and write its genesis snapshot.
    Init(InitArgs),
    /// Apply a JSON call log to the latest snapshot.
    Apply(ApplyArgs),
    /// Print contract stats and the custody report.
    Stats(DataDirArgs),
    /// Write the latest snapshot as JSON.
    Export(ExportArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct DataDirArgs {
    /// Directory holding the snapshot database.
    #[arg(long, short = 'd', env = "CLEARNET_DATA_DIR", default_value = "./clearnet-data")]
    pub data_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub store: DataDirArgs,

    /// Ledger owner; also receives the initial token supply.
    #[arg(long, env = "CLEARNET_OWNER")]
    pub owner: Address,

    /// JSON file overriding ledger policy. Missing fields keep defaults.
    #[arg(long, short = 'c', env = "CLEARNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write a fresh genesis snapshot even if one exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub store: DataDirArgs,

    /// Call log: a JSON array of `{sender, timestamp?, call}` entries.
    /// `-` reads from stdin.
    pub calls: PathBuf,

    /// Stop at the first rejected call instead of recording it and
    /// continuing.
    #[arg(long, env = "CLEARNET_FAIL_FAST")]
    pub fail_fast: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub store: DataDirArgs,

    /// Output file. Defaults to stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ClearNetNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_apply_with_defaults() {
        let cli = ClearNetNodeCli::try_parse_from(["clearnet-node", "apply", "calls.json"]).unwrap();
        match cli.command {
            Commands::Apply(args) => {
                assert_eq!(args.calls, PathBuf::from("calls.json"));
                assert!(!args.fail_fast);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn init_requires_hex_owner() {
        let owner = Address::derive("owner").to_hex();
        let cli =
            ClearNetNodeCli::try_parse_from(["clearnet-node", "init", "--owner", owner.as_str()])
                .unwrap();
        assert!(matches!(cli.command, Commands::Init(ref a) if a.owner == Address::derive("owner")));

        assert!(
            ClearNetNodeCli::try_parse_from(["clearnet-node", "init", "--owner", "alice"]).is_err()
        );
    }
}
