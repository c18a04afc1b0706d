//! # Ledger Host
//!
//! Glue between files on disk and the ledger: policy loading, call-log
//! parsing, ordered application through a [`SerialExecutor`], and the JSON
//! reports printed by the subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clearnet_contracts::{
    Address, CallContext, CallOutcome, ClearNet, ContractStats, CustodyReport, ErrorKind,
    LedgerCall, LedgerConfig, SerialExecutor,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One call-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEntry {
    pub sender: Address,
    /// Execution time. The host clock is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub call: LedgerCall,
}

/// Reads ledger policy from a JSON file, or returns the defaults.
pub fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    let Some(path) = path else {
        return Ok(LedgerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: LedgerConfig = serde_json::from_str(&text)
        .with_context(|| format!("invalid ledger config in {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("rejected ledger config in {}", path.display()))?;
    Ok(config)
}

pub fn parse_call_log(text: &str) -> Result<Vec<CallEntry>> {
    serde_json::from_str(text).context("call log must be a JSON array of {sender, timestamp?, call}")
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Outcome of one call-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallReceipt {
    pub index: usize,
    pub call: &'static str,
    pub sender: Address,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl CallReceipt {
    pub fn accepted(&self) -> bool {
        self.error.is_none()
    }
}

/// Applies `entries` in order. Rejected calls are recorded; with
/// `fail_fast` the batch stops after the first one.
pub fn apply_entries(
    executor: &SerialExecutor,
    entries: Vec<CallEntry>,
    fail_fast: bool,
) -> Vec<CallReceipt> {
    let mut receipts = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let ctx = CallContext::new(entry.sender, entry.timestamp.unwrap_or_else(Utc::now));
        let call = entry.call.name();

        let receipt = match executor.submit(&ctx, entry.call) {
            Ok(outcome) => CallReceipt {
                index,
                call,
                sender: ctx.sender,
                timestamp: ctx.timestamp,
                outcome: Some(outcome),
                error: None,
                kind: None,
            },
            Err(err) => {
                tracing::warn!(index, call, sender = %ctx.sender, error = %err, "call rejected");
                CallReceipt {
                    index,
                    call,
                    sender: ctx.sender,
                    timestamp: ctx.timestamp,
                    outcome: None,
                    error: Some(err.to_string()),
                    kind: Some(err.kind()),
                }
            }
        };

        for event in executor.drain_events() {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            tracing::info!(index, event = event.name(), %payload, "ledger event");
        }

        let stop = fail_fast && !receipt.accepted();
        receipts.push(receipt);
        if stop {
            break;
        }
    }

    receipts
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub owner: Address,
    pub paused: bool,
    pub stats: ContractStats,
    pub custody: CustodyReport,
    pub solvent: bool,
    pub token_holders: usize,
    pub active_nodes: Vec<Address>,
    pub relay_operators: Vec<Address>,
}

impl StatsReport {
    pub fn from_ledger(ledger: &ClearNet) -> Self {
        let custody = ledger.custody_report();
        Self {
            owner: ledger.owner(),
            paused: ledger.paused(),
            stats: ledger.contract_stats(),
            solvent: custody.is_solvent(),
            custody,
            token_holders: ledger.token().holder_count(),
            active_nodes: ledger.active_nodes(),
            relay_operators: ledger.relay_operators(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clearnet_contracts::config::{MIN_STAKE, ONE_TOKEN};

    fn entry(sender: Address, call: LedgerCall) -> CallEntry {
        CallEntry {
            sender,
            timestamp: Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()),
            call,
        }
    }

    fn executor() -> (SerialExecutor, Address) {
        let owner = Address::derive("owner");
        let ledger = ClearNet::new(owner, LedgerConfig::default()).unwrap();
        (SerialExecutor::new(ledger), owner)
    }

    #[test]
    fn call_log_parses_with_and_without_timestamp() {
        let sender = Address::derive("owner").to_hex();
        let text = format!(
            r#"[
                {{"sender": "{sender}", "call": "pause"}},
                {{"sender": "{sender}", "timestamp": "2026-05-01T00:00:00Z", "call": {{"burn": {{"amount": 5}}}}}}
            ]"#
        );
        let entries = parse_call_log(&text).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].timestamp.is_none());
        assert_eq!(entries[1].call, LedgerCall::Burn { amount: 5 });
    }

    #[test]
    fn malformed_call_log_rejected() {
        assert!(parse_call_log(r#"{"sender": "0x00"}"#).is_err());
    }

    #[test]
    fn rejected_calls_are_recorded_and_batch_continues() {
        let (executor, owner) = executor();
        let node = Address::derive("node");
        let entries = vec![
            entry(
                node,
                LedgerCall::RegisterNode {
                    ip: "5r.158.82.48".into(),
                    port: 8443,
                    price_per_minute: ONE_TOKEN,
                },
            ),
            entry(owner, LedgerCall::Transfer { to: node, amount: MIN_STAKE }),
        ];

        let receipts = apply_entries(&executor, entries, false);
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].kind, Some(ErrorKind::InvalidInput));
        assert!(receipts[1].accepted());
        assert_eq!(
            executor.read(|l| l.token().balance_of(&node)),
            MIN_STAKE
        );
    }

    #[test]
    fn fail_fast_stops_at_first_rejection() {
        let (executor, owner) = executor();
        let stranger = Address::derive("stranger");
        let entries = vec![
            entry(stranger, LedgerCall::Pause),
            entry(owner, LedgerCall::Pause),
        ];
        let receipts = apply_entries(&executor, entries, true);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].kind, Some(ErrorKind::Authorization));
        assert!(!executor.read(|l| l.paused()));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{"protocol_fee_bps": 500}"#).unwrap();
        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.protocol_fee_bps, 500);
        assert_eq!(config.min_stake, LedgerConfig::default().min_stake);

        std::fs::write(&path, r#"{"protocol_fee_bps": 20000}"#).unwrap();
        assert!(load_config(Some(path.as_path())).is_err());
        assert_eq!(load_config(None).unwrap(), LedgerConfig::default());
    }

    #[test]
    fn stats_report_serializes() {
        let (executor, owner) = executor();
        let report = executor.read(StatsReport::from_ledger);
        assert_eq!(report.owner, owner);
        assert!(report.solvent);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["total_active_nodes"], 0);
        // Only the owner holds tokens at genesis.
        assert_eq!(report.token_holders, 1);
    }
}
