//! Call-log replay and persistence.
//!
//! A host receives serialized [`LedgerCall`]s, applies them in order and
//! snapshots the result. Replaying the same log from genesis must reproduce
//! the same state.

use chrono::{Duration, TimeZone, Utc};
use clearnet_contracts::config::{MIN_STAKE, ONE_TOKEN};
use clearnet_contracts::{
    Address, CallContext, CallOutcome, ClearNet, LedgerCall, LedgerConfig, LedgerStore,
    SerialExecutor, UsageReport,
};

fn addr(label: &str) -> Address {
    Address::derive(label)
}

/// Helper: the scripted session of a node, a client and a relay.
fn session() -> Vec<(Address, LedgerCall)> {
    let (owner, node, client, relay) = (addr("owner"), addr("node"), addr("client"), addr("relay"));
    let custody = ClearNet::new(owner, LedgerConfig::default())
        .unwrap()
        .custody_address();

    vec![
        (owner, LedgerCall::AddRelayOperator { operator: relay }),
        (owner, LedgerCall::Transfer { to: node, amount: MIN_STAKE }),
        (owner, LedgerCall::Transfer { to: client, amount: 100 * ONE_TOKEN }),
        (node, LedgerCall::Approve { spender: custody, amount: MIN_STAKE }),
        (
            node,
            LedgerCall::RegisterNode {
                ip: "192.168.1.1".into(),
                port: 8443,
                price_per_minute: ONE_TOKEN / 10,
            },
        ),
        (client, LedgerCall::Approve { spender: custody, amount: 100 * ONE_TOKEN }),
        (client, LedgerCall::OpenPaymentChannel { node, amount: 100 * ONE_TOKEN }),
        (
            relay,
            LedgerCall::SettleUsage(UsageReport {
                client,
                node,
                minutes_used: 60,
                expected_nonce: 0,
            }),
        ),
        (client, LedgerCall::RateNode { node, score: 4 }),
    ]
}

fn replay(calls: &[(Address, LedgerCall)]) -> (ClearNet, Vec<CallOutcome>) {
    let mut ledger = ClearNet::new(addr("owner"), LedgerConfig::default()).unwrap();
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let outcomes = calls
        .iter()
        .enumerate()
        .map(|(i, (sender, call))| {
            let ctx = CallContext::new(*sender, start + Duration::seconds(i as i64));
            ledger.execute(&ctx, call.clone()).unwrap()
        })
        .collect();
    (ledger, outcomes)
}

// ---------------------------------------------------------------------------
// Replay Tests
// ---------------------------------------------------------------------------

#[test]
fn session_outcomes() {
    let (ledger, outcomes) = replay(&session());

    let receipt = match &outcomes[7] {
        CallOutcome::Settled(receipt) => *receipt,
        other => panic!("expected settlement, got {other:?}"),
    };
    assert_eq!(receipt.cost, 6 * ONE_TOKEN);
    assert_eq!(receipt.nonce, 1);
    // (3000 + 4 * 1000) / 2
    assert_eq!(outcomes[8], CallOutcome::Reputation(3_500));
    ledger.verify_custody().unwrap();
}

#[test]
fn replay_is_deterministic() {
    let (a, _) = replay(&session());
    let (b, _) = replay(&session());
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn call_log_survives_json() {
    let calls = session();
    let text = serde_json::to_string(&calls).unwrap();
    let parsed: Vec<(Address, LedgerCall)> = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, calls);
}

// ---------------------------------------------------------------------------
// Persistence Tests
// ---------------------------------------------------------------------------

#[test]
fn restored_snapshot_continues_where_it_left_off() {
    let (ledger, _) = replay(&session());
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::open(dir.path().join("db")).unwrap();
    let seq = store.save(&ledger).unwrap();

    assert_eq!(store.latest_seq().unwrap(), Some(seq));
    let restored = store.load_latest().unwrap().unwrap();
    assert_eq!(restored.contract_stats(), ledger.contract_stats());
    assert_eq!(restored.active_nodes(), ledger.active_nodes());

    // The next report must carry nonce 1 on the restored ledger too.
    let executor = SerialExecutor::new(restored);
    let relay = CallContext::now(addr("relay"));
    let report = UsageReport {
        client: addr("client"),
        node: addr("node"),
        minutes_used: 10,
        expected_nonce: 0,
    };
    assert!(executor
        .submit(&relay, LedgerCall::SettleUsage(report))
        .is_err());
    let outcome = executor
        .submit(
            &relay,
            LedgerCall::SettleUsage(UsageReport {
                expected_nonce: 1,
                ..report
            }),
        )
        .unwrap();
    assert!(matches!(outcome, CallOutcome::Settled(r) if r.nonce == 2));
}
