// Settlement benchmarks for the ClearNet ledger.
//
// Covers single-report settlement, batches of sequential reports on one
// channel, and snapshot serialization as the ledger grows.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use clearnet_contracts::config::{MIN_STAKE, ONE_TOKEN};
use clearnet_contracts::{Address, CallContext, ClearNet, LedgerConfig};

/// Builds a ledger with `n` nodes, each with one funded client channel.
/// Returns the ledger, the relay context and the `(client, node)` pairs.
fn setup_ledger(n: usize) -> (ClearNet, CallContext, Vec<(Address, Address)>) {
    let owner = CallContext::now(Address::derive("owner"));
    let relay = CallContext::now(Address::derive("relay"));
    let mut ledger = ClearNet::new(owner.sender, LedgerConfig::default()).unwrap();
    let custody = ledger.custody_address();
    ledger.add_relay_operator(&owner, relay.sender).unwrap();

    let mut pairs = Vec::with_capacity(n);
    for i in 0..n {
        let node = CallContext::now(Address::derive(&format!("node{i}")));
        let client = CallContext::now(Address::derive(&format!("client{i}")));
        let deposit = 1_000 * ONE_TOKEN;

        ledger.transfer(&owner, node.sender, MIN_STAKE).unwrap();
        ledger.approve(&node, custody, MIN_STAKE).unwrap();
        let ip = format!("10.{}.{}.1", (i / 256) % 256, i % 256);
        ledger
            .register_node(&node, &ip, 8443, ONE_TOKEN / 100)
            .unwrap();

        ledger.transfer(&owner, client.sender, deposit).unwrap();
        ledger.approve(&client, custody, deposit).unwrap();
        ledger
            .open_payment_channel(&client, node.sender, deposit)
            .unwrap();
        pairs.push((client.sender, node.sender));
    }
    ledger.drain_events();
    (ledger, relay, pairs)
}

fn bench_settle_single(c: &mut Criterion) {
    c.bench_function("settlement/settle_single", |b| {
        b.iter_with_setup(
            || setup_ledger(1),
            |(mut ledger, relay, pairs)| {
                let (client, node) = pairs[0];
                ledger.settle_usage(&relay, client, node, 60, 0).unwrap();
            },
        );
    });
}

fn bench_settle_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement/settle_sequential");

    for reports in [10u64, 100, 1_000] {
        group.throughput(Throughput::Elements(reports));
        group.bench_with_input(BenchmarkId::from_parameter(reports), &reports, |b, &n| {
            b.iter_with_setup(
                || setup_ledger(1),
                |(mut ledger, relay, pairs)| {
                    let (client, node) = pairs[0];
                    for nonce in 0..n {
                        ledger.settle_usage(&relay, client, node, 1, nonce).unwrap();
                    }
                },
            );
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement/snapshot_bincode");

    for nodes in [10usize, 100, 1_000] {
        let (ledger, _, _) = setup_ledger(nodes);
        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &ledger, |b, ledger| {
            b.iter(|| bincode::serialize(ledger).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_settle_single,
    bench_settle_sequential,
    bench_snapshot,
);
criterion_main!(benches);
