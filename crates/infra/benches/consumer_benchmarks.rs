use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use mercato_events::{topics, InventoryLedgerDelta, TopicRegistry};
use mercato_infra::{fingerprint, ConsumeRequest, IdempotencyStore, InMemoryQueueSinks, QueueConsumer};

fn ledger_delta(i: usize) -> JsonValue {
    json!({
        "event_id": format!("evt_{i}"),
        "occurred_at": "2024-01-01T00:00:00Z",
        "product_id": "prod_1",
        "variant_id": "var_1",
        "delta": 1,
        "reason": "bench",
        "channel": "storefront"
    })
}

/// Object with `width` keys, each holding a small nested object.
fn wide_payload(width: usize) -> JsonValue {
    let map = (0..width)
        .rev()
        .map(|i| (format!("field_{i:04}"), json!({"z": i, "a": [i, i + 1], "m": "value"})))
        .collect::<serde_json::Map<_, _>>();
    JsonValue::Object(map)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for width in [8usize, 64, 512] {
        let payload = wide_payload(width);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &payload, |b, payload| {
            b.iter(|| black_box(fingerprint(black_box(payload)).unwrap()));
        });
    }

    group.finish();
}

fn bench_check_and_store(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("check_and_store");
    let payload = ledger_delta(0);

    group.bench_function("fresh_keys", |b| {
        let store = IdempotencyStore::in_memory();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let key = n.to_string();
            black_box(
                rt.block_on(store.check_and_store(topics::INVENTORY_SYNC, Some(&key), &payload))
                    .unwrap(),
            );
        });
    });

    group.bench_function("duplicate_key", |b| {
        let store = IdempotencyStore::in_memory();
        rt.block_on(store.check_and_store(topics::INVENTORY_SYNC, Some("dup"), &payload))
            .unwrap();
        b.iter(|| {
            black_box(
                rt.block_on(store.check_and_store(topics::INVENTORY_SYNC, Some("dup"), &payload))
                    .unwrap(),
            );
        });
    });

    group.finish();
}

fn bench_consume(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("consume");
    let consumer = QueueConsumer::new(
        Arc::new(TopicRegistry::marketplace()),
        Arc::new(IdempotencyStore::in_memory()),
    );

    group.bench_function("processed", |b| {
        let sinks = InMemoryQueueSinks::<InventoryLedgerDelta>::new();
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            let request = ConsumeRequest::new(topics::INVENTORY_SYNC, ledger_delta(n))
                .with_idempotency_key(n.to_string());
            black_box(
                rt.block_on(consumer.consume(
                    request,
                    |_: InventoryLedgerDelta| async { Ok::<(), String>(()) },
                    &sinks,
                ))
                .unwrap(),
            );
        });
    });

    group.bench_function("retry", |b| {
        let sinks = InMemoryQueueSinks::<InventoryLedgerDelta>::new();
        b.iter(|| {
            let request = ConsumeRequest::new(topics::INVENTORY_SYNC, ledger_delta(0));
            black_box(
                rt.block_on(consumer.consume(
                    request,
                    |_: InventoryLedgerDelta| async { Err::<(), String>("boom".into()) },
                    &sinks,
                ))
                .unwrap(),
            );
            sinks.drain_requeued().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_check_and_store, bench_consume);
criterion_main!(benches);
