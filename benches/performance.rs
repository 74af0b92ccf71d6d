//! Performance benchmarks for the activity feed.

use activity_feed::broadcast::channel;
use activity_feed::{
    Activity, ActivityId, ActivityInput, ActivityKind, ActivityStore, Broadcaster, FileStore,
    ScanRange, StoreConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tempfile::TempDir;

fn create_store(dir: &TempDir) -> FileStore {
    FileStore::create(StoreConfig {
        path: dir.path().join("store"),
        cache_size: 1000,
        sync_interval: 10_000,
        create_if_missing: true,
    })
    .unwrap()
}

fn sample_input(i: usize) -> ActivityInput {
    ActivityInput::new(ActivityKind::ALL[i % ActivityKind::ALL.len()]).with_payload(json!({
        "index": i,
        "title": "Vintage lamp",
        "price": 42,
        "currency": "USD",
    }))
}

/// Benchmark publish to a varying number of listeners
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    let activity = Activity::from_input(
        ActivityId(1),
        sample_input(0),
        activity_feed::types::now_millis(),
    );

    for listeners in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("listeners", listeners),
            &listeners,
            |b, &listeners| {
                let broadcaster = Broadcaster::default();
                let mut receivers = Vec::with_capacity(listeners);
                for _ in 0..listeners {
                    let (sink, rx) = channel(4);
                    broadcaster.subscribe(sink);
                    receivers.push(rx);
                }

                b.iter(|| {
                    broadcaster.publish(black_box(&activity));
                    for rx in receivers.iter_mut() {
                        let _ = rx.try_recv();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark appends (no fsync per write)
fn bench_append(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = create_store(&dir);
    let mut i = 0;

    c.bench_function("append", |b| {
        b.iter(|| {
            i += 1;
            store.append(black_box(sample_input(i))).unwrap()
        })
    });
}

/// Benchmark the scans behind paging and catch-up
fn bench_scans(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    let dir = TempDir::new().unwrap();
    let store = create_store(&dir);
    for i in 0..10_000 {
        store.append(sample_input(i)).unwrap();
    }

    group.bench_function("latest_page", |b| {
        b.iter(|| store.scan(black_box(&ScanRange::latest(51))).unwrap())
    });

    group.bench_function("deep_page", |b| {
        let range = ScanRange::latest(51).before(Some(ActivityId(500)));
        b.iter(|| store.scan(black_box(&range)).unwrap())
    });

    group.bench_function("kind_page", |b| {
        let range = ScanRange::latest(51).kind(Some(ActivityKind::BetPlaced));
        b.iter(|| store.scan(black_box(&range)).unwrap())
    });

    group.bench_function("catch_up", |b| {
        let range = ScanRange::latest(50).after(Some(ActivityId(9_900)));
        b.iter(|| store.scan(black_box(&range)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_append, bench_scans);
criterion_main!(benches);
