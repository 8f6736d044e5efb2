//! Benchmarks for the hot paths of the location pipeline
//!
//! - Freshness merging of a burst of fixes through the supervisor
//! - v1 record encoding and decoding of persisted locations
//! - Registry fan-out to many subscribers
//!
//! Platform: Cross-platform (scripted backends, CI-safe)

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use locus::record::{decode_location, encode_location};
use locus::registry::{LocationSubscriber, SubscriptionRegistry};
use locus::source::SourceNotification;
use locus::sources::from_backend;
use locus::supervisor::ProviderSupervisor;
use locus::test_utils::{ScriptedBackend, snapshot};
use locus::types::{LocationSnapshot, SourceRole};
use std::hint::black_box;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Sink;

impl LocationSubscriber for Sink {
    fn on_location_changed(&self, location: &LocationSnapshot) {
        black_box(location);
    }
}

fn supervisor() -> ProviderSupervisor {
    let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
    let (backend_tx, _backend_rx) = mpsc::unbounded_channel();
    let backend = ScriptedBackend::new("bench");
    let mut factory = from_backend(move || Ok(backend.clone()));
    ProviderSupervisor::new(&mut factory, None, notify_tx, backend_tx)
        .expect("scripted backend always builds")
}

fn bench_freshness_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("freshness_merge");

    for burst in [10usize, 100, 1_000] {
        // Half the burst arrives out of order and must be dropped
        let notifications: Vec<SourceNotification> = (0..burst)
            .map(|i| {
                let millis = if i % 2 == 0 { i as i64 } else { i as i64 - 1 };
                SourceNotification::LocationChanged {
                    role: SourceRole::Primary,
                    location: snapshot("bench", millis, 50.0, 4.0),
                }
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(burst), &notifications, |b, batch| {
            b.iter_batched(
                supervisor,
                |mut supervisor| {
                    for n in batch.iter().cloned() {
                        black_box(supervisor.handle_notification(n));
                    }
                    supervisor
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_record_codec(c: &mut Criterion) {
    let location = snapshot("fused", 1_700_000_000_000, 50.846_557, 4.351_697)
        .with_accuracy(12.5)
        .with_altitude(76.3)
        .with_speed(1.4);
    let record = encode_location(&location);

    let mut group = c.benchmark_group("record_codec");
    group.bench_function("encode", |b| b.iter(|| encode_location(black_box(&location))));
    group.bench_function("decode", |b| b.iter(|| decode_location(black_box(&record))));
    group.finish();
}

fn bench_registry_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_fanout");
    let location = snapshot("bench", 1, 50.0, 4.0);

    for subscribers in [1usize, 16, 128] {
        let mut registry = SubscriptionRegistry::new();
        for _ in 0..subscribers {
            registry.subscribe(Arc::new(Sink));
        }

        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &registry, |b, registry| {
            b.iter(|| registry.notify_location(black_box(&location)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_freshness_merge, bench_record_codec, bench_registry_fanout);
criterion_main!(benches);
