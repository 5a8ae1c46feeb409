use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use synckit_core::{DeltaEngine, Document, Limits, VectorClock};

/// Benchmark stamping `set` writes for varying field counts.
fn bench_stamp_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("stamp_set");

    for field_count in [10, 50, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(field_count),
            field_count,
            |b, &field_count| {
                let mut engine = DeltaEngine::new("client1".to_string(), Limits::default());
                b.iter(|| {
                    for i in 0..field_count {
                        black_box(
                            engine
                                .stamp_set(
                                    "doc1".to_string(),
                                    format!("field{}", i),
                                    json!(format!("value_{}", i)),
                                )
                                .unwrap(),
                        );
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark applying a batch of deltas to a document of varying size.
fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_batch");

    for field_count in [10, 50, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(field_count),
            field_count,
            |b, &field_count| {
                let mut engine = DeltaEngine::new("client1".to_string(), Limits::default());
                let deltas: Vec<_> = (0..field_count)
                    .map(|i| {
                        engine
                            .stamp_set(
                                "doc1".to_string(),
                                format!("field{}", i),
                                json!(format!("value_{}", i)),
                            )
                            .unwrap()
                    })
                    .collect();

                b.iter(|| {
                    let mut doc = Document::new("doc1".to_string());
                    let mut diff = synckit_core::Diff::default();
                    for delta in &deltas {
                        black_box(synckit_core::document::apply_delta(
                            &mut doc, delta, &mut diff,
                        ));
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark re-applying an already-seen delta (the `DroppedStale` path).
fn bench_apply_stale(c: &mut Criterion) {
    let mut engine = DeltaEngine::new("client1".to_string(), Limits::default());
    let mut doc = Document::new("doc1".to_string());
    let mut diff = synckit_core::Diff::default();

    let delta = engine
        .stamp_set("doc1".to_string(), "f".to_string(), json!("v"))
        .unwrap();
    synckit_core::document::apply_delta(&mut doc, &delta, &mut diff);

    c.bench_function("apply_stale_delta", |b| {
        b.iter(|| {
            let mut diff = synckit_core::Diff::default();
            black_box(synckit_core::document::apply_delta(
                black_box(&mut doc),
                black_box(&delta),
                &mut diff,
            ));
        });
    });
}

/// Benchmark filtering a delta batch against a peer's vector clock.
fn bench_filter_for_peer(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_for_peer");

    for delta_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(delta_count),
            delta_count,
            |b, &delta_count| {
                let mut engine = DeltaEngine::new("client1".to_string(), Limits::default());
                let deltas: Vec<_> = (0..delta_count)
                    .map(|i| {
                        engine
                            .stamp_set(
                                "doc1".to_string(),
                                format!("field{}", i),
                                json!(i),
                            )
                            .unwrap()
                    })
                    .collect();

                let mut peer_vector = VectorClock::new();
                peer_vector.advance(&"client1".to_string(), (delta_count / 2) as u64);

                b.iter(|| {
                    black_box(engine.filter_for_peer(black_box(&deltas), black_box(&peer_vector)));
                });
            },
        );
    }
    group.finish();
}

/// Benchmark wire-size computation (used on the hot path for limit checks).
fn bench_wire_size(c: &mut Criterion) {
    let mut engine = DeltaEngine::new("client1".to_string(), Limits::default());
    let delta = engine
        .stamp_set("doc1".to_string(), "field".to_string(), json!("a modestly sized value"))
        .unwrap();

    c.bench_function("delta_wire_size", |b| {
        b.iter(|| {
            black_box(delta.wire_size().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_stamp_set,
    bench_apply_batch,
    bench_apply_stale,
    bench_filter_for_peer,
    bench_wire_size,
);
criterion_main!(benches);
