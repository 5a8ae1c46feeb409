use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use synckit_core::HybridClock;

/// Benchmark stamp generation under repeated calls at the same wall-clock
/// millisecond (the logical-counter-increment path).
fn bench_stamp_same_millis(c: &mut Criterion) {
    let mut clock = HybridClock::new("client1".to_string());

    c.bench_function("hybrid_clock_stamp_same_millis", |b| {
        b.iter(|| {
            black_box(clock.stamp_at(black_box(1_000)));
        });
    });
}

/// Benchmark stamp generation across an advancing wall clock (the common
/// case: one call per millisecond tick).
fn bench_stamp_advancing(c: &mut Criterion) {
    let mut clock = HybridClock::new("client1".to_string());
    let mut now = 0u64;

    c.bench_function("hybrid_clock_stamp_advancing", |b| {
        b.iter(|| {
            now += 1;
            black_box(clock.stamp_at(black_box(now)));
        });
    });
}

/// Benchmark observing remote stamps from varying numbers of distinct peers.
fn bench_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_clock_observe");

    for peer_count in [1, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(peer_count),
            peer_count,
            |b, &peer_count| {
                let mut clock = HybridClock::new("local".to_string());
                let mut peer_clocks: Vec<HybridClock> = (0..peer_count)
                    .map(|i| HybridClock::new(format!("peer{}", i)))
                    .collect();

                b.iter(|| {
                    for (i, peer_clock) in peer_clocks.iter_mut().enumerate() {
                        let remote = peer_clock.stamp_at(1000 + i as u64);
                        clock.observe(black_box(&remote));
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_stamp_same_millis, bench_stamp_advancing, bench_observe);
criterion_main!(benches);
