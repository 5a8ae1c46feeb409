use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use synckit_core::VectorClock;

/// Benchmark clock advance operation
fn bench_advance(c: &mut Criterion) {
    let mut clock = VectorClock::new();
    let client_id = "client1".to_string();

    c.bench_function("vector_clock_advance", |b| {
        b.iter(|| {
            clock.advance(black_box(&client_id), black_box(1));
        });
    });
}

/// Benchmark clock comparison
fn bench_compare(c: &mut Criterion) {
    let mut clock1 = VectorClock::new();
    let mut clock2 = VectorClock::new();

    let client1 = "client1".to_string();
    let client2 = "client2".to_string();

    clock1.advance(&client1, 1);
    clock1.advance(&client2, 1);
    clock2.advance(&client1, 1);

    c.bench_function("vector_clock_compare", |b| {
        b.iter(|| {
            black_box(clock1.compare(&clock2));
        });
    });
}

/// Benchmark clock merging with varying numbers of clients
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_clock_merge");

    for client_count in [2, 5, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(client_count),
            client_count,
            |b, &client_count| {
                let mut clock1 = VectorClock::new();
                let mut clock2 = VectorClock::new();

                for i in 0..client_count {
                    let client_id1 = format!("client{}", i);
                    let client_id2 = format!("client{}", (i + client_count / 2) % client_count);
                    clock1.advance(&client_id1, 1);
                    clock2.advance(&client_id2, 1);
                }

                b.iter(|| {
                    let mut clock_copy = clock1.clone();
                    clock_copy.merge(&clock2);
                    black_box(());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark getting clock value for a client
fn bench_get_clock(c: &mut Criterion) {
    let mut clock = VectorClock::new();
    let client1 = "client1".to_string();
    let client2 = "client2".to_string();

    clock.advance(&client1, 1);
    clock.advance(&client2, 1);

    c.bench_function("vector_clock_get", |b| {
        b.iter(|| {
            black_box(clock.get(black_box(&client1)));
        });
    });
}

/// Benchmark clock serialization (indirectly via clone)
fn bench_clone(c: &mut Criterion) {
    let mut clock = VectorClock::new();

    for i in 0..50 {
        let client_id = format!("client{}", i);
        clock.advance(&client_id, 1);
    }

    c.bench_function("vector_clock_clone", |b| {
        b.iter(|| {
            black_box(clock.clone());
        });
    });
}

/// Benchmark concurrent clock advances from several origins (simulated)
fn bench_concurrent_advances(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_advances");

    for advance_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(advance_count),
            advance_count,
            |b, &advance_count| {
                let mut clock = VectorClock::new();

                b.iter(|| {
                    for i in 0..advance_count {
                        let client_id = format!("client{}", i % 5);
                        clock.advance(black_box(&client_id), black_box(i as u64));
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_advance,
    bench_compare,
    bench_merge,
    bench_get_clock,
    bench_clone,
    bench_concurrent_advances,
);
criterion_main!(benches);
