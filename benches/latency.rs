//! Benchmark harness using Criterion for buffer latency.
//!
//! Measures:
//! - put + take on an idle buffer
//! - take on an empty buffer (full retry budget)
//! - put + take with background contention
//! - gate acquire/release

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use multicell_exchange::{BufferConfig, Gate, MultiCellBuffer, Order, ScanOrder};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn order(id: i64) -> Order {
    Order::new(id, 5000, 1, Decimal::new(2500, 2))
}

/// Benchmark: put then take, no other threads
fn bench_put_take_idle(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_take_idle");

    for scan in [ScanOrder::Fixed, ScanOrder::RoundRobin, ScanOrder::Random] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", scan)), &scan, |b, &scan| {
            let buffer = MultiCellBuffer::with_config(BufferConfig {
                scan,
                ..BufferConfig::default()
            })
            .unwrap();
            let mut id = 0i64;
            b.iter(|| {
                id += 1;
                buffer.put(order(id));
                black_box(buffer.take())
            })
        });
    }

    group.finish();
}

/// Benchmark: take on an empty buffer exhausts every attempt
fn bench_take_empty(c: &mut Criterion) {
    let buffer = MultiCellBuffer::new(3);
    c.bench_function("take_empty", |b| b.iter(|| black_box(buffer.take())));
}

/// Benchmark: put then take while other threads churn the same buffer
fn bench_put_take_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_take_contended");
    group.measurement_time(Duration::from_secs(5));

    for threads in [1usize, 2, 4].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            let buffer = Arc::new(MultiCellBuffer::new(3));
            let running = Arc::new(AtomicBool::new(true));

            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let buffer = buffer.clone();
                    let running = running.clone();
                    thread::spawn(move || {
                        let mut id = (t as i64 + 1) << 40;
                        while running.load(Ordering::Relaxed) {
                            id += 1;
                            buffer.put(order(id));
                            black_box(buffer.take());
                        }
                    })
                })
                .collect();

            let mut id = 0i64;
            b.iter(|| {
                id += 1;
                buffer.put(order(id));
                black_box(buffer.take())
            });

            running.store(false, Ordering::Relaxed);
            for h in handles {
                h.join().unwrap();
            }
        });
    }

    group.finish();
}

/// Benchmark: uncontended gate permit round trip
fn bench_gate(c: &mut Criterion) {
    let gate = Gate::new(3);
    c.bench_function("gate_acquire_release", |b| {
        b.iter(|| black_box(gate.acquire_timeout(Duration::from_millis(1))))
    });
}

criterion_group!(
    benches,
    bench_put_take_idle,
    bench_take_empty,
    bench_put_take_contended,
    bench_gate,
);

criterion_main!(benches);
