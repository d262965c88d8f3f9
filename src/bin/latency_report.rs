use hdrhistogram::Histogram;
use multicell_exchange::{BufferConfig, MultiCellBuffer, Order};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const ITERATIONS: u64 = 1_000_000;
const BACKGROUND_THREADS: usize = 2;

fn print_report(label: &str, histogram: &Histogram<u64>) {
    println!("\n=== {} Latency (ns) ===", label);
    println!("Samples: {}", histogram.len());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Preparing Latency Benchmark...");

    let buffer = Arc::new(MultiCellBuffer::with_config(BufferConfig::default())?);
    let running = Arc::new(AtomicBool::new(true));

    // Background pairs keep the gate and the cells contended.
    let mut background = Vec::new();
    for t in 0..BACKGROUND_THREADS {
        let buffer = buffer.clone();
        let running = running.clone();
        background.push(thread::spawn(move || {
            let mut id = (t as i64 + 1) << 40;
            while running.load(Ordering::Relaxed) {
                id += 1;
                buffer.put(Order::new(id, 5000, 1, Decimal::new(2000, 2)));
                std::hint::black_box(buffer.take());
            }
        }));
    }

    let mut put_hist = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3)?;
    let mut take_hist = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3)?;

    println!("Running {} iterations with {} background threads...", ITERATIONS, BACKGROUND_THREADS);

    let started = Instant::now();
    for i in 0..ITERATIONS {
        let order = Order::new(i as i64, 5000 + (i % 2000) as i64, 1, Decimal::new(2500, 2));

        let start = Instant::now();
        let placed = buffer.put(order);
        put_hist.record(start.elapsed().as_nanos() as u64).unwrap_or(());

        if placed {
            let start = Instant::now();
            std::hint::black_box(buffer.take());
            take_hist.record(start.elapsed().as_nanos() as u64).unwrap_or(());
        }
    }
    let total = started.elapsed();

    running.store(false, Ordering::Relaxed);
    for handle in background {
        let _ = handle.join();
    }

    println!("\nThroughput: {:.2} put+take pairs/sec", ITERATIONS as f64 / total.as_secs_f64());
    print_report("put", &put_hist);
    print_report("take", &take_hist);

    let stats = buffer.stats();
    println!("\n=== Buffer ===");
    println!("Cell fills:    {:?}", stats.fills);
    println!("Lost races:    {}", stats.lost_races);
    println!("Gate timeouts: {}", stats.gate_timeouts);

    Ok(())
}
