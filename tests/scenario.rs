//! Scenario Tests - the exchange end to end.
//!
//! Runs the buffer, structures and agents together and checks that the
//! books balance: every order placed is either taken (and has a receipt)
//! or still in the buffer at shutdown.

use multicell_exchange::{
    BackoffPolicy, BufferConfig, BufferError, CsvSink, MemorySink, MultiCellBuffer, Order,
    ParkingStructure, PriceBoard, RandomPricing, ReceiptSink, ReceiptStatus, ScanOrder,
    ScriptedPricing, Simulation, SimulationConfig, SimulationReport,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn dollars(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn fast_config(agents: usize, structures: usize, price_drops: u32) -> SimulationConfig {
    SimulationConfig {
        buffer: BufferConfig {
            cells: 3,
            max_attempts: 5,
            backoff: BackoffPolicy::constant(Duration::from_millis(50)),
            scan: ScanOrder::RoundRobin,
        },
        agents,
        structures,
        price_drops,
        cycle_interval: Duration::from_millis(20),
        agent_wait: Duration::from_millis(100),
        agent_stagger: Duration::ZERO,
        pin_structures: false,
    }
}

fn assert_books_balance(report: &SimulationReport) {
    assert_eq!(report.buffer.puts, report.orders_placed());
    assert_eq!(report.buffer.takes, report.orders_taken());
    assert_eq!(
        report.orders_placed() - report.orders_taken(),
        report.leftover as u64,
        "placed orders must be taken or left in the buffer"
    );
    assert!(report.leftover <= 3);
}

// ============================================================================
// Buffer Walkthrough
// ============================================================================

#[test]
fn test_three_cells_four_orders() {
    let buffer = Arc::new(
        MultiCellBuffer::with_config(BufferConfig {
            cells: 3,
            max_attempts: 5,
            backoff: BackoffPolicy::constant(Duration::from_millis(100)),
            scan: ScanOrder::Fixed,
        })
        .unwrap(),
    );
    let (a, b, c, d) = (
        Order::new(1, 5001, 1, dollars(2000)),
        Order::new(2, 5002, 2, dollars(2100)),
        Order::new(3, 5003, 1, dollars(2200)),
        Order::new(4, 5004, 2, dollars(2300)),
    );

    for order in [&a, &b, &c] {
        assert!(buffer.put(order.clone()));
    }
    assert_eq!(buffer.to_string(), "Buffer: 0 :: 1 1 :: 2 2 :: 3");

    // D, from another thread, runs out of attempts while nobody takes.
    let d_thread = {
        let buffer = buffer.clone();
        let d = d.clone();
        thread::spawn(move || buffer.try_put(d))
    };
    let err = d_thread.join().unwrap().unwrap_err();
    assert_eq!(err.source, BufferError::NoSlotAvailable { attempts: 5 });
    assert_eq!(err.order, d);

    // A take frees exactly one of A, B, C.
    let taken = buffer.take().expect("buffer is full");
    assert!([&a, &b, &c].contains(&&taken));

    assert!(buffer.put(d.clone()));
    let held: HashSet<i64> = buffer.snapshot().into_iter().flatten().collect();
    let expected: HashSet<i64> = [1, 2, 3, 4].into_iter().filter(|&id| id != taken.id()).collect();
    assert_eq!(held, expected);
    assert_eq!(buffer.available_permits(), 3);
}

// ============================================================================
// Structure Against a Live Board
// ============================================================================

#[test]
fn test_structure_charges_what_agents_ordered() {
    let buffer = Arc::new(MultiCellBuffer::new(3));
    let board = PriceBoard::new();
    let sub = board.subscribe();
    let sink = Arc::new(MemorySink::new());

    // Prices never rise, so every cycle is a drop: 3 cycles in total.
    let mut structure = ParkingStructure::new(
        "Structure-1",
        buffer.clone(),
        board.publisher(),
        ScriptedPricing::from_prices(&[dollars(2000), dollars(1800), dollars(1500)]),
        sink.clone(),
    )
    .with_price_drops(3)
    .with_cycle_interval(Duration::ZERO);

    assert!(buffer.put(Order::new(0, 5100, 2, dollars(2000))));
    let first = structure.cycle();
    assert!(first.dropped);
    assert_eq!(first.taken, Some(0));
    assert_eq!(sub.wait(Duration::ZERO).map(|n| n.price), Some(dollars(2000)));

    let report = structure.run();
    assert_eq!(report.cycles, 3);
    assert_eq!(report.price_drops, 3);
    assert_eq!(report.orders_taken, 1);
    assert!(board.is_terminated());

    let receipts = sink.receipts();
    assert_eq!(receipts.len(), 1);
    let receipt = &receipts[0];
    assert_eq!(receipt.status, ReceiptStatus::Charged);
    assert_eq!(receipt.structure, "Structure-1");
    // (20.00 + 5.00) x 2 x 1.10
    assert_eq!(receipt.total, dollars(5500));
}

#[test]
fn test_declined_card_is_not_charged() {
    let buffer = Arc::new(MultiCellBuffer::new(1));
    let board = PriceBoard::new();
    let sink = Arc::new(MemorySink::new());
    let structure = ParkingStructure::new(
        "Structure-1",
        buffer.clone(),
        board.publisher(),
        ScriptedPricing::from_prices(&[dollars(1000)]),
        sink.clone(),
    )
    .with_price_drops(1)
    .with_cycle_interval(Duration::ZERO);

    assert!(buffer.put(Order::new(9, 9999, 1, dollars(1000))));
    structure.run();

    let receipts = sink.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].status, ReceiptStatus::CardDeclined);
    assert_eq!(receipts[0].total, Decimal::ZERO);
}

// ============================================================================
// Full Simulation
// ============================================================================

#[test]
fn test_simulation_with_falling_prices() {
    // Every agent can afford every price, so each drop produces orders.
    let prices = [dollars(500), dollars(400), dollars(300), dollars(200)];
    let sink = Arc::new(MemorySink::new());

    let start = Instant::now();
    let report = Simulation::new(fast_config(3, 1, 4))
        .unwrap()
        .run(|_| ScriptedPricing::from_prices(&prices), sink.clone())
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(10));

    assert_eq!(report.structures[0].price_drops, 4);
    assert_eq!(report.structures[0].cycles, 4);
    assert_eq!(report.agents.len(), 3);
    assert!(report.agents.iter().all(|a| a.rejected == 0));
    assert!(report.orders_placed() > 0);
    assert_books_balance(&report);

    let receipts = sink.receipts();
    assert_eq!(receipts.len() as u64, report.orders_taken());
    assert!(receipts.iter().all(|r| r.status == ReceiptStatus::Charged));
    assert!(receipts.iter().all(|r| prices.contains(&r.unit_price)));
}

#[test]
fn test_simulation_with_several_structures() {
    let sink = Arc::new(MemorySink::new());
    let report = Simulation::new(fast_config(5, 3, 3))
        .unwrap()
        .run(
            |i| RandomPricing::with_rng(ChaCha8Rng::seed_from_u64(i as u64)),
            sink.clone(),
        )
        .unwrap();

    assert_eq!(report.structures.len(), 3);
    for (i, s) in report.structures.iter().enumerate() {
        assert_eq!(s.name, format!("Structure-{}", i + 1));
        assert_eq!(s.price_drops, 3);
        assert!(s.cycles >= 3);
    }
    assert_eq!(report.agents.len(), 5);
    assert_books_balance(&report);

    let receipts = sink.receipts();
    assert_eq!(receipts.len() as u64, report.orders_taken());
    for r in &receipts {
        assert_eq!(r.status, ReceiptStatus::Charged);
        let expected = ((r.unit_price + r.location_fee) * Decimal::from(r.quantity) * r.tax).round_dp(2);
        assert_eq!(r.total, expected);
    }
}

#[test]
fn test_simulation_writes_csv() {
    let prices = [dollars(900), dollars(800), dollars(700)];
    let csv = Arc::new(CsvSink::new(csv::Writer::from_writer(Vec::new())));
    let sink: Arc<dyn ReceiptSink> = csv.clone();

    let report = Simulation::new(fast_config(2, 1, 3))
        .unwrap()
        .run(|_| ScriptedPricing::from_prices(&prices), sink)
        .unwrap();

    let bytes = Arc::try_unwrap(csv)
        .ok()
        .expect("simulation released the sink")
        .into_inner()
        .ok()
        .expect("csv flush");
    let text = String::from_utf8(bytes).unwrap();
    let rows: Vec<&str> = text.lines().collect();

    if report.orders_taken() == 0 {
        assert!(rows.is_empty());
    } else {
        assert!(rows[0].starts_with("order_id,card_number,quantity,unit_price"));
        assert_eq!(rows.len() as u64 - 1, report.orders_taken());
        assert!(rows[1..].iter().all(|row| row.contains(",charged,Structure-1,")));
    }
}
