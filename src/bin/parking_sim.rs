use clap::{Parser, ValueEnum};
use multicell_exchange::{
    BackoffPolicy, BufferConfig, CsvSink, LogSink, RandomPricing, ReceiptSink, ScanOrder,
    Simulation, SimulationConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scan {
    Fixed,
    RoundRobin,
    Random,
}

impl From<Scan> for ScanOrder {
    fn from(scan: Scan) -> Self {
        match scan {
            Scan::Fixed => ScanOrder::Fixed,
            Scan::RoundRobin => ScanOrder::RoundRobin,
            Scan::Random => ScanOrder::Random,
        }
    }
}

/// Parking space exchange: agents order through a multi-cell buffer while
/// structures announce price drops.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of parking agents (producers)
    #[arg(short = 'n', long, default_value_t = 5)]
    agents: usize,

    /// Number of parking structures (consumers)
    #[arg(short = 'k', long, default_value_t = 1)]
    structures: usize,

    /// Buffer cells
    #[arg(long, default_value_t = 3)]
    cells: usize,

    /// Price drops per structure before shutdown
    #[arg(long, default_value_t = 20)]
    price_drops: u32,

    /// Structure cycle length in milliseconds
    #[arg(long, default_value_t = 1000)]
    cycle_ms: u64,

    /// Attempts per buffer operation
    #[arg(long, default_value_t = 5)]
    attempts: u32,

    /// Gate wait for the first attempt, in milliseconds
    #[arg(long, default_value_t = 5000)]
    gate_wait_ms: u64,

    /// Double the gate wait each attempt (capped at 8x)
    #[arg(long)]
    exponential: bool,

    #[arg(long, value_enum, default_value_t = Scan::RoundRobin)]
    scan: Scan,

    /// Pin structure threads to CPU cores
    #[arg(long)]
    pin: bool,

    /// Seed for the pricing model (structure i uses seed + i)
    #[arg(long)]
    seed: Option<u64>,

    /// Write receipts to this CSV file instead of the log
    #[arg(long)]
    csv: Option<PathBuf>,
}

/// Gate wait policy from the CLI flags. Exponential waits cap at 8x the first.
fn gate_backoff(gate_wait_ms: u64, exponential: bool) -> BackoffPolicy {
    let first = Duration::from_millis(gate_wait_ms);
    if exponential {
        BackoffPolicy::exponential(first, first.saturating_mul(8))
    } else {
        BackoffPolicy::constant(first)
    }
}

fn structure_seed(seed: u64, structure: usize) -> u64 {
    seed.wrapping_add(structure as u64)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let args = Args::parse();

    let backoff = gate_backoff(args.gate_wait_ms, args.exponential);

    let config = SimulationConfig {
        buffer: BufferConfig {
            cells: args.cells,
            max_attempts: args.attempts,
            backoff,
            scan: args.scan.into(),
        },
        agents: args.agents,
        structures: args.structures,
        price_drops: args.price_drops,
        cycle_interval: Duration::from_millis(args.cycle_ms),
        pin_structures: args.pin,
        ..SimulationConfig::default()
    };

    let csv_sink = match &args.csv {
        Some(path) => Some(Arc::new(CsvSink::create(path)?)),
        None => None,
    };
    let sink: Arc<dyn ReceiptSink> = match &csv_sink {
        Some(csv) => csv.clone(),
        None => Arc::new(LogSink),
    };

    let simulation = Simulation::new(config)?;
    let seed = args.seed;
    let report = simulation.run(
        |i| match seed {
            Some(seed) => RandomPricing::seeded(structure_seed(seed, i)),
            None => RandomPricing::new(),
        },
        sink,
    )?;

    if let Some(csv) = csv_sink {
        csv.flush()?;
    }

    println!("\n=== Exchange Report ===");
    for s in &report.structures {
        println!(
            "{:<14} cycles {:>4}  drops {:>3}  taken {:>4}  empty {:>4}",
            s.name, s.cycles, s.price_drops, s.orders_taken, s.empty_takes
        );
    }
    for a in &report.agents {
        println!(
            "{:<14} placed {:>4}  dropped {:>3}  rejected {:>3}  idle {:>3}",
            a.name, a.placed, a.dropped, a.rejected, a.idle_waits
        );
    }
    println!("---------------------------");
    println!("Cell fills:     {:?}", report.buffer.fills);
    println!("Gate timeouts:  {}", report.buffer.gate_timeouts);
    println!("Lost races:     {}", report.buffer.lost_races);
    println!("Left in buffer: {}", report.leftover);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_backoff_from_flags() {
        let constant = gate_backoff(200, false);
        assert_eq!(constant.next(3), Duration::from_millis(200));

        let exponential = gate_backoff(200, true);
        assert_eq!(exponential.max, Duration::from_millis(1600));
    }

    #[test]
    fn test_extreme_flags_do_not_overflow() {
        let policy = gate_backoff(u64::MAX, true);
        assert_eq!(policy.max, Duration::from_millis(u64::MAX).saturating_mul(8));
        assert_eq!(structure_seed(u64::MAX, 2), 1);
    }
}
