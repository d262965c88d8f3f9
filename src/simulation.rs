//! Simulation - wires structures and agents around one shared buffer.
//!
//! ```text
//! [Agent-1..N] --put--> [MultiCellBuffer] --take--> [Structure-1..K] --> [order threads] --> sink
//!      ^                                                   |
//!      +------------------- PriceBoard <-------------------+
//! ```
//!
//! Every agent subscribes and every structure opens its publisher before
//! any thread starts, so no agent misses the first drop and the board only
//! terminates once all structures are done.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::agent::{AgentReport, ParkingAgent};
use crate::buffer::{BufferStats, MultiCellBuffer};
use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::notify::{Notification, PriceBoard};
use crate::pricing::PricingModel;
use crate::receipt::ReceiptSink;
use crate::structure::{ParkingStructure, StructureReport};

/// Everything the run produced.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    pub structures: Vec<StructureReport>,
    pub agents: Vec<AgentReport>,
    pub buffer: BufferStats,
    /// Orders still sitting in the buffer when everyone exited
    pub leftover: usize,
}

impl SimulationReport {
    pub fn orders_placed(&self) -> u64 {
        self.agents.iter().map(|a| a.placed).sum()
    }

    pub fn orders_taken(&self) -> u64 {
        self.structures.iter().map(|s| s.orders_taken).sum()
    }
}

pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run to completion. `pricing` builds the pricing model for structure
    /// `i` (0-based).
    pub fn run<F, P>(
        &self,
        mut pricing: F,
        sink: Arc<dyn ReceiptSink>,
    ) -> Result<SimulationReport, SimulationError>
    where
        F: FnMut(usize) -> P,
        P: PricingModel + 'static,
    {
        let config = &self.config;
        let buffer = Arc::new(MultiCellBuffer::with_config(config.buffer)?);
        let board = PriceBoard::new();

        let subscriptions: Vec<_> = (0..config.agents).map(|_| board.subscribe()).collect();
        let cores = if config.pin_structures {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut structures = Vec::with_capacity(config.structures);
        for i in 0..config.structures {
            let name = format!("Structure-{}", i + 1);
            let mut structure = ParkingStructure::new(
                name.clone(),
                buffer.clone(),
                board.publisher(),
                pricing(i),
                sink.clone(),
            )
            .with_price_drops(config.price_drops)
            .with_cycle_interval(config.cycle_interval);
            // Count down from the last core, which is usually the quietest.
            if let Some(&core) = cores.iter().rev().nth(i) {
                structure = structure.pinned_to(core);
            }
            structures.push((name, structure));
        }

        let mut structure_handles = Vec::with_capacity(config.structures);
        for (name, structure) in structures {
            match spawn(name, move || structure.run()) {
                Ok(handle) => structure_handles.push(handle),
                Err(err) => {
                    // Structures not yet started close their publishers on drop.
                    shut_down(&board, structure_handles, Vec::new());
                    return Err(err);
                }
            }
        }

        let mut agent_handles = Vec::with_capacity(config.agents);
        for (i, subscription) in subscriptions.into_iter().enumerate() {
            if i > 0 && !config.agent_stagger.is_zero() {
                thread::sleep(config.agent_stagger);
            }
            let name = format!("Agent-{}", i + 1);
            let agent = ParkingAgent::new(name.clone(), buffer.clone(), subscription, config.agent_wait);
            match spawn(name, move || agent.run()) {
                Ok(handle) => agent_handles.push(handle),
                Err(err) => {
                    shut_down(&board, structure_handles, agent_handles);
                    return Err(err);
                }
            }
        }
        info!(
            structures = config.structures,
            agents = config.agents,
            cells = buffer.capacity(),
            "simulation started"
        );

        // Join everything before reporting a panic so no thread is left detached.
        let structures = join_all(structure_handles);
        let agents = join_all(agent_handles);
        let (structures, agents) = (structures?, agents?);

        let report = SimulationReport {
            structures,
            agents,
            buffer: buffer.stats(),
            leftover: buffer.occupied(),
        };
        info!(
            placed = report.orders_placed(),
            taken = report.orders_taken(),
            leftover = report.leftover,
            "simulation finished"
        );
        Ok(report)
    }
}

fn spawn<T, F>(name: String, f: F) -> Result<(String, JoinHandle<T>), SimulationError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match thread::Builder::new().name(name.clone()).spawn(f) {
        Ok(handle) => Ok((name, handle)),
        Err(source) => Err(SimulationError::Spawn { name, source }),
    }
}

/// Join every handle, then report the first thread that panicked.
fn join_all<T>(handles: Vec<(String, JoinHandle<T>)>) -> Result<Vec<T>, SimulationError> {
    let mut results = Vec::with_capacity(handles.len());
    let mut failure = None;
    for (name, handle) in handles {
        match handle.join() {
            Ok(result) => results.push(result),
            Err(_) => {
                warn!(thread = %name, "thread panicked");
                failure.get_or_insert(SimulationError::Panicked { name });
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

/// Abandon a partly started run: release the agents and wait for every
/// thread already running.
fn shut_down(
    board: &PriceBoard,
    structures: Vec<(String, JoinHandle<StructureReport>)>,
    agents: Vec<(String, JoinHandle<AgentReport>)>,
) {
    warn!(
        structures = structures.len(),
        agents = agents.len(),
        "simulation aborted, joining started threads"
    );
    board.broadcast(Notification::TERMINAL_PRICE, true);
    let _ = join_all(agents);
    let _ = join_all(structures);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::error::ConfigError;
    use crate::pricing::{RandomPricing, ScriptedPricing};
    use crate::receipt::MemorySink;
    use std::time::Duration;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SimulationConfig {
            agents: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            Simulation::new(config),
            Err(SimulationError::Config(ConfigError::Zero { what: "agents" }))
        ));
    }

    #[test]
    fn test_small_run_completes() {
        let config = SimulationConfig {
            buffer: BufferConfig::default(),
            agents: 3,
            structures: 1,
            price_drops: 5,
            cycle_interval: Duration::from_millis(5),
            agent_wait: Duration::from_millis(50),
            agent_stagger: Duration::ZERO,
            pin_structures: false,
        };
        let sink = Arc::new(MemorySink::new());
        let report = Simulation::new(config)
            .unwrap()
            .run(|i| RandomPricing::seeded(i as u64), sink.clone())
            .unwrap();

        assert_eq!(report.structures.len(), 1);
        assert_eq!(report.agents.len(), 3);
        assert_eq!(report.structures[0].price_drops, 5);
        assert_eq!(
            report.orders_placed(),
            report.orders_taken() + report.leftover as u64
        );
        assert_eq!(sink.len() as u64, report.orders_taken());
    }

    /// Scripted prices, or a feed that fails on its first quote.
    struct FlakyPricing {
        fail: bool,
        prices: ScriptedPricing,
    }

    impl PricingModel for FlakyPricing {
        fn quote(&mut self) -> crate::pricing::Quote {
            if self.fail {
                panic!("pricing feed lost");
            }
            self.prices.quote()
        }
    }

    #[test]
    fn test_panicked_structure_is_reported_after_joining_all() {
        let config = SimulationConfig {
            buffer: BufferConfig::default(),
            agents: 2,
            structures: 2,
            price_drops: 10,
            cycle_interval: Duration::from_millis(20),
            agent_wait: Duration::from_millis(50),
            agent_stagger: Duration::ZERO,
            pin_structures: false,
        };
        let sink = Arc::new(MemorySink::new());
        let result = Simulation::new(config).unwrap().run(
            |i| FlakyPricing {
                fail: i == 0,
                // Every second cycle drops, so Structure-2 runs ~20 cycles.
                prices: ScriptedPricing::from_prices(&[
                    rust_decimal::Decimal::new(3000, 2),
                    rust_decimal::Decimal::new(3900, 2),
                ]),
            },
            sink.clone(),
        );

        assert!(matches!(
            result,
            Err(SimulationError::Panicked { ref name }) if name == "Structure-1"
        ));
        // Structure-2 and its handlers have finished and released the sink.
        assert_eq!(Arc::strong_count(&sink), 1);
    }
}
