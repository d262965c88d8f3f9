//! Configuration for the buffer and the simulation.
//!
//! Defaults reproduce the reference setup: 3 cells, 5 attempts with a fixed
//! 5 s gate wait, 5 agents, 1 structure, 20 price drops.

use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;

/// Upper bound on the number of cells in one buffer.
pub const MAX_CELLS: usize = 64;

/// Where each scan over the cells starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanOrder {
    /// Always start at cell 0.
    Fixed,
    /// Start one past where the previous scan started.
    #[default]
    RoundRobin,
    /// Start at a random cell.
    Random,
}

/// Buffer construction parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferConfig {
    /// Number of cells; also the number of gate permits.
    pub cells: usize,
    /// Attempts per `put`/`take` before giving up.
    pub max_attempts: u32,
    /// Gate wait per attempt.
    pub backoff: BackoffPolicy,
    pub scan: ScanOrder,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            cells: 3,
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            scan: ScanOrder::default(),
        }
    }
}

impl BufferConfig {
    /// Default config with a different cell count.
    pub fn with_cells(cells: usize) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cells == 0 || self.cells > MAX_CELLS {
            return Err(ConfigError::CellCount {
                got: self.cells,
                max: MAX_CELLS,
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.backoff.max < self.backoff.first {
            return Err(ConfigError::BackoffRange {
                first_ms: self.backoff.first.as_millis(),
                max_ms: self.backoff.max.as_millis(),
            });
        }
        Ok(())
    }
}

/// Whole-exchange parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationConfig {
    pub buffer: BufferConfig,
    /// Number of agent (producer) threads.
    pub agents: usize,
    /// Number of structure (consumer) threads.
    pub structures: usize,
    /// Price drops each structure announces before it stops.
    pub price_drops: u32,
    /// Pause at the start of every structure cycle.
    pub cycle_interval: Duration,
    /// How long an agent waits for a notification before re-checking.
    pub agent_wait: Duration,
    /// Delay between starting consecutive agents.
    pub agent_stagger: Duration,
    /// Pin each structure thread to its own core, counting down from the last.
    pub pin_structures: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            agents: 5,
            structures: 1,
            price_drops: 20,
            cycle_interval: Duration::from_secs(1),
            agent_wait: Duration::from_secs(5),
            agent_stagger: Duration::from_millis(250),
            pin_structures: false,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.buffer.validate()?;
        if self.agents == 0 {
            return Err(ConfigError::Zero { what: "agents" });
        }
        if self.structures == 0 {
            return Err(ConfigError::Zero { what: "structures" });
        }
        if self.price_drops == 0 {
            return Err(ConfigError::Zero { what: "price_drops" });
        }
        Ok(())
    }
}
