//! Multi-Cell Buffer - bounded handoff between agents and structures.
//!
//! N guarded cells behind a gate of N permits. Each `put`/`take` attempt:
//! 1. GATE: wait (bounded by the backoff policy) for one permit
//! 2. SCAN: walk the cells from the scan start, reading occupancy hints
//! 3. CLAIM: take the chosen cell's guard and re-check it before mutating
//!
//! The permit is dropped at the end of every attempt. Different cells are
//! worked on in parallel; only the guard serialises access to one cell.
//! Items are not queued: which order a `take` returns depends on scan
//! position, not arrival time.

use arrayvec::ArrayVec;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, warn};

use crate::cell::Cell;
use crate::config::{BufferConfig, ScanOrder, MAX_CELLS};
use crate::error::{BufferError, ConfigError, PutError};
use crate::gate::Gate;
use crate::order::Order;

/// Point-in-time counters for a buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub puts: u64,
    pub put_failures: u64,
    pub takes: u64,
    pub empty_takes: u64,
    /// Attempts that never got a gate permit
    pub gate_timeouts: u64,
    /// Claims that found the cell already changed by another thread
    pub lost_races: u64,
    pub cell_faults: u64,
    /// Orders ever stored, per cell
    pub fills: Vec<u64>,
}

#[derive(Default)]
struct Counters {
    puts: AtomicU64,
    put_failures: AtomicU64,
    takes: AtomicU64,
    empty_takes: AtomicU64,
    gate_timeouts: AtomicU64,
    lost_races: AtomicU64,
    cell_faults: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// The shared order buffer.
pub struct MultiCellBuffer {
    cells: ArrayVec<Cell, MAX_CELLS>,
    gate: Gate,
    config: BufferConfig,
    /// Next scan start for `ScanOrder::RoundRobin`
    cursor: AtomicUsize,
    counters: Counters,
}

impl MultiCellBuffer {
    /// Create a buffer with `cells` cells and default retry settings.
    ///
    /// # Panics
    /// Panics if `cells` is 0 or greater than `MAX_CELLS`.
    pub fn new(cells: usize) -> Self {
        assert!(
            cells > 0 && cells <= MAX_CELLS,
            "cell count must be within 1..=MAX_CELLS"
        );
        Self::build(BufferConfig::with_cells(cells))
    }

    /// Create a buffer from a validated config.
    pub fn with_config(config: BufferConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BufferConfig) -> Self {
        let cells = (0..config.cells).map(|_| Cell::new()).collect();
        Self {
            cells,
            gate: Gate::new(config.cells),
            config,
            cursor: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    /// Place an order in the first empty cell found. Returns false once the
    /// attempt budget is spent.
    pub fn put(&self, order: Order) -> bool {
        self.try_put(order).is_ok()
    }

    /// Extract an order from the first full cell found.
    pub fn take(&self) -> Option<Order> {
        self.try_take().ok().map(|(_, order)| order)
    }

    /// `put` that reports the cell used, or the failure with the order.
    pub fn try_put(&self, mut order: Order) -> Result<usize, PutError> {
        let attempts = self.config.max_attempts;
        let mut timeouts = 0;

        for attempt in 0..attempts {
            let Some(permit) = self.gate.acquire_timeout(self.config.backoff.next(attempt)) else {
                timeouts += 1;
                bump(&self.counters.gate_timeouts);
                debug!(attempt, order_id = order.id(), "put: gate wait expired");
                continue;
            };

            for index in self.scan() {
                let cell = &self.cells[index];
                if !cell.looks_empty() {
                    continue;
                }
                match cell.try_fill(order) {
                    Ok(()) => {
                        bump(&self.counters.puts);
                        debug!(cell = index, attempt, "put: order placed");
                        return Ok(index);
                    }
                    Err(back) => {
                        // Another writer filled it between scan and claim.
                        order = back;
                        bump(&self.counters.lost_races);
                        debug!(cell = index, "put: cell claimed by another writer");
                    }
                }
            }

            debug!(attempt, "put: no empty cell");
            drop(permit);
            thread::yield_now();
        }

        bump(&self.counters.put_failures);
        let source = if timeouts == attempts {
            BufferError::GateTimeout { attempts }
        } else {
            BufferError::NoSlotAvailable { attempts }
        };
        warn!(order_id = order.id(), reason = source.as_label(), "put: order not placed");
        Err(PutError { order, source })
    }

    /// `take` that reports the cell used, or why nothing was extracted.
    pub fn try_take(&self) -> Result<(usize, Order), BufferError> {
        let attempts = self.config.max_attempts;
        let mut timeouts = 0;

        for attempt in 0..attempts {
            let Some(permit) = self.gate.acquire_timeout(self.config.backoff.next(attempt)) else {
                timeouts += 1;
                bump(&self.counters.gate_timeouts);
                debug!(attempt, "take: gate wait expired");
                continue;
            };

            for index in self.scan() {
                let cell = &self.cells[index];
                if !cell.looks_full() {
                    continue;
                }
                match cell.try_drain() {
                    Ok(Some(order)) => {
                        bump(&self.counters.takes);
                        debug!(cell = index, order_id = order.id(), "take: order extracted");
                        return Ok((index, order));
                    }
                    Ok(None) => {
                        bump(&self.counters.lost_races);
                        debug!(cell = index, "take: cell drained by another reader");
                    }
                    Err(reason) => {
                        bump(&self.counters.cell_faults);
                        let fault = BufferError::CellFault { cell: index, reason };
                        warn!(cell = index, error = %fault, "take: extraction failed");
                    }
                }
            }

            drop(permit);
            thread::yield_now();
        }

        bump(&self.counters.empty_takes);
        if timeouts == attempts {
            Err(BufferError::GateTimeout { attempts })
        } else {
            Err(BufferError::NoOrderAvailable { attempts })
        }
    }

    /// Cell indices in scan order for one attempt.
    fn scan(&self) -> impl Iterator<Item = usize> {
        let n = self.cells.len();
        let start = match self.config.scan {
            ScanOrder::Fixed => 0,
            ScanOrder::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % n,
            ScanOrder::Random => rand::thread_rng().gen_range(0..n),
        };
        (0..n).map(move |k| (start + k) % n)
    }

    /// Number of cells (and gate permits).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Gate permits not currently held.
    pub fn available_permits(&self) -> usize {
        self.gate.available()
    }

    /// Cells currently marked full.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| c.looks_full()).count()
    }

    /// Order id per cell, each read under that cell's guard.
    pub fn snapshot(&self) -> Vec<Option<i64>> {
        self.cells.iter().map(Cell::peek_id).collect()
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn stats(&self) -> BufferStats {
        let c = &self.counters;
        BufferStats {
            puts: c.puts.load(Ordering::Relaxed),
            put_failures: c.put_failures.load(Ordering::Relaxed),
            takes: c.takes.load(Ordering::Relaxed),
            empty_takes: c.empty_takes.load(Ordering::Relaxed),
            gate_timeouts: c.gate_timeouts.load(Ordering::Relaxed),
            lost_races: c.lost_races.load(Ordering::Relaxed),
            cell_faults: c.cell_faults.load(Ordering::Relaxed),
            fills: self.cells.iter().map(Cell::fills).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }
}

impl Default for MultiCellBuffer {
    fn default() -> Self {
        Self::build(BufferConfig::default())
    }
}

/// One-line view: `Buffer: 0 :: 4 1 :: null 2 :: 7`.
impl fmt::Display for MultiCellBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer:")?;
        for (i, id) in self.snapshot().into_iter().enumerate() {
            match id {
                Some(id) => write!(f, " {i} :: {id}")?,
                None => write!(f, " {i} :: null")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MultiCellBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiCellBuffer")
            .field("cells", &self.cells)
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish()
    }
}
