//! Cell - one slot of the multi-cell buffer.
//!
//! A cell holds at most one order behind its own guard. An atomic occupancy
//! hint lets scans skip cells without taking the guard; the hint is only
//! ever written while the guard is held, so it can be stale but never
//! ahead of the slot.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::order::Order;

/// Reason reported when the hint says full but the slot is empty.
pub const DESYNC: &str = "occupancy hint set on an empty slot";

/// A single guarded slot, padded to its own cache line so neighbouring
/// cells do not false-share.
#[repr(align(64))]
pub struct Cell {
    /// Lock-free scan hint (true = full)
    occupied: AtomicBool,
    /// The guard and the slot it protects
    slot: Mutex<Option<Order>>,
    /// Number of orders ever stored here
    fills: AtomicU64,
}

impl Cell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self {
            occupied: AtomicBool::new(false),
            slot: Mutex::new(None),
            fills: AtomicU64::new(0),
        }
    }

    /// Scan read: true if the cell appeared empty. May be stale.
    #[inline]
    pub fn looks_empty(&self) -> bool {
        !self.occupied.load(Ordering::Acquire)
    }

    /// Scan read: true if the cell appeared full. May be stale.
    #[inline]
    pub fn looks_full(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    /// Store `order` if the slot is still empty once the guard is held.
    ///
    /// Returns the order back if another writer got there first; a full
    /// slot is never overwritten.
    pub fn try_fill(&self, order: Order) -> Result<(), Order> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(order);
        }
        *slot = Some(order);
        self.occupied.store(true, Ordering::Release);
        self.fills.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Move the order out if the slot is still full once the guard is held.
    ///
    /// `Ok(None)` means another reader drained it first. A hint/slot
    /// disagreement is repaired and reported as an error.
    pub fn try_drain(&self) -> Result<Option<Order>, &'static str> {
        let mut slot = self.slot.lock();
        match slot.take() {
            Some(order) => {
                self.occupied.store(false, Ordering::Release);
                Ok(Some(order))
            }
            None if self.occupied.load(Ordering::Acquire) => {
                self.occupied.store(false, Ordering::Release);
                Err(DESYNC)
            }
            None => Ok(None),
        }
    }

    /// Id of the stored order, read under the guard.
    pub fn peek_id(&self) -> Option<i64> {
        self.slot.lock().as_ref().map(Order::id)
    }

    /// Number of orders ever stored in this cell.
    #[inline]
    pub fn fills(&self) -> u64 {
        self.fills.load(Ordering::Relaxed)
    }

    /// Set the hint without touching the slot.
    #[cfg(test)]
    pub(crate) fn force_hint(&self, full: bool) {
        let _guard = self.slot.lock();
        self.occupied.store(full, Ordering::Release);
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("occupied", &self.looks_full())
            .field("fills", &self.fills())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn order(id: i64) -> Order {
        Order::new(id, 5000 + id, 1, Decimal::new(2000, 2))
    }

    #[test]
    fn test_cell_alignment() {
        assert_eq!(std::mem::align_of::<Cell>(), 64);
    }

    #[test]
    fn test_fill_then_drain() {
        let cell = Cell::new();
        assert!(cell.looks_empty());

        cell.try_fill(order(1)).expect("empty cell accepts");
        assert!(cell.looks_full());
        assert_eq!(cell.peek_id(), Some(1));
        assert_eq!(cell.fills(), 1);

        let drained = cell.try_drain().unwrap();
        assert_eq!(drained, Some(order(1)));
        assert!(cell.looks_empty());
        assert_eq!(cell.peek_id(), None);
    }

    #[test]
    fn test_full_cell_is_not_overwritten() {
        let cell = Cell::new();
        cell.try_fill(order(1)).unwrap();

        let rejected = cell.try_fill(order(2)).unwrap_err();
        assert_eq!(rejected.id(), 2);
        assert_eq!(cell.peek_id(), Some(1));
        assert_eq!(cell.fills(), 1);
    }

    #[test]
    fn test_drain_empty_cell() {
        let cell = Cell::new();
        assert_eq!(cell.try_drain(), Ok(None));
    }

    #[test]
    fn test_desync_is_reported_and_repaired() {
        let cell = Cell::new();
        cell.force_hint(true);
        assert!(cell.looks_full());

        assert_eq!(cell.try_drain(), Err(DESYNC));
        assert!(cell.looks_empty());
        assert_eq!(cell.try_drain(), Ok(None));
    }
}
