//! Gate - FIFO-fair counting admission gate.
//!
//! Bounds how many threads may work on the buffer at once. Waiters take a
//! ticket and are admitted strictly in ticket order; a waiter whose deadline
//! passes withdraws its ticket. Permits are RAII values returned to the gate
//! on drop, so no exit path (including unwinding) can leak one.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

struct GateState {
    /// Permits not currently held
    available: usize,
    /// Tickets of blocked waiters, oldest first
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// Counting semaphore with bounded waits.
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
    capacity: usize,
}

/// A held gate permit. Released when dropped.
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit<'a> {
    gate: &'a Gate,
}

impl Gate {
    /// Create a gate with `permits` permits, all available.
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                available: permits,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            cond: Condvar::new(),
            capacity: permits,
        }
    }

    /// Take a permit without waiting. Fails if none is free or others are
    /// already queued.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();
        if state.queue.is_empty() && state.available > 0 {
            state.available -= 1;
            return Some(Permit { gate: self });
        }
        None
    }

    /// Wait up to `timeout` for a permit, behind any earlier waiters.
    ///
    /// A timeout too large to express as an `Instant` waits without a deadline.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Permit<'_>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        if state.queue.is_empty() && state.available > 0 {
            state.available -= 1;
            return Some(Permit { gate: self });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        loop {
            if state.available > 0 && state.queue.front() == Some(&ticket) {
                state.queue.pop_front();
                state.available -= 1;
                // Another permit may be free for the next ticket in line.
                if state.available > 0 && !state.queue.is_empty() {
                    self.cond.notify_all();
                }
                return Some(Permit { gate: self });
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                state.queue.retain(|&t| t != ticket);
                if state.available > 0 && !state.queue.is_empty() {
                    self.cond.notify_all();
                }
                return None;
            }

            match deadline {
                Some(d) => {
                    self.cond.wait_until(&mut state, d);
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Threads currently blocked waiting for a permit.
    pub fn waiting(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Total number of permits.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available += 1;
        debug_assert!(state.available <= self.capacity, "permit released twice");
        drop(state);
        self.cond.notify_all();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Gate")
            .field("capacity", &self.capacity)
            .field("available", &state.available)
            .field("waiting", &state.queue.len())
            .finish()
    }
}
