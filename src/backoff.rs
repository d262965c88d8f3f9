//! Backoff policy for gate waits.
//!
//! Attempt `n` waits up to `first × factor^n` for a gate permit, clamped to
//! `max`. A factor of `1.0` gives the fixed per-attempt wait; `2.0` doubles
//! the wait each attempt to spread out retries under heavy contention.

use std::time::Duration;

/// Per-attempt gate wait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Wait for the first attempt.
    pub first: Duration,
    /// Upper bound for any attempt.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` expected).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Fixed 5 s wait per attempt.
    fn default() -> Self {
        Self::constant(Duration::from_millis(5000))
    }
}

impl BackoffPolicy {
    /// Same wait on every attempt.
    pub const fn constant(wait: Duration) -> Self {
        Self {
            first: wait,
            max: wait,
            factor: 1.0,
        }
    }

    /// Doubling wait, capped at `max`.
    pub const fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
        }
    }

    /// Wait for the given attempt (0-indexed). Never panics: a wait that
    /// does not fit in a `Duration` is clamped to `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.factor == 1.0 {
            return self.first.min(self.max);
        }

        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 {
            return self.max;
        }
        Duration::try_from_secs_f64(secs)
            .map(|wait| wait.min(self.max))
            .unwrap_or(self.max)
    }

    /// Sum of the waits over `attempts` attempts: the longest a failing
    /// operation can block on the gate. Saturates at `Duration::MAX`.
    pub fn budget(&self, attempts: u32) -> Duration {
        (0..attempts).fold(Duration::ZERO, |total, a| total.saturating_add(self.next(a)))
    }
}
