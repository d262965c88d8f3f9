//! Error types for the buffer and the configuration layer.
//!
//! Buffer errors never escape `put`/`take`: they are logged and folded into
//! a `bool` or `Option`. The `try_*` variants expose them for callers that
//! want to know why an attempt failed.

use thiserror::Error;

use crate::order::Order;

/// Why a buffer operation did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The admission gate could not be entered in any attempt.
    #[error("admission gate not acquired after {attempts} attempts")]
    GateTimeout { attempts: u32 },

    /// Every scan found all cells full.
    #[error("no empty cell after {attempts} attempts")]
    NoSlotAvailable { attempts: u32 },

    /// Every scan found all cells empty.
    #[error("no full cell after {attempts} attempts")]
    NoOrderAvailable { attempts: u32 },

    /// A cell's occupancy hint disagreed with its slot.
    #[error("cell {cell} fault: {reason}")]
    CellFault { cell: usize, reason: &'static str },
}

impl BufferError {
    /// Short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            BufferError::GateTimeout { .. } => "gate_timeout",
            BufferError::NoSlotAvailable { .. } => "no_slot_available",
            BufferError::NoOrderAvailable { .. } => "no_order_available",
            BufferError::CellFault { .. } => "cell_fault",
        }
    }
}

/// A failed `try_put`. The order is handed back so the caller may retry it.
#[derive(Error, Debug)]
#[error("order {} not placed: {source}", order.id())]
pub struct PutError {
    pub order: Order,
    #[source]
    pub source: BufferError,
}

/// Invalid buffer or simulation configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cell count must be within 1..={max}, got {got}")]
    CellCount { got: usize, max: usize },

    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff max ({max_ms} ms) is shorter than first wait ({first_ms} ms)")]
    BackoffRange { first_ms: u128, max_ms: u128 },

    #[error("{what} must be at least 1")]
    Zero { what: &'static str },
}

/// Failure to set up or finish a simulation run.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("thread {name} panicked")]
    Panicked { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(BufferError::GateTimeout { attempts: 5 }.as_label(), "gate_timeout");
        assert_eq!(BufferError::NoSlotAvailable { attempts: 5 }.as_label(), "no_slot_available");
        assert_eq!(BufferError::NoOrderAvailable { attempts: 5 }.as_label(), "no_order_available");
        assert_eq!(
            BufferError::CellFault { cell: 1, reason: "desync" }.as_label(),
            "cell_fault"
        );
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::CellCount { got: 0, max: 64 };
        assert_eq!(err.to_string(), "cell count must be within 1..=64, got 0");
    }
}
