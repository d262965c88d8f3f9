//! # Multicell Exchange
//!
//! A bounded multi-cell handoff buffer connecting parking agents (order
//! producers) to parking structures (order processors), driven by
//! price-drop notifications.
//!
//! ## Design Principles
//!
//! - **Gate + Per-Cell Guards**: A counting gate admits at most N threads;
//!   each of the N cells has its own lock, so different cells are used in parallel
//! - **No Queue**: Cells are picked by scan position, never by arrival order
//! - **Bounded Retries**: Every `put`/`take` gives up after a fixed number of attempts
//! - **No Leaked Permits**: Gate permits are RAII values released on every exit path
//! - **Last Value Wins**: Agents only ever see the most recent price
//!
//! ## Architecture
//!
//! ```text
//! [Agents] --put--> [MultiCellBuffer: Gate(N) + Cell x N] --take--> [Structures]
//!     ^                                                                   |
//!     +------------------------ [PriceBoard] <-------- price drops -------+
//! ```

pub mod order;
pub mod cell;
pub mod gate;
pub mod backoff;
pub mod config;
pub mod error;
pub mod buffer;
pub mod notify;
pub mod pricing;
pub mod receipt;
pub mod agent;
pub mod structure;
pub mod simulation;

// Re-exports for convenience
pub use order::Order;
pub use cell::Cell;
pub use gate::{Gate, Permit};
pub use backoff::BackoffPolicy;
pub use config::{BufferConfig, ScanOrder, SimulationConfig, MAX_CELLS};
pub use error::{BufferError, ConfigError, PutError, SimulationError};
pub use buffer::{BufferStats, MultiCellBuffer};
pub use notify::{Notification, PriceBoard, Publisher, Subscription};
pub use pricing::{PricingModel, Quote, RandomPricing, ScriptedPricing};
pub use receipt::{CountingSink, CsvSink, LogSink, MemorySink, Receipt, ReceiptSink, ReceiptStatus};
pub use agent::{AgentReport, Decision, ParkingAgent};
pub use structure::{CycleOutcome, ParkingStructure, StructureReport};
pub use simulation::{Simulation, SimulationReport};
