//! Parking Structure - the consumer role.
//!
//! Each cycle a structure:
//! 1. PRICE: draws a quote; a lower unit price than last cycle is a price
//!    drop and is broadcast to every agent
//! 2. TAKE: pulls at most one order from the buffer
//! 3. DISPATCH: processes the order on its own thread (not awaited)
//!
//! Only drops count toward the bound. Once reached, the structure closes
//! its publisher, which sends the terminal notification when it is the
//! last structure standing.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::buffer::MultiCellBuffer;
use crate::notify::Publisher;
use crate::order::Order;
use crate::pricing::{PricingModel, Quote};
use crate::receipt::{Receipt, ReceiptSink};

/// Price the first quote is compared against.
pub const OPENING_PRICE: Decimal = Decimal::ONE_THOUSAND;

/// What happened in one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleOutcome {
    pub quote: Quote,
    /// The quote was a price drop and was broadcast
    pub dropped: bool,
    /// Id of the order taken this cycle
    pub taken: Option<i64>,
}

/// Counters returned when a structure exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureReport {
    pub name: String,
    pub cycles: u64,
    pub price_drops: u32,
    pub orders_taken: u64,
    pub empty_takes: u64,
    /// Order handling threads that panicked
    pub handler_panics: u64,
}

pub struct ParkingStructure {
    name: String,
    buffer: Arc<MultiCellBuffer>,
    publisher: Publisher,
    pricing: Box<dyn PricingModel>,
    sink: Arc<dyn ReceiptSink>,
    price_drops: u32,
    cycle_interval: Duration,
    previous_price: Decimal,
    core: Option<core_affinity::CoreId>,
    handlers: Vec<JoinHandle<()>>,
    report: StructureReport,
}

impl ParkingStructure {
    /// Create a structure with the default bound (20 drops) and a 1 s cycle.
    pub fn new(
        name: impl Into<String>,
        buffer: Arc<MultiCellBuffer>,
        publisher: Publisher,
        pricing: impl PricingModel + 'static,
        sink: Arc<dyn ReceiptSink>,
    ) -> Self {
        let name = name.into();
        Self {
            report: StructureReport {
                name: name.clone(),
                ..StructureReport::default()
            },
            name,
            buffer,
            publisher,
            pricing: Box::new(pricing),
            sink,
            price_drops: 20,
            cycle_interval: Duration::from_secs(1),
            previous_price: OPENING_PRICE,
            core: None,
            handlers: Vec::new(),
        }
    }

    pub fn with_price_drops(mut self, price_drops: u32) -> Self {
        self.price_drops = price_drops;
        self
    }

    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Pin the structure thread to `core` when it runs.
    pub fn pinned_to(mut self, core: core_affinity::CoreId) -> Self {
        self.core = Some(core);
        self
    }

    /// Run one price/take cycle.
    pub fn cycle(&mut self) -> CycleOutcome {
        if !self.cycle_interval.is_zero() {
            thread::sleep(self.cycle_interval);
        }
        self.report.cycles += 1;

        let quote = self.pricing.quote();
        let dropped = quote.unit_price < self.previous_price;
        self.previous_price = quote.unit_price;

        if dropped {
            self.report.price_drops += 1;
            let reached = self.publisher.broadcast(quote.unit_price);
            info!(
                structure = %self.name,
                price = %quote.unit_price,
                drop = self.report.price_drops,
                agents = reached,
                "price drop announced"
            );
        }

        let taken = match self.buffer.take() {
            Some(order) => {
                self.report.orders_taken += 1;
                let id = order.id();
                self.dispatch(order, quote);
                Some(id)
            }
            None => {
                self.report.empty_takes += 1;
                debug!(structure = %self.name, "no order retrieved from the buffer");
                None
            }
        };

        self.reap_handlers();
        CycleOutcome {
            quote,
            dropped,
            taken,
        }
    }

    /// Join handlers that already finished, reporting any that panicked.
    fn reap_handlers(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.handlers.drain(..).partition(|h| h.is_finished());
        self.handlers = running;
        for handle in finished {
            if handle.join().is_err() {
                self.report.handler_panics += 1;
                warn!(structure = %self.name, "order handler panicked");
            }
        }
    }

    /// Process `order` on its own thread.
    fn dispatch(&mut self, order: Order, quote: Quote) {
        let sink = self.sink.clone();
        let structure = self.name.clone();
        let fallback = order.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}::order-{}", self.name, order.id()))
            .spawn(move || {
                sink.deliver(Receipt::charge(&order, &quote, &structure));
            });

        match spawned {
            Ok(handle) => self.handlers.push(handle),
            Err(err) => {
                // No thread available: process in place rather than lose it.
                warn!(structure = %self.name, error = %err, "order handler not spawned");
                self.sink.deliver(Receipt::charge(&fallback, &quote, &self.name));
            }
        }
    }

    /// Cycle until the drop bound is reached, then close the publisher and
    /// wait for outstanding order handlers.
    pub fn run(mut self) -> StructureReport {
        if let Some(core) = self.core {
            if !core_affinity::set_for_current(core) {
                warn!(structure = %self.name, core = core.id, "could not pin thread");
            }
        }
        info!(structure = %self.name, bound = self.price_drops, "structure started");

        while self.report.price_drops < self.price_drops {
            self.cycle();
        }

        info!(
            structure = %self.name,
            drops = self.report.price_drops,
            "price drop bound reached, signaling agents"
        );
        let Self {
            name,
            publisher,
            handlers,
            mut report,
            ..
        } = self;
        publisher.close();

        for handle in handlers {
            if handle.join().is_err() {
                report.handler_panics += 1;
                warn!(structure = %name, "order handler panicked");
            }
        }
        info!(structure = %name, "structure exiting");
        report
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn report(&self) -> &StructureReport {
        &self.report
    }

    /// Wait for every order handler spawned so far.
    pub fn join_handlers(&mut self) {
        for handle in self.handlers.drain(..) {
            if handle.join().is_err() {
                self.report.handler_panics += 1;
                warn!(structure = %self.name, "order handler panicked");
            }
        }
    }
}
