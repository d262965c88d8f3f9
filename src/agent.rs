//! Parking Agent - the producer role.
//!
//! An agent sleeps on its price subscription. Each notification updates the
//! price it last saw; if its budget covers the spaces it wants at that
//! price it submits an order to the buffer. A terminal notification ends
//! the loop after the current wait cycle; no order is submitted after it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::buffer::MultiCellBuffer;
use crate::notify::{Notification, Subscription};
use crate::order::Order;

/// What an agent did with one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// An order was built and offered to the buffer.
    Submitted { order_id: i64, placed: bool },
    /// The price was above budget.
    Rejected,
    /// The notification was terminal.
    Terminate,
}

/// Counters returned when an agent exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentReport {
    pub name: String,
    /// Orders accepted by the buffer
    pub placed: u64,
    /// Orders the buffer had no room for
    pub dropped: u64,
    /// Notifications rejected on budget
    pub rejected: u64,
    /// Wait cycles that ended without a notification
    pub idle_waits: u64,
}

pub struct ParkingAgent {
    name: String,
    buffer: Arc<MultiCellBuffer>,
    subscription: Subscription,
    wait: Duration,
    next_order_id: i64,
    /// Last price received; -1 until the first notification
    received_price: Decimal,
    budget: Decimal,
    desired_spaces: i32,
    terminated: bool,
    rng: StdRng,
    report: AgentReport,
}

impl ParkingAgent {
    /// Create an agent with a random budget (30.00 – 100.00) and a random
    /// number of desired spaces (1 – 2).
    pub fn new(
        name: impl Into<String>,
        buffer: Arc<MultiCellBuffer>,
        subscription: Subscription,
        wait: Duration,
    ) -> Self {
        let mut rng = StdRng::from_entropy();
        let budget = Decimal::new(rng.gen_range(3000..=10000), 2);
        let desired_spaces = rng.gen_range(1..=2);
        let name = name.into();
        Self {
            report: AgentReport {
                name: name.clone(),
                ..AgentReport::default()
            },
            name,
            buffer,
            subscription,
            wait,
            next_order_id: 0,
            received_price: Decimal::NEGATIVE_ONE,
            budget,
            desired_spaces,
            terminated: false,
            rng,
        }
    }

    /// Fix the budget and desired spaces.
    pub fn with_budget(mut self, budget: Decimal, desired_spaces: i32) -> Self {
        self.budget = budget;
        self.desired_spaces = desired_spaces;
        self
    }

    /// Use a seeded RNG for card numbers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// React to one notification.
    pub fn handle(&mut self, notification: Notification) -> Decision {
        self.received_price = notification.price;
        self.terminated |= notification.terminate;
        if self.terminated {
            return Decision::Terminate;
        }

        // The -1 sentinel (or any negative price) is never ordered at.
        if self.received_price.is_sign_negative() {
            debug!(agent = %self.name, price = %self.received_price, "ignoring sentinel price");
            return Decision::Rejected;
        }

        if self.budget < self.received_price * Decimal::from(self.desired_spaces) {
            self.report.rejected += 1;
            info!(agent = %self.name, price = %self.received_price, "rejected the price drop");
            return Decision::Rejected;
        }

        let order = self.generate_order();
        let order_id = order.id();
        let placed = self.buffer.put(order);
        if placed {
            self.report.placed += 1;
        } else {
            self.report.dropped += 1;
        }
        debug!(agent = %self.name, order_id, placed, "order submitted");
        Decision::Submitted { order_id, placed }
    }

    fn generate_order(&mut self) -> Order {
        let id = self.next_order_id;
        self.next_order_id += 1;
        let card_number = self.rng.gen_range(5000..7000);
        Order::new(id, card_number, self.desired_spaces, self.received_price)
    }

    /// Wait for notifications until a terminal one arrives.
    pub fn run(mut self) -> AgentReport {
        info!(
            agent = %self.name,
            budget = %self.budget,
            spaces = self.desired_spaces,
            "agent started"
        );

        while !self.terminated {
            match self.subscription.wait(self.wait) {
                Some(notification) => {
                    if notification.price != Notification::TERMINAL_PRICE {
                        info!(agent = %self.name, price = %notification.price, "price dropped");
                    }
                    self.handle(notification);
                }
                None => {
                    self.report.idle_waits += 1;
                    debug!(agent = %self.name, "waiting for a price drop");
                }
            }
        }

        info!(agent = %self.name, "signaled to terminate, exiting");
        self.report
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn received_price(&self) -> Decimal {
        self.received_price
    }

    pub fn budget(&self) -> Decimal {
        self.budget
    }

    pub fn desired_spaces(&self) -> i32 {
        self.desired_spaces
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
