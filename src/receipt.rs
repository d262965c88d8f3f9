//! Order processing: receipts and where they go.
//!
//! A structure turns every extracted order into a [`Receipt`] on its own
//! thread and hands it to a [`ReceiptSink`]. Sinks are fire-and-forget;
//! a sink that fails logs and drops the receipt.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

use crate::order::Order;
use crate::pricing::Quote;

/// Card numbers accepted by the processor.
pub const CARD_RANGE: std::ops::RangeInclusive<i64> = 4000..=8000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Charged,
    CardDeclined,
}

/// Outcome of processing one order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Receipt {
    pub order_id: i64,
    pub card_number: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub location_fee: Decimal,
    /// Tax multiplier (1.10 = 10%)
    pub tax: Decimal,
    /// `(unit_price + location_fee) × quantity × tax`, two places; zero if declined
    pub total: Decimal,
    pub status: ReceiptStatus,
    pub structure: String,
    pub processed_at: DateTime<Utc>,
}

impl Receipt {
    /// Check the card and compute the charge for `order` at `quote`'s fees.
    pub fn charge(order: &Order, quote: &Quote, structure: &str) -> Self {
        let (status, total) = if CARD_RANGE.contains(&order.card_number()) {
            let per_space = order.unit_price() + quote.location_fee;
            let total = (per_space * Decimal::from(order.quantity()) * quote.tax).round_dp(2);
            (ReceiptStatus::Charged, total)
        } else {
            (ReceiptStatus::CardDeclined, Decimal::ZERO)
        };

        Self {
            order_id: order.id(),
            card_number: order.card_number(),
            quantity: order.quantity(),
            unit_price: order.unit_price(),
            location_fee: quote.location_fee,
            tax: quote.tax,
            total,
            status,
            structure: structure.to_owned(),
            processed_at: Utc::now(),
        }
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Order received by {}", self.structure)?;
        writeln!(f, "---------------------------------------------------------")?;
        writeln!(f, "Order ID:                     {}", self.order_id)?;
        writeln!(f, "Card #:                       {}", self.card_number)?;
        writeln!(f, "Quantity:                     {}", self.quantity)?;
        writeln!(f, "Unit Price / Parking Space:   {:.2}", self.unit_price)?;
        match self.status {
            ReceiptStatus::Charged => write!(f, "Total Price:                  {:.2}", self.total),
            ReceiptStatus::CardDeclined => write!(f, "Card declined"),
        }
    }
}

/// Destination for receipts. Called from handling threads.
pub trait ReceiptSink: Send + Sync {
    fn deliver(&self, receipt: Receipt);
}

/// Writes each receipt to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReceiptSink for LogSink {
    fn deliver(&self, receipt: Receipt) {
        info!(
            structure = %receipt.structure,
            order_id = receipt.order_id,
            status = ?receipt.status,
            total = %receipt.total,
            "\n{receipt}"
        );
    }
}

/// Appends receipts as CSV rows.
pub struct CsvSink<W: Write> {
    writer: Mutex<csv::Writer<W>>,
}

impl CsvSink<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        Ok(Self::new(csv::Writer::from_path(path)?))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: csv::Writer<W>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, csv::IntoInnerError<csv::Writer<W>>> {
        self.writer.into_inner().into_inner()
    }
}

impl<W: Write + Send> ReceiptSink for CsvSink<W> {
    fn deliver(&self, receipt: Receipt) {
        let mut writer = self.writer.lock();
        if let Err(err) = writer.serialize(&receipt) {
            warn!(order_id = receipt.order_id, error = %err, "receipt not written");
        }
    }
}

/// Keeps receipts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    receipts: Mutex<Vec<Receipt>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.receipts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.lock().is_empty()
    }
}

impl ReceiptSink for MemorySink {
    fn deliver(&self, receipt: Receipt) {
        self.receipts.lock().push(receipt);
    }
}

/// Counts receipts by status without keeping them. Suited to runs with
/// no end.
#[derive(Debug, Default)]
pub struct CountingSink {
    charged: AtomicU64,
    declined: AtomicU64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charged(&self) -> u64 {
        self.charged.load(Ordering::Relaxed)
    }

    pub fn declined(&self) -> u64 {
        self.declined.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.charged() + self.declined()
    }
}

impl ReceiptSink for CountingSink {
    fn deliver(&self, receipt: Receipt) {
        let counter = match receipt.status {
            ReceiptStatus::Charged => &self.charged,
            ReceiptStatus::CardDeclined => &self.declined,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
