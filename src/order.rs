//! Order - the unit of work handed from agents to structures.
//!
//! An order is built by an agent right before submission, moves into the
//! buffer on a successful `put`, moves out to a structure on `take`, and is
//! dropped once its receipt has been delivered.

use rust_decimal::Decimal;
use std::fmt;

/// Sentinel for numeric fields that were never set.
pub const UNSET: i64 = -1;

/// A request for a block of parking spaces.
///
/// Fields are private: an order does not change after construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Order {
    /// Agent-local, monotonically assigned identifier
    id: i64,
    /// Payment reference (card number)
    card_number: i64,
    /// Number of parking spaces requested
    quantity: i32,
    /// Price per space the agent saw when ordering
    unit_price: Decimal,
}

impl Order {
    /// Create a fully populated order.
    #[inline]
    pub fn new(id: i64, card_number: i64, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id,
            card_number,
            quantity,
            unit_price,
        }
    }

    /// An order with every numeric field at the `-1` sentinel.
    #[inline]
    pub fn unset() -> Self {
        Self {
            id: UNSET,
            card_number: UNSET,
            quantity: UNSET as i32,
            unit_price: Decimal::NEGATIVE_ONE,
        }
    }

    /// Returns true once every field holds a real value.
    pub fn is_set(&self) -> bool {
        self.id != UNSET
            && self.card_number != UNSET
            && self.quantity != UNSET as i32
            && self.unit_price != Decimal::NEGATIVE_ONE
    }

    #[inline]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[inline]
    pub fn card_number(&self) -> i64 {
        self.card_number
    }

    #[inline]
    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    #[inline]
    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("id", &self.id)
            .field("card_number", &self.card_number)
            .field("quantity", &self.quantity)
            .field("unit_price", &self.unit_price)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_sentinel() {
        let order = Order::unset();
        assert_eq!(order.id(), -1);
        assert_eq!(order.card_number(), -1);
        assert_eq!(order.quantity(), -1);
        assert_eq!(order.unit_price(), Decimal::NEGATIVE_ONE);
        assert!(!order.is_set());
        assert_eq!(Order::default(), order);
    }

    #[test]
    fn test_new_order() {
        let order = Order::new(7, 5123, 2, Decimal::new(2499, 2));
        assert_eq!(order.id(), 7);
        assert_eq!(order.card_number(), 5123);
        assert_eq!(order.quantity(), 2);
        assert_eq!(order.unit_price(), Decimal::new(2499, 2));
        assert!(order.is_set());
    }
}
