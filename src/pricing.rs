//! Pricing models used by structures each cycle.
//!
//! All amounts are `Decimal` with two places:
//! - unit price per space: 10.00 – 40.00
//! - tax multiplier: 1.08 – 1.12
//! - location fee per space: 2.00 – 8.00

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// One cycle's prices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quote {
    pub unit_price: Decimal,
    /// Multiplier applied to the pre-tax total (1.10 = 10% tax)
    pub tax: Decimal,
    pub location_fee: Decimal,
}

impl Quote {
    pub fn new(unit_price: Decimal, tax: Decimal, location_fee: Decimal) -> Self {
        Self {
            unit_price,
            tax,
            location_fee,
        }
    }
}

/// Source of per-cycle quotes.
pub trait PricingModel: Send {
    fn quote(&mut self) -> Quote;
}

/// Draws every quote independently of the previous one.
#[derive(Debug)]
pub struct RandomPricing<R = StdRng> {
    rng: R,
}

impl RandomPricing<StdRng> {
    /// Seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPricing<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomPricing<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> PricingModel for RandomPricing<R> {
    fn quote(&mut self) -> Quote {
        // Offsets are drawn in hundredths so every amount is already rounded.
        let tax = Decimal::new(110 + self.rng.gen_range(-2..=2), 2);
        let location_fee = Decimal::new(500 + self.rng.gen_range(-300..=300), 2);
        let unit_price = Decimal::new(2500 + self.rng.gen_range(-1500..=1500), 2);
        Quote {
            unit_price,
            tax,
            location_fee,
        }
    }
}

/// Replays a fixed list of quotes, wrapping around at the end.
#[derive(Clone, Debug)]
pub struct ScriptedPricing {
    quotes: Vec<Quote>,
    next: usize,
}

impl ScriptedPricing {
    /// # Panics
    /// Panics if `quotes` is empty.
    pub fn new(quotes: Vec<Quote>) -> Self {
        assert!(!quotes.is_empty(), "scripted pricing needs at least one quote");
        Self { quotes, next: 0 }
    }

    /// Quotes with the given unit prices, 1.10 tax and a 5.00 location fee.
    pub fn from_prices(prices: &[Decimal]) -> Self {
        Self::new(
            prices
                .iter()
                .map(|&p| Quote::new(p, Decimal::new(110, 2), Decimal::new(500, 2)))
                .collect(),
        )
    }
}

impl PricingModel for ScriptedPricing {
    fn quote(&mut self) -> Quote {
        let quote = self.quotes[self.next];
        self.next = (self.next + 1) % self.quotes.len();
        quote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_quotes_within_ranges() {
        let mut pricing = RandomPricing::seeded(7);
        for _ in 0..1000 {
            let q = pricing.quote();
            assert!(q.unit_price >= Decimal::new(1000, 2) && q.unit_price <= Decimal::new(4000, 2));
            assert!(q.tax >= Decimal::new(108, 2) && q.tax <= Decimal::new(112, 2));
            assert!(q.location_fee >= Decimal::new(200, 2) && q.location_fee <= Decimal::new(800, 2));
            assert!(q.unit_price.scale() <= 2);
        }
    }

    #[test]
    fn test_seeded_pricing_is_reproducible() {
        let mut a = RandomPricing::seeded(42);
        let mut b = RandomPricing::seeded(42);
        for _ in 0..50 {
            assert_eq!(a.quote(), b.quote());
        }
    }

    #[test]
    fn test_scripted_pricing_wraps() {
        let mut pricing = ScriptedPricing::from_prices(&[Decimal::new(3000, 2), Decimal::new(2000, 2)]);
        assert_eq!(pricing.quote().unit_price, Decimal::new(3000, 2));
        assert_eq!(pricing.quote().unit_price, Decimal::new(2000, 2));
        assert_eq!(pricing.quote().unit_price, Decimal::new(3000, 2));
    }
}
