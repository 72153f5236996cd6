//! External BASE price source.
//!
//! The state machine never prices anything in USD itself. Read views take a
//! [`PriceOracle`] to turn BASE amounts into dollar figures.

use crate::constants::ONE;

/// USD price of one BASE, 18 decimals
pub trait PriceOracle: Send + Sync {
    fn base_price(&self) -> u128;
}

/// Oracle returning a constant price
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPriceOracle {
    price: u128,
}

impl FixedPriceOracle {
    pub fn new(price: u128) -> Self {
        Self { price }
    }
}

impl Default for FixedPriceOracle {
    /// One dollar per BASE
    fn default() -> Self {
        Self { price: ONE }
    }
}

impl PriceOracle for FixedPriceOracle {
    fn base_price(&self) -> u128 {
        self.price
    }
}
