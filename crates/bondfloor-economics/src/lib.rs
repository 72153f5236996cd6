//! # Bondfloor Economics - ve(3,3) Bonding-Curve State Machine
//!
//! Off-chain, bit-exact model of the Bondfloor protocol: a bonding-curve
//! TOKEN backed by a BASE reserve, an option token (OTOKEN) exercisable at
//! the floor price, a vote-escrow (VTOKEN) whose holders direct weekly
//! OTOKEN emissions to yield-source plugins, and the gauge/bribe reward
//! streams that pay depositors and voters.
//!
//! ## Value Flow
//!
//! ```text
//!   BASE ──buy──► TOKEN ──deposit──► VTOKEN ──vote──► Voter
//!     ▲             │                  │                │
//!     │           sell/redeem        rewarder       distro (weekly)
//!     │             ▼                  ▲                ▼
//!   floor ◄──fees── Market ──fees──► Fees          Gauge ──► plugin depositors
//!                                                   Bribe ──► voters
//! ```
//!
//! ## Reserve Model
//!
//! | Reserve | Meaning |
//! |---------|---------|
//! | `fr_base` | Floor reserve; backs TOKEN at 1 BASE, grows from fees and exercises, shrinks only on redeem |
//! | `mrv_base` | Virtual base reserve; fixes the curve's opening price at the floor |
//! | `mrr_base` | Real base in the curve |
//! | `mrr_token` | TOKEN held by the curve |
//!
//! Every public operation on [`Protocol`] is a single transaction: it either
//! applies completely or leaves every ledger untouched.

pub mod bribe;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod fees;
pub mod gauge;
pub mod ledger;
pub mod market;
pub mod math;
pub mod minter;
pub mod oracle;
pub mod otoken;
pub mod plugin;
pub mod protocol;
pub mod rewarder;
pub mod rewards;
pub mod types;
pub mod views;
pub mod voter;
pub mod vtoken;

// Re-exports
pub use chain::Chain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProtocolConfig;
pub use error::{Error, ErrorKind, Result};
pub use market::{Market, MarketError};
pub use oracle::{FixedPriceOracle, PriceOracle};
pub use plugin::{Plugin, PluginKind};
pub use protocol::{Protocol, ProtocolAddresses};
pub use types::{Address, Asset, Timestamp};

/// Protocol-wide constants
pub mod constants {
    /// Decimal places of every asset in the model
    pub const DECIMALS: u8 = 18;

    /// One whole token in base units
    pub const ONE: u128 = 1_000_000_000_000_000_000; // 10^18

    /// Fixed-point scale of prices and reward-per-token values
    pub const PRECISION: u128 = ONE;

    /// Basis-point denominator
    pub const DIVISOR: u128 = 10_000;

    /// One week in seconds
    pub const WEEK: u64 = 7 * 24 * 3600;

    /// Default reward streaming window
    pub const REWARD_DURATION: u64 = WEEK;

    /// Default TOKEN supply seeded into the curve
    pub const DEFAULT_INITIAL_SUPPLY: u128 = 1_000_000 * ONE;

    /// TOKEN redeems for exactly one BASE against the floor
    pub const FLOOR_PRICE: u128 = ONE;
}

pub use constants::*;
