//! Protocol configuration types
//!
//! Every field has a serde default, so a config file only needs the values
//! it overrides:
//!
//! ```toml
//! [market]
//! initial_supply = "1000"
//! swap_fee_bps = 100
//!
//! [emission]
//! weekly_emission = "50000"
//! ```

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete protocol configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Bonding-curve market parameters
    #[serde(default)]
    pub market: MarketConfig,

    /// Reward streaming parameters (rewarder, gauges, bribes)
    #[serde(default)]
    pub rewards: RewardsConfig,

    /// Minter emission schedule
    #[serde(default)]
    pub emission: EmissionConfig,

    /// Vote-escrow parameters
    #[serde(default)]
    pub vtoken: VTokenConfig,
}

impl ProtocolConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Reject parameter combinations the accounting cannot honour
    pub fn validate(&self) -> Result<()> {
        let m = &self.market;
        if m.initial_supply == 0 {
            return Err(Error::InvalidConfig("market.initial_supply must be positive".into()));
        }
        if u128::from(m.swap_fee_bps) >= DIVISOR {
            return Err(Error::InvalidConfig("market.swap_fee_bps must be below 10000".into()));
        }
        if u128::from(m.provider_fee_bps) > DIVISOR || u128::from(m.floor_fee_bps) > DIVISOR {
            return Err(Error::InvalidConfig("fee shares must not exceed 10000 bps".into()));
        }
        if self.rewards.duration == 0 {
            return Err(Error::InvalidConfig("rewards.duration must be positive".into()));
        }
        if self.emission.epoch_length == 0 {
            return Err(Error::InvalidConfig("emission.epoch_length must be positive".into()));
        }
        if u128::from(self.emission.emission_decay_bps) > DIVISOR {
            return Err(Error::InvalidConfig("emission.emission_decay_bps must not exceed 10000".into()));
        }
        if self.vtoken.burn_power_multiplier == 0 {
            return Err(Error::InvalidConfig("vtoken.burn_power_multiplier must be positive".into()));
        }
        Ok(())
    }
}

/// Bonding-curve market parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// TOKEN minted into the curve at construction; also the virtual base reserve
    #[serde(with = "crate::math::units", default = "default_initial_supply")]
    pub initial_supply: u128,

    /// Swap fee charged on every buy and sell, in bps of the input
    #[serde(default = "default_swap_fee_bps")]
    pub swap_fee_bps: u64,

    /// Share of the fee paid to the referrer when one is given, in bps
    #[serde(default = "default_provider_fee_bps")]
    pub provider_fee_bps: u64,

    /// Share of the remaining fee captured by the floor, in bps
    #[serde(default = "default_floor_fee_bps")]
    pub floor_fee_bps: u64,

    /// OTOKEN minted to the deployer at construction
    #[serde(with = "crate::math::units", default = "default_otoken_initial_supply")]
    pub otoken_initial_supply: u128,
}

fn default_initial_supply() -> u128 {
    DEFAULT_INITIAL_SUPPLY
}

fn default_swap_fee_bps() -> u64 {
    100
}

fn default_provider_fee_bps() -> u64 {
    2_000
}

fn default_floor_fee_bps() -> u64 {
    5_000
}

fn default_otoken_initial_supply() -> u128 {
    1_000 * ONE
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_supply: default_initial_supply(),
            swap_fee_bps: default_swap_fee_bps(),
            provider_fee_bps: default_provider_fee_bps(),
            floor_fee_bps: default_floor_fee_bps(),
            otoken_initial_supply: default_otoken_initial_supply(),
        }
    }
}

/// Reward streaming parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Streaming window for every notified reward, in seconds
    #[serde(default = "default_duration")]
    pub duration: u64,
}

fn default_duration() -> u64 {
    REWARD_DURATION
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
        }
    }
}

/// Minter emission schedule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionConfig {
    /// Epoch length in seconds
    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,

    /// OTOKEN minted in the first epoch
    #[serde(with = "crate::math::units", default = "default_weekly_emission")]
    pub weekly_emission: u128,

    /// Per-epoch decay of the emission, in bps
    #[serde(default = "default_emission_decay_bps")]
    pub emission_decay_bps: u64,

    /// Emission never decays below this amount
    #[serde(with = "crate::math::units", default = "default_tail_emission")]
    pub tail_emission: u128,
}

fn default_epoch_length() -> u64 {
    WEEK
}

fn default_weekly_emission() -> u128 {
    100_000 * ONE
}

fn default_emission_decay_bps() -> u64 {
    100
}

fn default_tail_emission() -> u128 {
    10_000 * ONE
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            epoch_length: default_epoch_length(),
            weekly_emission: default_weekly_emission(),
            emission_decay_bps: default_emission_decay_bps(),
            tail_emission: default_tail_emission(),
        }
    }
}

/// Vote-escrow parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTokenConfig {
    /// Voting power credited per OTOKEN burned through `burn_for`
    #[serde(default = "default_burn_power_multiplier")]
    pub burn_power_multiplier: u64,
}

fn default_burn_power_multiplier() -> u64 {
    1
}

impl Default for VTokenConfig {
    fn default() -> Self {
        Self {
            burn_power_multiplier: default_burn_power_multiplier(),
        }
    }
}
