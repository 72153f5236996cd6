//! # Minter
//!
//! Epoch clock for OTOKEN emissions.
//!
//! ```text
//! Uninitialized ──initialize()──► Active { active_period }
//! ```
//!
//! Once active, `update_period` mints one epoch's emission to the voter each
//! time an epoch boundary has passed, advancing `active_period` by exactly one
//! epoch so boundaries stay aligned to the week. Emission decays by
//! `emission_decay_bps` every epoch and never drops below `tail_emission`.

use crate::config::EmissionConfig;
use crate::constants::DIVISOR;
use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::math::mul_div;
use crate::otoken::OToken;
use crate::types::{Address, Timestamp};
use crate::voter::Voter;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Lifecycle of the minter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MinterState {
    Uninitialized,
    Active { active_period: Timestamp },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Minter {
    address: Address,
    voter: Address,
    initializer: Address,
    state: MinterState,
    epoch_length: u64,
    weekly_emission: u128,
    emission_decay_bps: u128,
    tail_emission: u128,
    total_minted: u128,
}

impl Minter {
    pub fn new(address: Address, voter: Address, initializer: Address, config: &EmissionConfig) -> Self {
        Self {
            address,
            voter,
            initializer,
            state: MinterState::Uninitialized,
            epoch_length: config.epoch_length,
            weekly_emission: config.weekly_emission,
            emission_decay_bps: u128::from(config.emission_decay_bps),
            tail_emission: config.tail_emission,
            total_minted: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> MinterState {
        self.state
    }

    pub fn active_period(&self) -> Option<Timestamp> {
        match self.state {
            MinterState::Active { active_period } => Some(active_period),
            MinterState::Uninitialized => None,
        }
    }

    /// Emission the next epoch will mint
    pub fn weekly_emission(&self) -> u128 {
        self.weekly_emission
    }

    pub fn total_minted(&self) -> u128 {
        self.total_minted
    }

    pub fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    /// Start the epoch clock. Only the initializer, only once.
    pub fn initialize(&mut self, caller: &Address, now: Timestamp) -> Result<()> {
        if self.state != MinterState::Uninitialized || *caller != self.initializer {
            return Err(MinterError::UnauthorizedInitializer.into());
        }
        let active_period = now / self.epoch_length * self.epoch_length;
        self.state = MinterState::Active { active_period };
        info!(active_period, "minter initialized");
        Ok(())
    }

    /// Mint and forward the epoch's emission if a boundary has passed.
    ///
    /// Returns the amount minted, zero before the boundary.
    pub fn update_period(
        &mut self,
        bank: &mut Bank,
        otoken: &OToken,
        voter: &mut Voter,
        now: Timestamp,
    ) -> Result<u128> {
        let MinterState::Active { active_period } = self.state else {
            return Err(MinterError::NotInitialized.into());
        };
        if now < active_period + self.epoch_length {
            return Ok(0);
        }

        let next_period = active_period + self.epoch_length;
        let emission = self.weekly_emission;
        self.state = MinterState::Active {
            active_period: next_period,
        };
        let decayed = mul_div(emission, DIVISOR - self.emission_decay_bps, DIVISOR)?;
        self.weekly_emission = decayed.max(self.tail_emission);
        self.total_minted = self.total_minted.saturating_add(emission);

        otoken.mint(bank, &self.address, &self.voter, emission)?;
        voter.notify_reward_amount(&self.address, emission)?;
        info!(active_period = next_period, emission, "epoch rolled over");
        Ok(emission)
    }
}

/// Minter errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MinterError {
    #[error("Minter: unauthorized initializer")]
    UnauthorizedInitializer,

    #[error("Minter: not initialized")]
    NotInitialized,
}

impl MinterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnauthorizedInitializer => ErrorKind::Authorization,
            Self::NotInitialized => ErrorKind::StateMachine,
        }
    }
}
