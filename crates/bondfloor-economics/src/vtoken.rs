//! # Vote Escrow
//!
//! VTOKEN is a non-transferable receipt for staked TOKEN. Each account has
//! two balances:
//!
//! - **principal**: TOKEN deposited, withdrawable, counts as borrow collateral
//! - **voting power**: principal plus the bonus from OTOKEN burned through
//!   `burn_for`; the bonus can never be withdrawn
//!
//! Voting power is the account's stake in the rewarder. A withdrawal is
//! refused while the account owes the market anything or has live votes.

use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::math::{checked_add, checked_sub};
use crate::rewarder::Rewarder;
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Obligations that keep an account's principal locked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WithdrawLocks {
    /// Outstanding market debt
    pub debt: u128,
    /// Weight currently allocated through the voter
    pub used_weight: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VToken {
    address: Address,
    owner: Address,
    token: Asset,
    otoken: Asset,
    voter: Option<Address>,
    burn_power_multiplier: u128,
    total_supply: u128,
    balances: HashMap<Address, u128>,
    total_supply_token: u128,
    balance_token: HashMap<Address, u128>,
}

impl VToken {
    pub fn new(
        address: Address,
        owner: Address,
        token: Asset,
        otoken: Asset,
        burn_power_multiplier: u64,
    ) -> Self {
        Self {
            address,
            owner,
            token,
            otoken,
            voter: None,
            burn_power_multiplier: u128::from(burn_power_multiplier),
            total_supply: 0,
            balances: HashMap::new(),
            total_supply_token: 0,
            balance_token: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn voter(&self) -> Option<Address> {
        self.voter
    }

    /// Voting power of `account`
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Staked TOKEN of `account`
    pub fn balance_of_token(&self, account: &Address) -> u128 {
        self.balance_token.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn total_supply_token(&self) -> u128 {
        self.total_supply_token
    }

    /// Principal `account` could withdraw right now
    pub fn max_withdraw(&self, account: &Address, locks: WithdrawLocks) -> u128 {
        if locks.debt > 0 || locks.used_weight > 0 {
            0
        } else {
            self.balance_of_token(account)
        }
    }

    fn only_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.owner {
            return Err(VTokenError::NotOwner(*caller).into());
        }
        Ok(())
    }

    /// Register a rewarder reward token
    pub fn add_reward(&self, rewarder: &mut Rewarder, caller: &Address, asset: Asset) -> Result<()> {
        self.only_owner(caller)?;
        rewarder.add_reward(&self.address, asset)?;
        info!(%asset, "VTOKEN reward added");
        Ok(())
    }

    pub fn set_voter(&mut self, caller: &Address, voter: Address) -> Result<()> {
        self.only_owner(caller)?;
        if voter.is_zero() {
            return Err(VTokenError::InvalidZeroAddress.into());
        }
        self.voter = Some(voter);
        info!(%voter, "VTOKEN voter set");
        Ok(())
    }

    fn credit_power(&mut self, account: &Address, amount: u128) -> Result<()> {
        let power = checked_add(self.balance_of(account), amount)?;
        self.balances.insert(*account, power);
        self.total_supply = checked_add(self.total_supply, amount)?;
        Ok(())
    }

    /// Lock TOKEN for voting power 1:1
    pub fn deposit(
        &mut self,
        bank: &mut Bank,
        rewarder: &mut Rewarder,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VTokenError::InvalidZeroInput.into());
        }
        bank.transfer(self.token, account, &self.address, amount)?;
        let principal = checked_add(self.balance_of_token(account), amount)?;
        self.balance_token.insert(*account, principal);
        self.total_supply_token = checked_add(self.total_supply_token, amount)?;
        self.credit_power(account, amount)?;
        rewarder.deposit(&self.address, account, amount, now)?;
        debug!(%account, amount, principal, "vtoken deposit");
        Ok(())
    }

    /// Unlock principal
    pub fn withdraw(
        &mut self,
        bank: &mut Bank,
        rewarder: &mut Rewarder,
        account: &Address,
        amount: u128,
        locks: WithdrawLocks,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VTokenError::InvalidZeroInput.into());
        }
        if locks.debt > 0 {
            return Err(VTokenError::CollateralActive.into());
        }
        if locks.used_weight > 0 {
            return Err(VTokenError::VotingWeightActive.into());
        }
        let principal = self.balance_of_token(account);
        if amount > principal {
            return Err(VTokenError::InsufficientPrincipal {
                requested: amount,
                available: principal,
            }
            .into());
        }

        self.balance_token.insert(*account, principal - amount);
        self.total_supply_token = checked_sub(self.total_supply_token, amount)?;
        let power = checked_sub(self.balance_of(account), amount)?;
        self.balances.insert(*account, power);
        self.total_supply = checked_sub(self.total_supply, amount)?;
        rewarder.withdraw(&self.address, account, amount, now)?;
        bank.transfer(self.token, &self.address, account, amount)?;
        debug!(%account, amount, "vtoken withdraw");
        Ok(())
    }

    /// Burn `caller`'s OTOKEN to give `account` permanent voting power
    pub fn burn_for(
        &mut self,
        bank: &mut Bank,
        rewarder: &mut Rewarder,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VTokenError::InvalidZeroInput.into());
        }
        if account.is_zero() {
            return Err(VTokenError::InvalidZeroAddress.into());
        }
        let bonus = amount
            .checked_mul(self.burn_power_multiplier)
            .ok_or(crate::error::Error::Overflow)?;
        bank.burn(self.otoken, caller, amount)?;
        self.credit_power(account, bonus)?;
        rewarder.deposit(&self.address, account, bonus, now)?;
        debug!(%caller, %account, burned = amount, bonus, "burn for voting power");
        Ok(())
    }
}

/// VTOKEN errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VTokenError {
    #[error("VTOKEN: invalid zero input")]
    InvalidZeroInput,

    #[error("VTOKEN: invalid zero address")]
    InvalidZeroAddress,

    #[error("VTOKEN: collateral active")]
    CollateralActive,

    #[error("VTOKEN: voting weight active")]
    VotingWeightActive,

    #[error("VTOKEN: withdraw {requested} exceeds principal {available}")]
    InsufficientPrincipal { requested: u128, available: u128 },

    #[error("VTOKEN: {0} is not the owner")]
    NotOwner(Address),
}

impl VTokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidZeroInput | Self::InvalidZeroAddress => ErrorKind::InvalidInput,
            Self::CollateralActive | Self::VotingWeightActive => ErrorKind::StateMachine,
            Self::InsufficientPrincipal { .. } => ErrorKind::EconomicLimit,
            Self::NotOwner(_) => ErrorKind::Authorization,
        }
    }
}
