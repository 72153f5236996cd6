//! Bribe: pays a plugin's voters in proportion to the weight they allocate.
//!
//! Balances are virtual (no tokens are staked); the voter moves them when an
//! account votes or resets. Anyone may fund a registered bribe token.

use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::rewards::RewardStream;
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bribe {
    address: Address,
    plugin: Address,
    voter: Address,
    stream: RewardStream,
}

impl Bribe {
    pub fn new(
        address: Address,
        plugin: Address,
        voter: Address,
        reward_tokens: &[Asset],
        duration: u64,
    ) -> Result<Self> {
        let mut stream = RewardStream::new(address, duration);
        for asset in reward_tokens {
            if !stream.is_reward_token(*asset) {
                stream.add_reward_token(*asset)?;
            }
        }
        Ok(Self {
            address,
            plugin,
            voter,
            stream,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn plugin(&self) -> Address {
        self.plugin
    }

    pub fn stream(&self) -> &RewardStream {
        &self.stream
    }

    fn only_voter(&self, caller: &Address) -> Result<()> {
        if *caller != self.voter {
            return Err(BribeError::NotVoter(*caller).into());
        }
        Ok(())
    }

    pub fn add_reward(&mut self, caller: &Address, asset: Asset) -> Result<()> {
        self.only_voter(caller)?;
        self.stream.add_reward_token(asset)
    }

    /// Credit vote weight
    pub fn deposit(
        &mut self,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.only_voter(caller)?;
        self.stream.stake(account, amount, now)
    }

    /// Remove vote weight
    pub fn withdraw(
        &mut self,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.only_voter(caller)?;
        self.stream.unstake(account, amount, now)
    }

    pub fn notify_reward_amount(
        &mut self,
        bank: &mut Bank,
        from: &Address,
        asset: Asset,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.stream
            .notify_reward_amount(bank, from, asset, amount, now)?;
        debug!(bribe = %self.address, %asset, amount, "bribe notified");
        Ok(())
    }

    pub fn get_reward(
        &mut self,
        bank: &mut Bank,
        account: &Address,
        now: Timestamp,
    ) -> Result<Vec<(Asset, u128)>> {
        self.stream.get_reward(bank, account, now)
    }

    pub fn earned(&self, account: &Address, asset: Asset, now: Timestamp) -> Result<u128> {
        self.stream.earned(account, asset, now)
    }

    pub fn left(&self, asset: Asset, now: Timestamp) -> u128 {
        self.stream.left(asset, now)
    }

    pub fn duration(&self) -> u64 {
        self.stream.duration()
    }

    pub fn reward_tokens(&self) -> &[Asset] {
        self.stream.reward_tokens()
    }

    pub fn total_supply(&self) -> u128 {
        self.stream.total_supply()
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.stream.balance_of(account)
    }
}

/// Bribe errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BribeError {
    #[error("Bribe: {0} is not the voter")]
    NotVoter(Address),
}

impl BribeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Authorization
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ONE, WEEK};
    use crate::error::Error;

    #[test]
    fn test_anyone_funds_registered_token() {
        let voter = Address::from_label("voter");
        let sponsor = Address::from_label("sponsor");
        let alice = Address::from_label("alice");
        let usdc = Asset::external("USDC");
        let mut bribe = Bribe::new(
            Address::from_label("bribe"),
            Address::from_label("plugin"),
            voter,
            &[usdc, usdc],
            WEEK,
        )
        .unwrap();
        assert_eq!(bribe.reward_tokens(), &[usdc]);

        let mut bank = Bank::new();
        bank.mint(usdc, &sponsor, WEEK as u128 * ONE).unwrap();

        let err = bribe.deposit(&alice, &alice, ONE, 0).unwrap_err();
        assert_eq!(err, Error::Bribe(BribeError::NotVoter(alice)));
        bribe.deposit(&voter, &alice, ONE, 0).unwrap();

        bribe
            .notify_reward_amount(&mut bank, &sponsor, usdc, WEEK as u128 * ONE, 0)
            .unwrap();
        let paid = bribe.get_reward(&mut bank, &alice, WEEK).unwrap();
        assert_eq!(paid, vec![(usdc, WEEK as u128 * ONE)]);
    }
}
