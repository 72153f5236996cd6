//! VTOKEN rewarder.
//!
//! Streams market fees (TOKEN, BASE) and OTOKEN to vote-escrow holders in
//! proportion to voting power. Only the VTOKEN moves stake in or out; anyone
//! may fund a registered reward token.

use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::rewards::RewardStream;
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rewarder {
    address: Address,
    vtoken: Address,
    stream: RewardStream,
}

impl Rewarder {
    pub fn new(address: Address, vtoken: Address, duration: u64) -> Self {
        Self {
            address,
            vtoken,
            stream: RewardStream::new(address, duration),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn stream(&self) -> &RewardStream {
        &self.stream
    }

    fn only_vtoken(&self, caller: &Address) -> Result<()> {
        if *caller != self.vtoken {
            return Err(RewarderError::NotVToken(*caller).into());
        }
        Ok(())
    }

    pub fn add_reward(&mut self, caller: &Address, asset: Asset) -> Result<()> {
        self.only_vtoken(caller)?;
        self.stream.add_reward_token(asset)
    }

    pub fn deposit(
        &mut self,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.only_vtoken(caller)?;
        self.stream.stake(account, amount, now)
    }

    pub fn withdraw(
        &mut self,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.only_vtoken(caller)?;
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
        debug!(%asset, amount, "rewarder notified");
        Ok(())
    }

    /// Pay every reward token `account` has earned
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

    pub fn reward_tokens(&self) -> &[Asset] {
        self.stream.reward_tokens()
    }

    pub fn duration(&self) -> u64 {
        self.stream.duration()
    }

    pub fn total_supply(&self) -> u128 {
        self.stream.total_supply()
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.stream.balance_of(account)
    }
}

/// Rewarder errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RewarderError {
    #[error("Rewarder: {0} is not the VTOKEN")]
    NotVToken(Address),
}

impl RewarderError {
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
    fn test_only_vtoken_moves_stake() {
        let vtoken = Address::from_label("vtoken");
        let mallory = Address::from_label("mallory");
        let mut rewarder = Rewarder::new(Address::from_label("rewarder"), vtoken, WEEK);

        let err = rewarder.deposit(&mallory, &mallory, ONE, 0).unwrap_err();
        assert_eq!(err, Error::Rewarder(RewarderError::NotVToken(mallory)));

        rewarder.deposit(&vtoken, &mallory, ONE, 0).unwrap();
        assert_eq!(rewarder.balance_of(&mallory), ONE);
        assert_eq!(rewarder.total_supply(), ONE);
    }

    #[test]
    fn test_add_reward_through_vtoken() {
        let vtoken = Address::from_label("vtoken");
        let mut rewarder = Rewarder::new(Address::from_label("rewarder"), vtoken, WEEK);
        let base = Asset::external("BASE");

        rewarder.add_reward(&vtoken, base).unwrap();
        assert_eq!(rewarder.reward_tokens(), &[base]);
        assert!(rewarder.add_reward(&vtoken, base).is_err());
    }
}
