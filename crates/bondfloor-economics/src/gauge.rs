//! Gauge: streams a plugin's share of OTOKEN emissions to its depositors.
//!
//! Balances mirror plugin deposits and are moved only by the plugin. Only the
//! voter funds the stream.

use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::rewards::RewardStream;
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Gauge {
    address: Address,
    plugin: Address,
    voter: Address,
    stream: RewardStream,
}

impl Gauge {
    pub fn new(
        address: Address,
        plugin: Address,
        voter: Address,
        otoken: Asset,
        duration: u64,
    ) -> Result<Self> {
        let mut stream = RewardStream::new(address, duration);
        stream.add_reward_token(otoken)?;
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

    pub fn deposit(
        &mut self,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if *caller != self.plugin {
            return Err(GaugeError::NotPlugin(*caller).into());
        }
        self.stream.stake(account, amount, now)
    }

    pub fn withdraw(
        &mut self,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if *caller != self.plugin {
            return Err(GaugeError::NotPlugin(*caller).into());
        }
        self.stream.unstake(account, amount, now)
    }

    pub fn notify_reward_amount(
        &mut self,
        bank: &mut Bank,
        caller: &Address,
        asset: Asset,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if *caller != self.voter {
            return Err(GaugeError::NotVoter(*caller).into());
        }
        self.stream
            .notify_reward_amount(bank, caller, asset, amount, now)?;
        debug!(gauge = %self.address, amount, "gauge notified");
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

    pub fn total_supply(&self) -> u128 {
        self.stream.total_supply()
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.stream.balance_of(account)
    }
}

/// Gauge errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GaugeError {
    #[error("Gauge: {0} is not the plugin")]
    NotPlugin(Address),

    #[error("Gauge: {0} is not the voter")]
    NotVoter(Address),
}

impl GaugeError {
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
    fn test_only_plugin_and_voter() {
        let plugin = Address::from_label("plugin");
        let voter = Address::from_label("voter");
        let otoken = Asset::external("OTOKEN");
        let alice = Address::from_label("alice");
        let mut gauge = Gauge::new(Address::from_label("gauge"), plugin, voter, otoken, WEEK).unwrap();
        let mut bank = Bank::new();
        bank.mint(otoken, &voter, WEEK as u128 * ONE).unwrap();
        bank.mint(otoken, &alice, WEEK as u128 * ONE).unwrap();

        let err = gauge.deposit(&alice, &alice, ONE, 0).unwrap_err();
        assert_eq!(err, Error::Gauge(GaugeError::NotPlugin(alice)));
        gauge.deposit(&plugin, &alice, ONE, 0).unwrap();

        let err = gauge
            .notify_reward_amount(&mut bank, &alice, otoken, WEEK as u128 * ONE, 0)
            .unwrap_err();
        assert_eq!(err, Error::Gauge(GaugeError::NotVoter(alice)));
        gauge
            .notify_reward_amount(&mut bank, &voter, otoken, WEEK as u128 * ONE, 0)
            .unwrap();

        assert_eq!(gauge.earned(&alice, otoken, WEEK).unwrap(), WEEK as u128 * ONE);
    }
}
