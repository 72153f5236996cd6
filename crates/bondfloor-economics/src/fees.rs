//! Fee collector.
//!
//! The market sends the non-floor share of every swap fee here. `distribute`
//! pushes each balance into the VTOKEN rewarder once it is large enough to
//! start a stream; smaller balances wait for the next call.

use crate::error::Result;
use crate::ledger::Bank;
use crate::rewarder::Rewarder;
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fees {
    address: Address,
    rewarder: Address,
}

impl Fees {
    pub fn new(address: Address, rewarder: Address) -> Self {
        Self { address, rewarder }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rewarder(&self) -> Address {
        self.rewarder
    }

    /// Notify the rewarder with every balance that can start a stream
    pub fn distribute(
        &self,
        bank: &mut Bank,
        rewarder: &mut Rewarder,
        now: Timestamp,
    ) -> Result<Vec<(Asset, u128)>> {
        let duration = u128::from(rewarder.duration());
        let mut sent = Vec::new();
        for asset in rewarder.reward_tokens().to_vec() {
            let balance = bank.balance_of(asset, &self.address);
            if balance < duration || balance <= rewarder.left(asset, now) {
                continue;
            }
            rewarder.notify_reward_amount(bank, &self.address, asset, balance, now)?;
            sent.push((asset, balance));
        }
        debug!(streams = sent.len(), "fees distributed");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ONE, WEEK};

    #[test]
    fn test_distribute_skips_dust() {
        let mut bank = Bank::new();
        let vtoken = Address::from_label("vtoken");
        let rewarder_addr = Address::from_label("rewarder");
        let mut rewarder = Rewarder::new(rewarder_addr, vtoken, WEEK);
        let fees = Fees::new(Address::from_label("fees"), rewarder_addr);
        let base = Asset::external("BASE");
        let token = Asset::external("TOKEN");
        rewarder.add_reward(&vtoken, base).unwrap();
        rewarder.add_reward(&vtoken, token).unwrap();

        bank.mint(base, &fees.address(), 5 * ONE).unwrap();
        bank.mint(token, &fees.address(), WEEK as u128 - 1).unwrap();

        let sent = fees.distribute(&mut bank, &mut rewarder, 0).unwrap();
        assert_eq!(sent, vec![(base, 5 * ONE)]);
        assert_eq!(bank.balance_of(base, &rewarder_addr), 5 * ONE);
        assert_eq!(bank.balance_of(token, &fees.address()), WEEK as u128 - 1);
    }
}
