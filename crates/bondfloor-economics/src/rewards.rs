//! # Reward Streams
//!
//! Reward-per-token accumulator shared by the VTOKEN rewarder, every gauge and
//! every bribe. They differ only in what a "balance" is:
//!
//! | Holder | Balance | Reward tokens |
//! |--------|---------|---------------|
//! | Rewarder | VTOKEN voting power | TOKEN, OTOKEN, BASE |
//! | Gauge | plugin deposit | OTOKEN |
//! | Bribe | vote weight on the plugin | the plugin's bribe tokens |
//!
//! A notified amount streams linearly over `duration` seconds:
//!
//! ```text
//! reward_per_token += reward_rate * Δt * 1e18 / total_supply
//! earned(account)   = balance * (reward_per_token - paid[account]) / 1e18 + rewards[account]
//! ```
//!
//! Accrual is frozen while `total_supply` is zero.

use crate::constants::PRECISION;
use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::math::{checked_add, checked_sub, mul_div};
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Stream state of one reward token
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardData {
    /// End of the current streaming window
    pub period_finish: Timestamp,
    /// Tokens released per second
    pub reward_rate: u128,
    /// Last time `reward_per_token_stored` was brought forward
    pub last_update_time: Timestamp,
    /// Accumulated reward per staked unit, scaled by 1e18
    pub reward_per_token_stored: u128,
}

/// Reward-per-token streaming accumulator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardStream {
    /// Contract that custodies the reward tokens
    holder: Address,
    /// Streaming window in seconds
    duration: u64,
    /// Registration order of the reward tokens
    reward_tokens: Vec<Asset>,
    reward_data: BTreeMap<Asset, RewardData>,
    user_reward_per_token_paid: HashMap<Address, HashMap<Asset, u128>>,
    rewards: HashMap<Address, HashMap<Asset, u128>>,
    total_supply: u128,
    balances: HashMap<Address, u128>,
}

impl RewardStream {
    pub fn new(holder: Address, duration: u64) -> Self {
        Self {
            holder,
            duration,
            reward_tokens: Vec::new(),
            reward_data: BTreeMap::new(),
            user_reward_per_token_paid: HashMap::new(),
            rewards: HashMap::new(),
            total_supply: 0,
            balances: HashMap::new(),
        }
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn reward_tokens(&self) -> &[Asset] {
        &self.reward_tokens
    }

    pub fn is_reward_token(&self, asset: Asset) -> bool {
        self.reward_data.contains_key(&asset)
    }

    pub fn reward_data(&self, asset: Asset) -> Option<&RewardData> {
        self.reward_data.get(&asset)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Register a new reward token
    pub fn add_reward_token(&mut self, asset: Asset) -> Result<()> {
        if self.is_reward_token(asset) {
            return Err(RewardError::RewardTokenExists(asset).into());
        }
        self.reward_tokens.push(asset);
        self.reward_data.insert(asset, RewardData::default());
        Ok(())
    }

    pub fn last_time_reward_applicable(&self, asset: Asset, now: Timestamp) -> Timestamp {
        self.reward_data
            .get(&asset)
            .map(|d| now.min(d.period_finish))
            .unwrap_or(now)
    }

    pub fn reward_per_token(&self, asset: Asset, now: Timestamp) -> Result<u128> {
        let Some(data) = self.reward_data.get(&asset) else {
            return Ok(0);
        };
        if self.total_supply == 0 {
            return Ok(data.reward_per_token_stored);
        }
        let elapsed = self
            .last_time_reward_applicable(asset, now)
            .saturating_sub(data.last_update_time);
        let released = data
            .reward_rate
            .checked_mul(u128::from(elapsed))
            .ok_or(crate::error::Error::Overflow)?;
        checked_add(
            data.reward_per_token_stored,
            mul_div(released, PRECISION, self.total_supply)?,
        )
    }

    /// Claimable `asset` for `account` at `now`
    pub fn earned(&self, account: &Address, asset: Asset, now: Timestamp) -> Result<u128> {
        let rpt = self.reward_per_token(asset, now)?;
        let paid = self.paid(account, asset);
        let pending = self.pending(account, asset);
        let accrued = mul_div(self.balance_of(account), rpt.saturating_sub(paid), PRECISION)?;
        checked_add(accrued, pending)
    }

    /// Tokens still to be released in the current window
    pub fn left(&self, asset: Asset, now: Timestamp) -> u128 {
        match self.reward_data.get(&asset) {
            Some(d) if now < d.period_finish => d.reward_rate * u128::from(d.period_finish - now),
            _ => 0,
        }
    }

    /// Bring every accumulator forward to `now`, settling `account` if given
    fn update_reward(&mut self, account: Option<&Address>, now: Timestamp) -> Result<()> {
        for asset in self.reward_tokens.clone() {
            let stored = self.reward_per_token(asset, now)?;
            let applicable = self.last_time_reward_applicable(asset, now);
            if let Some(data) = self.reward_data.get_mut(&asset) {
                data.reward_per_token_stored = stored;
                data.last_update_time = applicable;
            }
            if let Some(account) = account {
                let earned = self.earned(account, asset, now)?;
                self.rewards.entry(*account).or_default().insert(asset, earned);
                self.user_reward_per_token_paid
                    .entry(*account)
                    .or_default()
                    .insert(asset, stored);
            }
        }
        Ok(())
    }

    /// Add `amount` to `account`'s balance
    pub fn stake(&mut self, account: &Address, amount: u128, now: Timestamp) -> Result<()> {
        if amount == 0 {
            return Err(RewardError::InvalidZeroInput.into());
        }
        self.update_reward(Some(account), now)?;
        self.total_supply = checked_add(self.total_supply, amount)?;
        let balance = checked_add(self.balance_of(account), amount)?;
        self.balances.insert(*account, balance);
        Ok(())
    }

    /// Remove `amount` from `account`'s balance
    pub fn unstake(&mut self, account: &Address, amount: u128, now: Timestamp) -> Result<()> {
        if amount == 0 {
            return Err(RewardError::InvalidZeroInput.into());
        }
        let available = self.balance_of(account);
        if amount > available {
            return Err(RewardError::InsufficientStake {
                needed: amount,
                available,
            }
            .into());
        }
        self.update_reward(Some(account), now)?;
        self.total_supply = checked_sub(self.total_supply, amount)?;
        self.balances.insert(*account, available - amount);
        Ok(())
    }

    /// Pull `amount` of `asset` from `from` and start a new streaming window.
    ///
    /// Whatever is left of the running window is rolled into the new rate.
    pub fn notify_reward_amount(
        &mut self,
        bank: &mut Bank,
        from: &Address,
        asset: Asset,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if !self.is_reward_token(asset) {
            return Err(RewardError::NotRewardToken(asset).into());
        }
        let duration = u128::from(self.duration);
        if amount < duration {
            return Err(RewardError::RewardSmallerThanDuration {
                amount,
                duration: self.duration,
            }
            .into());
        }
        let left = self.left(asset, now);
        if amount < left {
            return Err(RewardError::RewardSmallerThanLeft { amount, left }.into());
        }

        self.update_reward(None, now)?;
        bank.transfer(asset, from, &self.holder, amount)?;

        let period_finish = now + self.duration;
        if let Some(data) = self.reward_data.get_mut(&asset) {
            data.reward_rate = checked_add(amount, left)? / duration;
            data.last_update_time = now;
            data.period_finish = period_finish;
        }
        Ok(())
    }

    /// Pay everything `account` has earned. Nothing accrued is a no-op.
    pub fn get_reward(
        &mut self,
        bank: &mut Bank,
        account: &Address,
        now: Timestamp,
    ) -> Result<Vec<(Asset, u128)>> {
        let has_pending = self
            .reward_tokens
            .iter()
            .any(|asset| self.pending(account, *asset) > 0);
        if self.balance_of(account) == 0 && !has_pending {
            return Ok(Vec::new());
        }
        self.update_reward(Some(account), now)?;
        let mut paid = Vec::new();
        for asset in self.reward_tokens.clone() {
            let owed = self.pending(account, asset);
            if owed == 0 {
                continue;
            }
            if let Some(rewards) = self.rewards.get_mut(account) {
                rewards.insert(asset, 0);
            }
            bank.transfer(asset, &self.holder, account, owed)?;
            paid.push((asset, owed));
        }
        Ok(paid)
    }

    fn paid(&self, account: &Address, asset: Asset) -> u128 {
        self.user_reward_per_token_paid
            .get(account)
            .and_then(|m| m.get(&asset))
            .copied()
            .unwrap_or(0)
    }

    fn pending(&self, account: &Address, asset: Asset) -> u128 {
        self.rewards
            .get(account)
            .and_then(|m| m.get(&asset))
            .copied()
            .unwrap_or(0)
    }
}

/// Reward stream errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    #[error("RewardStream: invalid zero input")]
    InvalidZeroInput,

    #[error("RewardStream: {0} is not a reward token")]
    NotRewardToken(Asset),

    #[error("RewardStream: {0} is already a reward token")]
    RewardTokenExists(Asset),

    #[error("RewardStream: reward {amount} smaller than duration {duration}")]
    RewardSmallerThanDuration { amount: u128, duration: u64 },

    #[error("RewardStream: reward {amount} smaller than the {left} still streaming")]
    RewardSmallerThanLeft { amount: u128, left: u128 },

    #[error("RewardStream: insufficient stake, need {needed}, have {available}")]
    InsufficientStake { needed: u128, available: u128 },
}

impl RewardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidZeroInput | Self::NotRewardToken(_) => ErrorKind::InvalidInput,
            Self::RewardTokenExists(_) => ErrorKind::StateMachine,
            Self::RewardSmallerThanDuration { .. }
            | Self::RewardSmallerThanLeft { .. }
            | Self::InsufficientStake { .. } => ErrorKind::EconomicLimit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ONE, WEEK};
    use crate::error::Error;

    struct Fixture {
        bank: Bank,
        stream: RewardStream,
        funder: Address,
        reward: Asset,
    }

    fn fixture() -> Fixture {
        let mut bank = Bank::new();
        let funder = Address::from_label("funder");
        let reward = Asset::external("REWARD");
        bank.mint(reward, &funder, 1_000_000 * ONE).unwrap();
        let mut stream = RewardStream::new(Address::from_label("holder"), WEEK);
        stream.add_reward_token(reward).unwrap();
        Fixture {
            bank,
            stream,
            funder,
            reward,
        }
    }

    #[test]
    fn test_single_staker_earns_whole_stream() {
        let Fixture {
            mut bank,
            mut stream,
            funder,
            reward,
        } = fixture();
        let alice = Address::from_label("alice");

        stream.stake(&alice, 10 * ONE, 0).unwrap();
        let amount = WEEK as u128 * ONE;
        stream
            .notify_reward_amount(&mut bank, &funder, reward, amount, 0)
            .unwrap();

        // Past the window, everything has streamed
        let earned = stream.earned(&alice, reward, 2 * WEEK).unwrap();
        assert_eq!(earned, amount);

        let paid = stream.get_reward(&mut bank, &alice, 2 * WEEK).unwrap();
        assert_eq!(paid, vec![(reward, amount)]);
        assert_eq!(bank.balance_of(reward, &alice), amount);
        assert_eq!(stream.earned(&alice, reward, 2 * WEEK).unwrap(), 0);
    }

    #[test]
    fn test_rewards_split_by_balance() {
        let Fixture {
            mut bank,
            mut stream,
            funder,
            reward,
        } = fixture();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        stream.stake(&alice, 3 * ONE, 0).unwrap();
        stream.stake(&bob, ONE, 0).unwrap();
        stream
            .notify_reward_amount(&mut bank, &funder, reward, WEEK as u128 * 4 * ONE, 0)
            .unwrap();

        let a = stream.earned(&alice, reward, WEEK).unwrap();
        let b = stream.earned(&bob, reward, WEEK).unwrap();
        assert_eq!(a, 3 * b);
    }

    #[test]
    fn test_accrual_frozen_without_stakers() {
        let Fixture {
            mut bank,
            mut stream,
            funder,
            reward,
        } = fixture();

        stream
            .notify_reward_amount(&mut bank, &funder, reward, WEEK as u128 * ONE, 0)
            .unwrap();
        assert_eq!(stream.reward_per_token(reward, WEEK / 2).unwrap(), 0);
    }

    #[test]
    fn test_notify_below_duration_rejected() {
        let Fixture {
            mut bank,
            mut stream,
            funder,
            reward,
        } = fixture();

        let err = stream
            .notify_reward_amount(&mut bank, &funder, reward, WEEK as u128 - 1, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Reward(RewardError::RewardSmallerThanDuration { .. })
        ));
    }

    #[test]
    fn test_notify_rolls_leftover_into_rate() {
        let Fixture {
            mut bank,
            mut stream,
            funder,
            reward,
        } = fixture();
        let amount = WEEK as u128 * ONE;

        stream
            .notify_reward_amount(&mut bank, &funder, reward, amount, 0)
            .unwrap();
        let half = WEEK / 2;
        let left = stream.left(reward, half);
        assert_eq!(left, amount / 2);

        stream
            .notify_reward_amount(&mut bank, &funder, reward, amount, half)
            .unwrap();
        let data = stream.reward_data(reward).unwrap();
        assert_eq!(data.reward_rate, (amount + left) / WEEK as u128);
        assert_eq!(data.period_finish, half + WEEK);
    }

    #[test]
    fn test_get_reward_without_accrual_is_noop() {
        let Fixture {
            mut bank,
            mut stream,
            reward,
            ..
        } = fixture();
        let alice = Address::from_label("alice");

        assert!(stream.get_reward(&mut bank, &alice, 100).unwrap().is_empty());
        assert_eq!(bank.balance_of(reward, &alice), 0);
    }

    #[test]
    fn test_unstake_more_than_balance() {
        let Fixture { mut stream, .. } = fixture();
        let alice = Address::from_label("alice");
        stream.stake(&alice, ONE, 0).unwrap();

        let err = stream.unstake(&alice, 2 * ONE, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::Reward(RewardError::InsufficientStake { .. })
        ));
        assert_eq!(stream.balance_of(&alice), ONE);
    }

    #[test]
    fn test_unknown_token_rejected() {
        let Fixture {
            mut bank,
            mut stream,
            funder,
            ..
        } = fixture();
        let other = Asset::external("OTHER");
        bank.mint(other, &funder, WEEK as u128).unwrap();

        let err = stream
            .notify_reward_amount(&mut bank, &funder, other, WEEK as u128, 0)
            .unwrap_err();
        assert_eq!(err, Error::Reward(RewardError::NotRewardToken(other)));
    }
}
