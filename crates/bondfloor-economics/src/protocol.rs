//! # Protocol World State
//!
//! [`Protocol`] owns every ledger in the system and is the only entry point
//! that mutates them. Each public method is one transaction: it runs against
//! a copy of the world and the copy replaces the live state only if the whole
//! call succeeds, so a failed call leaves reserves, debt, stake, votes and
//! reward accumulators exactly as they were.
//!
//! ## Deployment order
//!
//! ```text
//! Market(BASE, supply) ─┬─ OTOKEN
//!                       ├─ VTOKEN ── Rewarder
//!                       └─ Fees
//! GaugeFactory, BribeFactory
//! Voter(VTOKEN, OTOKEN, GaugeFactory, BribeFactory)
//! Minter(Voter, TOKEN, VTOKEN, OTOKEN)
//! ```
//!
//! ## Setup sequence
//!
//! Nothing works until [`Protocol::setup`] (or the same steps one by one) has
//! run: factories → voter, VTOKEN rewards, VTOKEN → voter, OTOKEN → minter,
//! voter → minter, minter initialize.

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::factory::{BribeFactory, FactoryKind, GaugeFactory};
use crate::fees::Fees;
use crate::ledger::Bank;
use crate::market::{Market, SwapParams};
use crate::minter::Minter;
use crate::otoken::OToken;
use crate::plugin::{Plugin, PluginError, PluginSpec};
use crate::rewarder::Rewarder;
use crate::types::{Address, Asset, Timestamp};
use crate::voter::{PluginRecord, Voter, VoterBindings, VoterError};
use crate::vtoken::{VToken, WithdrawLocks};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Where every protocol contract lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAddresses {
    pub deployer: Address,
    pub base: Asset,
    pub token: Address,
    pub otoken: Address,
    pub vtoken: Address,
    pub rewarder: Address,
    pub fees: Address,
    pub gauge_factory: Address,
    pub bribe_factory: Address,
    pub voter: Address,
    pub minter: Address,
}

/// Contracts the deployer creates directly
const DEPLOYER_CONTRACTS: u64 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Protocol {
    now: Timestamp,
    config: ProtocolConfig,
    addresses: ProtocolAddresses,
    bank: Bank,
    market: Market,
    otoken: OToken,
    vtoken: VToken,
    rewarder: Rewarder,
    fees: Fees,
    gauge_factory: GaugeFactory,
    bribe_factory: BribeFactory,
    voter: Voter,
    minter: Minter,
    plugins: BTreeMap<Address, Plugin>,
    nonces: HashMap<Address, u64>,
}

impl Protocol {
    /// Deploy every contract in dependency order
    pub fn deploy(config: ProtocolConfig, deployer: Address, now: Timestamp) -> Result<Self> {
        config.validate()?;
        if deployer.is_zero() {
            return Err(Error::InvalidConfig("deployer must not be the zero address".into()));
        }

        let token = Address::derive(&deployer, 0);
        let addresses = ProtocolAddresses {
            deployer,
            base: Asset::external("BASE"),
            token,
            otoken: Address::derive(&token, 0),
            vtoken: Address::derive(&token, 1),
            rewarder: Address::derive(&Address::derive(&token, 1), 0),
            fees: Address::derive(&token, 2),
            gauge_factory: Address::derive(&deployer, 1),
            bribe_factory: Address::derive(&deployer, 2),
            voter: Address::derive(&deployer, 3),
            minter: Address::derive(&deployer, 4),
        };

        let mut bank = Bank::new();
        let market = Market::new(
            &mut bank,
            token,
            addresses.base,
            addresses.fees,
            &config.market,
        )?;
        let otoken = OToken::new(addresses.otoken, deployer);
        if config.market.otoken_initial_supply > 0 {
            otoken.mint(&mut bank, &deployer, &deployer, config.market.otoken_initial_supply)?;
        }
        let vtoken = VToken::new(
            addresses.vtoken,
            deployer,
            market.token(),
            otoken.asset(),
            config.vtoken.burn_power_multiplier,
        );
        let rewarder = Rewarder::new(addresses.rewarder, addresses.vtoken, config.rewards.duration);
        let fees = Fees::new(addresses.fees, addresses.rewarder);
        let gauge_factory = GaugeFactory::new(addresses.gauge_factory, deployer);
        let bribe_factory = BribeFactory::new(addresses.bribe_factory, deployer);
        let voter = Voter::new(
            addresses.voter,
            deployer,
            VoterBindings {
                vtoken: addresses.vtoken,
                otoken: otoken.asset(),
                gauge_factory: addresses.gauge_factory,
                bribe_factory: addresses.bribe_factory,
            },
            config.emission.epoch_length,
            config.rewards.duration,
        );
        let minter = Minter::new(addresses.minter, addresses.voter, deployer, &config.emission);

        info!(
            %deployer,
            token = %addresses.token,
            voter = %addresses.voter,
            minter = %addresses.minter,
            "protocol deployed"
        );

        let mut nonces = HashMap::new();
        nonces.insert(deployer, DEPLOYER_CONTRACTS);
        Ok(Self {
            now,
            config,
            addresses,
            bank,
            market,
            otoken,
            vtoken,
            rewarder,
            fees,
            gauge_factory,
            bribe_factory,
            voter,
            minter,
            plugins: BTreeMap::new(),
            nonces,
        })
    }

    /// Deploy and run the full setup sequence
    pub fn deploy_and_setup(config: ProtocolConfig, deployer: Address, now: Timestamp) -> Result<Self> {
        let mut protocol = Self::deploy(config, deployer, now)?;
        protocol.setup(&deployer)?;
        Ok(protocol)
    }

    /// Apply `op` to a copy of the world and commit it only on success
    fn transact<T>(&mut self, name: &'static str, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut draft = self.clone();
        match op(&mut draft) {
            Ok(value) => {
                *self = draft;
                Ok(value)
            }
            Err(e) => {
                warn!(call = name, error = %e, kind = ?e.kind(), "transaction reverted");
                Err(e)
            }
        }
    }

    // ---- clock ----

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Stamp the next block. Time never moves backwards.
    pub fn set_time(&mut self, now: Timestamp) {
        self.now = self.now.max(now);
    }

    pub fn advance(&mut self, seconds: u64) -> Timestamp {
        self.now += seconds;
        self.now
    }

    // ---- views ----

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn addresses(&self) -> &ProtocolAddresses {
        &self.addresses
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn otoken(&self) -> &OToken {
        &self.otoken
    }

    pub fn vtoken(&self) -> &VToken {
        &self.vtoken
    }

    pub fn rewarder(&self) -> &Rewarder {
        &self.rewarder
    }

    pub fn fees(&self) -> &Fees {
        &self.fees
    }

    pub fn voter(&self) -> &Voter {
        &self.voter
    }

    pub fn minter(&self) -> &Minter {
        &self.minter
    }

    pub fn gauge_factory(&self) -> &GaugeFactory {
        &self.gauge_factory
    }

    pub fn bribe_factory(&self) -> &BribeFactory {
        &self.bribe_factory
    }

    pub fn plugin(&self, plugin: &Address) -> Option<&Plugin> {
        self.plugins.get(plugin)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    pub fn base(&self) -> Asset {
        self.addresses.base
    }

    pub fn token(&self) -> Asset {
        self.market.token()
    }

    pub fn otoken_asset(&self) -> Asset {
        self.otoken.asset()
    }

    pub fn balance_of(&self, asset: Asset, account: &Address) -> u128 {
        self.bank.balance_of(asset, account)
    }

    /// Both market reserve identities hold
    pub fn reserves_consistent(&self) -> bool {
        self.market.reserves_consistent(&self.bank)
    }

    /// Obligations currently locking `account`'s VTOKEN principal
    pub fn withdraw_locks(&self, account: &Address) -> WithdrawLocks {
        WithdrawLocks {
            debt: self.market.debt_of(account),
            used_weight: self.voter.used_weight(account),
        }
    }

    // ---- setup ----

    /// Run the whole setup sequence as one transaction
    pub fn setup(&mut self, caller: &Address) -> Result<()> {
        let caller = *caller;
        self.transact("setup", |p| {
            let voter = p.addresses.voter;
            let minter = p.addresses.minter;
            p.gauge_factory.set_voter(&caller, voter)?;
            p.bribe_factory.set_voter(&caller, voter)?;
            for asset in [p.market.token(), p.otoken.asset(), p.addresses.base] {
                p.vtoken.add_reward(&mut p.rewarder, &caller, asset)?;
            }
            p.vtoken.set_voter(&caller, voter)?;
            p.otoken.set_minter(&caller, minter)?;
            p.voter.initialize(&caller, minter)?;
            p.minter.initialize(&caller, p.now)?;
            info!("protocol setup complete");
            Ok(())
        })
    }

    pub fn set_factory_voter(&mut self, caller: &Address, kind: FactoryKind, voter: Address) -> Result<()> {
        let caller = *caller;
        self.transact("set_factory_voter", |p| match kind {
            FactoryKind::Gauge => p.gauge_factory.set_voter(&caller, voter),
            FactoryKind::Bribe => p.bribe_factory.set_voter(&caller, voter),
        })
    }

    pub fn add_vtoken_reward(&mut self, caller: &Address, asset: Asset) -> Result<()> {
        let caller = *caller;
        self.transact("add_vtoken_reward", |p| {
            p.vtoken.add_reward(&mut p.rewarder, &caller, asset)
        })
    }

    pub fn set_vtoken_voter(&mut self, caller: &Address, voter: Address) -> Result<()> {
        let caller = *caller;
        self.transact("set_vtoken_voter", |p| p.vtoken.set_voter(&caller, voter))
    }

    pub fn set_otoken_minter(&mut self, caller: &Address, minter: Address) -> Result<()> {
        let caller = *caller;
        self.transact("set_otoken_minter", |p| p.otoken.set_minter(&caller, minter))
    }

    pub fn initialize_voter(&mut self, caller: &Address, minter: Address) -> Result<()> {
        let caller = *caller;
        self.transact("initialize_voter", |p| p.voter.initialize(&caller, minter))
    }

    pub fn initialize_minter(&mut self, caller: &Address) -> Result<()> {
        let caller = *caller;
        self.transact("initialize_minter", |p| p.minter.initialize(&caller, p.now))
    }

    /// Mint an external asset (BASE, plugin underlyings, bribe tokens) to
    /// `account`. TOKEN and OTOKEN are only issued by the protocol.
    pub fn fund(&mut self, asset: Asset, account: &Address, amount: u128) -> Result<()> {
        if asset == self.market.token() || asset == self.otoken.asset() {
            return Err(Error::InvalidConfig(format!(
                "{asset} is issued by the protocol and cannot be funded"
            )));
        }
        let account = *account;
        self.transact("fund", |p| p.bank.mint(asset, &account, amount))
    }

    // ---- market ----

    pub fn buy(&mut self, caller: &Address, params: SwapParams) -> Result<u128> {
        let caller = *caller;
        self.transact("buy", |p| p.market.buy(&mut p.bank, &caller, &params, p.now))
    }

    pub fn sell(&mut self, caller: &Address, params: SwapParams) -> Result<u128> {
        let caller = *caller;
        self.transact("sell", |p| p.market.sell(&mut p.bank, &caller, &params, p.now))
    }

    pub fn borrow(&mut self, caller: &Address, amount: u128) -> Result<()> {
        let caller = *caller;
        self.transact("borrow", |p| {
            p.market.borrow(&mut p.bank, &p.vtoken, &caller, amount)
        })
    }

    pub fn repay(&mut self, caller: &Address, amount: u128) -> Result<()> {
        let caller = *caller;
        self.transact("repay", |p| p.market.repay(&mut p.bank, &caller, amount))
    }

    pub fn exercise(&mut self, caller: &Address, amount: u128, to: &Address) -> Result<()> {
        let (caller, to) = (*caller, *to);
        self.transact("exercise", |p| {
            p.market.exercise(&mut p.bank, &p.otoken, &caller, amount, &to)
        })
    }

    pub fn redeem(&mut self, caller: &Address, amount: u128, to: &Address) -> Result<()> {
        let (caller, to) = (*caller, *to);
        self.transact("redeem", |p| p.market.redeem(&mut p.bank, &caller, amount, &to))
    }

    pub fn get_max_sell(&self) -> Result<u128> {
        self.market.get_max_sell()
    }

    pub fn get_account_credit(&self, account: &Address) -> Result<u128> {
        self.market.get_account_credit(&self.vtoken, account)
    }

    // ---- vote escrow ----

    pub fn deposit(&mut self, caller: &Address, amount: u128) -> Result<()> {
        let caller = *caller;
        self.transact("deposit", |p| {
            p.vtoken
                .deposit(&mut p.bank, &mut p.rewarder, &caller, amount, p.now)
        })
    }

    pub fn withdraw(&mut self, caller: &Address, amount: u128) -> Result<()> {
        let caller = *caller;
        self.transact("withdraw", |p| {
            let locks = p.withdraw_locks(&caller);
            p.vtoken
                .withdraw(&mut p.bank, &mut p.rewarder, &caller, amount, locks, p.now)
        })
    }

    pub fn burn_for(&mut self, caller: &Address, account: &Address, amount: u128) -> Result<()> {
        let (caller, account) = (*caller, *account);
        self.transact("burn_for", |p| {
            p.vtoken
                .burn_for(&mut p.bank, &mut p.rewarder, &caller, &account, amount, p.now)
        })
    }

    /// Claim every rewarder token for `caller`
    pub fn get_reward(&mut self, caller: &Address) -> Result<Vec<(Asset, u128)>> {
        let caller = *caller;
        self.transact("get_reward", |p| {
            p.rewarder.get_reward(&mut p.bank, &caller, p.now)
        })
    }

    /// Stream collected fees to VTOKEN holders
    pub fn distribute_fees(&mut self) -> Result<Vec<(Asset, u128)>> {
        self.transact("distribute_fees", |p| {
            p.fees.distribute(&mut p.bank, &mut p.rewarder, p.now)
        })
    }

    // ---- emissions ----

    pub fn update_period(&mut self) -> Result<u128> {
        self.transact("update_period", |p| {
            p.minter
                .update_period(&mut p.bank, &p.otoken, &mut p.voter, p.now)
        })
    }

    pub fn distribute(&mut self, gauges: &[Address]) -> Result<u128> {
        self.transact("distribute", |p| {
            let mut sent = 0u128;
            for gauge in gauges {
                sent += p.voter.distribute(&mut p.bank, gauge, p.now)?;
            }
            Ok(sent)
        })
    }

    /// Roll the epoch if due, then push every gauge's share
    pub fn distro(&mut self) -> Result<u128> {
        self.transact("distro", |p| {
            p.minter
                .update_period(&mut p.bank, &p.otoken, &mut p.voter, p.now)?;
            p.voter.distribute_all(&mut p.bank, p.now)
        })
    }

    /// Forward each plugin's harvested bribe tokens into its bribe
    pub fn distribute_to_bribes(&mut self, plugins: &[Address]) -> Result<Vec<(Address, Asset, u128)>> {
        self.transact("distribute_to_bribes", |p| {
            let mut sent = Vec::new();
            for plugin in plugins {
                let bribe_addr = p
                    .voter
                    .bribe_of(plugin)
                    .ok_or(VoterError::UnknownPlugin(*plugin))?;
                let target = p
                    .plugins
                    .get_mut(plugin)
                    .ok_or(VoterError::UnknownPlugin(*plugin))?;
                let bribe = p
                    .voter
                    .bribe_mut(&bribe_addr)
                    .ok_or(VoterError::UnknownBribe(bribe_addr))?;
                for (asset, amount) in target.claim_and_distribute(&mut p.bank, bribe, p.now)? {
                    sent.push((*plugin, asset, amount));
                }
            }
            Ok(sent)
        })
    }

    // ---- voter ----

    /// Deploy a plugin contract from `caller`
    pub fn create_plugin(&mut self, caller: &Address, spec: PluginSpec) -> Result<Address> {
        let caller = *caller;
        self.transact("create_plugin", |p| {
            let nonce = p.nonces.entry(caller).or_insert(0);
            let address = Address::derive(&caller, *nonce);
            *nonce += 1;
            info!(plugin = %address, symbol = %spec.symbol, kind = %spec.kind, "plugin deployed");
            p.plugins
                .insert(address, Plugin::new(address, spec, p.addresses.voter));
            Ok(address)
        })
    }

    pub fn add_plugin(&mut self, caller: &Address, plugin: &Address) -> Result<PluginRecord> {
        let (caller, plugin) = (*caller, *plugin);
        self.transact("add_plugin", |p| {
            let target = p
                .plugins
                .get_mut(&plugin)
                .ok_or(VoterError::UnknownPlugin(plugin))?;
            p.voter
                .add_plugin(&mut p.gauge_factory, &mut p.bribe_factory, target, &caller)
        })
    }

    pub fn add_bribe_reward(&mut self, caller: &Address, plugin: &Address, asset: Asset) -> Result<()> {
        let (caller, plugin) = (*caller, *plugin);
        self.transact("add_bribe_reward", |p| {
            p.voter.add_bribe_reward(&caller, &plugin, asset)
        })
    }

    pub fn kill_gauge(&mut self, caller: &Address, gauge: &Address) -> Result<()> {
        let (caller, gauge) = (*caller, *gauge);
        self.transact("kill_gauge", |p| p.voter.kill_gauge(&caller, &gauge))
    }

    pub fn vote(&mut self, caller: &Address, plugins: &[Address], weights: &[u128]) -> Result<u128> {
        let caller = *caller;
        self.transact("vote", |p| {
            p.voter.vote(&p.vtoken, &caller, plugins, weights, p.now)
        })
    }

    pub fn reset(&mut self, caller: &Address) -> Result<()> {
        let caller = *caller;
        self.transact("reset", |p| p.voter.reset(&caller, p.now))
    }

    pub fn claim_rewards(&mut self, caller: &Address, gauges: &[Address]) -> Result<Vec<(Address, Asset, u128)>> {
        let caller = *caller;
        self.transact("claim_rewards", |p| {
            p.voter.claim_rewards(&mut p.bank, &caller, gauges, p.now)
        })
    }

    pub fn claim_bribes(&mut self, caller: &Address, bribes: &[Address]) -> Result<Vec<(Address, Asset, u128)>> {
        let caller = *caller;
        self.transact("claim_bribes", |p| {
            p.voter.claim_bribes(&mut p.bank, &caller, bribes, p.now)
        })
    }

    // ---- plugins ----

    pub fn plugin_deposit(
        &mut self,
        caller: &Address,
        plugin: &Address,
        account: &Address,
        amount: u128,
    ) -> Result<()> {
        let (caller, plugin, account) = (*caller, *plugin, *account);
        self.transact("plugin_deposit", |p| {
            let target = p
                .plugins
                .get_mut(&plugin)
                .ok_or(VoterError::UnknownPlugin(plugin))?;
            let gauge_addr = target.get_gauge().ok_or(PluginError::NotRegistered)?;
            let gauge = p
                .voter
                .gauge_mut(&gauge_addr)
                .ok_or(VoterError::UnknownGauge(gauge_addr))?;
            target.deposit_for(&mut p.bank, gauge, &caller, &account, amount, p.now)
        })
    }

    pub fn plugin_withdraw(
        &mut self,
        caller: &Address,
        plugin: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<()> {
        let (caller, plugin, to) = (*caller, *plugin, *to);
        self.transact("plugin_withdraw", |p| {
            let target = p
                .plugins
                .get_mut(&plugin)
                .ok_or(VoterError::UnknownPlugin(plugin))?;
            let gauge_addr = target.get_gauge().ok_or(PluginError::NotRegistered)?;
            let gauge = p
                .voter
                .gauge_mut(&gauge_addr)
                .ok_or(VoterError::UnknownGauge(gauge_addr))?;
            target.withdraw_to(&mut p.bank, gauge, &caller, &to, amount, p.now)
        })
    }

    /// Hand harvested yield to a plugin's bribe pot
    pub fn deposit_bribe(
        &mut self,
        caller: &Address,
        plugin: &Address,
        asset: Asset,
        amount: u128,
    ) -> Result<()> {
        let (caller, plugin) = (*caller, *plugin);
        self.transact("deposit_bribe", |p| {
            let target = p
                .plugins
                .get_mut(&plugin)
                .ok_or(VoterError::UnknownPlugin(plugin))?;
            target.deposit_bribe(&mut p.bank, &caller, asset, amount)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ONE, WEEK};
    use crate::error::ErrorKind;
    use crate::market::MarketError;
    use crate::minter::MinterError;

    fn deployer() -> Address {
        Address::from_label("deployer")
    }

    #[test]
    fn test_deploy_addresses_are_deterministic() {
        let a = Protocol::deploy(ProtocolConfig::default(), deployer(), 0).unwrap();
        let b = Protocol::deploy(ProtocolConfig::default(), deployer(), 0).unwrap();
        assert_eq!(a.addresses(), b.addresses());
        assert_eq!(
            a.balance_of(a.otoken_asset(), &deployer()),
            a.config().market.otoken_initial_supply
        );
        assert!(a.reserves_consistent());
    }

    #[test]
    fn test_setup_is_one_shot() {
        let mut protocol = Protocol::deploy(ProtocolConfig::default(), deployer(), WEEK).unwrap();
        protocol.setup(&deployer()).unwrap();
        assert_eq!(protocol.minter().active_period(), Some(WEEK));
        assert_eq!(protocol.rewarder().reward_tokens().len(), 3);

        // VTOKEN rewards already registered, so the whole second run reverts
        assert!(protocol.setup(&deployer()).is_err());
        assert_eq!(protocol.rewarder().reward_tokens().len(), 3);
    }

    #[test]
    fn test_minter_before_setup() {
        let mut protocol = Protocol::deploy(ProtocolConfig::default(), deployer(), 0).unwrap();
        let err = protocol.update_period().unwrap_err();
        assert_eq!(err, Error::Minter(MinterError::NotInitialized));

        let stranger = Address::from_label("stranger");
        let err = protocol.initialize_minter(&stranger).unwrap_err();
        assert_eq!(err, Error::Minter(MinterError::UnauthorizedInitializer));
    }

    #[test]
    fn test_failed_call_leaves_state_untouched() {
        let mut protocol = Protocol::deploy_and_setup(ProtocolConfig::default(), deployer(), 0).unwrap();
        let alice = Address::from_label("alice");
        protocol.fund(protocol.base(), &alice, 10 * ONE).unwrap();

        let before = serde_json::to_string(&protocol).unwrap();
        let err = protocol
            .buy(
                &alice,
                SwapParams {
                    amount_in: 10 * ONE,
                    min_amount_out: 100 * ONE,
                    deadline: 0,
                    to: alice,
                    referrer: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EconomicLimit);
        assert!(matches!(
            err,
            Error::Market(MarketError::ExceedsSwapSlippageTolerance { .. })
        ));
        assert_eq!(serde_json::to_string(&protocol).unwrap(), before);
    }

    #[test]
    fn test_protocol_assets_cannot_be_funded() {
        let mut protocol = Protocol::deploy(ProtocolConfig::default(), deployer(), 0).unwrap();
        let token = protocol.token();
        assert!(protocol.fund(token, &deployer(), ONE).is_err());
    }
}
