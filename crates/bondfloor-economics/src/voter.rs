//! # Voter
//!
//! Plugin registry, vote ledger and emission router.
//!
//! ## Voting
//!
//! An account splits its whole VTOKEN voting power across plugins by relative
//! weight. Each `vote` first clears the previous allocation, and an account may
//! vote or reset once per epoch. Allocated weight is deposited in each
//! plugin's bribe so voters earn that plugin's bribes.
//!
//! ## Emission accounting
//!
//! ```text
//! notify(amount):  index += amount * 1e18 / total_weight
//! update_for(g):   claimable[g] += weight[plugin(g)] * (index - supply_index[g]) / 1e18
//! distribute(g):   claimable[g] ──notify──► gauge g
//! ```
//!
//! `total_weight` only counts live plugins, so a killed plugin stops earning
//! the moment it is killed. Emission arriving while nothing is voted, and the
//! undistributed share of a killed gauge, is carried into the next notify.
//!
//! Gauge states are one-way: `Alive → Killed`.

use crate::bribe::Bribe;
use crate::constants::PRECISION;
use crate::error::{ErrorKind, Result};
use crate::factory::{BribeFactory, GaugeFactory};
use crate::gauge::Gauge;
use crate::ledger::Bank;
use crate::math::{checked_add, checked_sub, mul_div};
use crate::plugin::Plugin;
use crate::types::{Address, Asset, Timestamp};
use crate::vtoken::VToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Voter lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoterState {
    Uninitialized,
    Initialized,
}

/// Gauge lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaugeStatus {
    Alive,
    Killed,
}

/// Registry entry of a plugin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub gauge: Address,
    pub bribe: Address,
    pub status: GaugeStatus,
}

/// Contracts the voter is constructed against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterBindings {
    pub vtoken: Address,
    pub otoken: Asset,
    pub gauge_factory: Address,
    pub bribe_factory: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Voter {
    address: Address,
    owner: Address,
    bindings: VoterBindings,
    minter: Address,
    state: VoterState,
    epoch_length: u64,
    duration: u64,

    plugins: Vec<Address>,
    registry: BTreeMap<Address, PluginRecord>,
    plugin_of_gauge: BTreeMap<Address, Address>,
    plugin_of_bribe: BTreeMap<Address, Address>,
    gauges: BTreeMap<Address, Gauge>,
    bribes: BTreeMap<Address, Bribe>,

    weights: HashMap<Address, u128>,
    total_weight: u128,
    votes: HashMap<Address, Vec<(Address, u128)>>,
    used_weights: HashMap<Address, u128>,
    last_voted: HashMap<Address, Timestamp>,

    index: u128,
    supply_index: HashMap<Address, u128>,
    claimable: HashMap<Address, u128>,
    carry: u128,
}

impl Voter {
    /// The deployer holds the minter role until `initialize` hands it over
    pub fn new(
        address: Address,
        deployer: Address,
        bindings: VoterBindings,
        epoch_length: u64,
        duration: u64,
    ) -> Self {
        Self {
            address,
            owner: deployer,
            bindings,
            minter: deployer,
            state: VoterState::Uninitialized,
            epoch_length,
            duration,
            plugins: Vec::new(),
            registry: BTreeMap::new(),
            plugin_of_gauge: BTreeMap::new(),
            plugin_of_bribe: BTreeMap::new(),
            gauges: BTreeMap::new(),
            bribes: BTreeMap::new(),
            weights: HashMap::new(),
            total_weight: 0,
            votes: HashMap::new(),
            used_weights: HashMap::new(),
            last_voted: HashMap::new(),
            index: 0,
            supply_index: HashMap::new(),
            claimable: HashMap::new(),
            carry: 0,
        }
    }

    // ---- views ----

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn minter(&self) -> Address {
        self.minter
    }

    pub fn state(&self) -> VoterState {
        self.state
    }

    pub fn bindings(&self) -> &VoterBindings {
        &self.bindings
    }

    /// Plugins in registration order
    pub fn plugins(&self) -> &[Address] {
        &self.plugins
    }

    pub fn record(&self, plugin: &Address) -> Option<&PluginRecord> {
        self.registry.get(plugin)
    }

    pub fn gauge_of(&self, plugin: &Address) -> Option<Address> {
        self.registry.get(plugin).map(|r| r.gauge)
    }

    pub fn bribe_of(&self, plugin: &Address) -> Option<Address> {
        self.registry.get(plugin).map(|r| r.bribe)
    }

    pub fn plugin_of_gauge(&self, gauge: &Address) -> Option<Address> {
        self.plugin_of_gauge.get(gauge).copied()
    }

    pub fn plugin_of_bribe(&self, bribe: &Address) -> Option<Address> {
        self.plugin_of_bribe.get(bribe).copied()
    }

    pub fn gauge(&self, gauge: &Address) -> Option<&Gauge> {
        self.gauges.get(gauge)
    }

    pub fn gauge_mut(&mut self, gauge: &Address) -> Option<&mut Gauge> {
        self.gauges.get_mut(gauge)
    }

    pub fn bribe(&self, bribe: &Address) -> Option<&Bribe> {
        self.bribes.get(bribe)
    }

    pub fn bribe_mut(&mut self, bribe: &Address) -> Option<&mut Bribe> {
        self.bribes.get_mut(bribe)
    }

    pub fn is_alive(&self, gauge: &Address) -> bool {
        self.plugin_of_gauge
            .get(gauge)
            .and_then(|p| self.registry.get(p))
            .map(|r| r.status == GaugeStatus::Alive)
            .unwrap_or(false)
    }

    pub fn weight_of(&self, plugin: &Address) -> u128 {
        self.weights.get(plugin).copied().unwrap_or(0)
    }

    /// Weight across live plugins
    pub fn total_weight(&self) -> u128 {
        self.total_weight
    }

    pub fn used_weight(&self, account: &Address) -> u128 {
        self.used_weights.get(account).copied().unwrap_or(0)
    }

    pub fn votes_of(&self, account: &Address) -> &[(Address, u128)] {
        self.votes.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last_voted(&self, account: &Address) -> Option<Timestamp> {
        self.last_voted.get(account).copied()
    }

    pub fn index(&self) -> u128 {
        self.index
    }

    /// Emission waiting for the next notify
    pub fn carried(&self) -> u128 {
        self.carry
    }

    /// Share owed to `gauge` including what accrued since its last update
    pub fn claimable(&self, gauge: &Address) -> Result<u128> {
        let stored = self.claimable.get(gauge).copied().unwrap_or(0);
        checked_add(stored, self.unsettled_share(gauge)?)
    }

    fn unsettled_share(&self, gauge: &Address) -> Result<u128> {
        if !self.is_alive(gauge) {
            return Ok(0);
        }
        let Some(plugin) = self.plugin_of_gauge.get(gauge) else {
            return Ok(0);
        };
        let supplied = self.weight_of(plugin);
        let paid = self.supply_index.get(gauge).copied().unwrap_or(self.index);
        let delta = self.index.saturating_sub(paid);
        if supplied == 0 || delta == 0 {
            return Ok(0);
        }
        mul_div(supplied, delta, PRECISION)
    }

    // ---- administration ----

    fn only_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.owner {
            return Err(VoterError::NotOwner(*caller).into());
        }
        Ok(())
    }

    /// Hand the minter role to the minter contract. One-shot.
    pub fn initialize(&mut self, caller: &Address, minter: Address) -> Result<()> {
        if *caller != self.minter {
            return Err(VoterError::NotMinter(*caller).into());
        }
        if self.state == VoterState::Initialized {
            return Err(VoterError::AlreadyInitialized.into());
        }
        self.minter = minter;
        self.state = VoterState::Initialized;
        info!(%minter, "voter initialized");
        Ok(())
    }

    /// Register `plugin` and create its gauge and bribe
    pub fn add_plugin(
        &mut self,
        gauge_factory: &mut GaugeFactory,
        bribe_factory: &mut BribeFactory,
        plugin: &mut Plugin,
        caller: &Address,
    ) -> Result<PluginRecord> {
        self.only_owner(caller)?;
        let plugin_addr = plugin.address();
        if self.registry.contains_key(&plugin_addr) {
            return Err(VoterError::PluginExists(plugin_addr).into());
        }

        let gauge = gauge_factory.create_gauge(
            &self.address,
            plugin_addr,
            self.bindings.otoken,
            self.duration,
        )?;
        let bribe = bribe_factory.create_bribe(
            &self.address,
            plugin_addr,
            plugin.bribe_tokens(),
            self.duration,
        )?;
        plugin.attach(&self.address, gauge.address(), bribe.address())?;

        let record = PluginRecord {
            gauge: gauge.address(),
            bribe: bribe.address(),
            status: GaugeStatus::Alive,
        };
        self.plugins.push(plugin_addr);
        self.registry.insert(plugin_addr, record);
        self.plugin_of_gauge.insert(record.gauge, plugin_addr);
        self.plugin_of_bribe.insert(record.bribe, plugin_addr);
        self.supply_index.insert(record.gauge, self.index);
        self.gauges.insert(record.gauge, gauge);
        self.bribes.insert(record.bribe, bribe);

        info!(
            plugin = %plugin_addr,
            symbol = %plugin.spec().symbol,
            gauge = %record.gauge,
            bribe = %record.bribe,
            "plugin added"
        );
        Ok(record)
    }

    /// Register an extra reward token on a plugin's bribe
    pub fn add_bribe_reward(&mut self, caller: &Address, plugin: &Address, asset: Asset) -> Result<()> {
        self.only_owner(caller)?;
        let record = *self
            .registry
            .get(plugin)
            .ok_or(VoterError::UnknownPlugin(*plugin))?;
        let voter = self.address;
        match self.bribes.get_mut(&record.bribe) {
            Some(bribe) => bribe.add_reward(&voter, asset),
            None => Err(VoterError::UnknownBribe(record.bribe).into()),
        }
    }

    /// Stop all future emission to `gauge`. Terminal.
    pub fn kill_gauge(&mut self, caller: &Address, gauge: &Address) -> Result<()> {
        self.only_owner(caller)?;
        let plugin = self
            .plugin_of_gauge
            .get(gauge)
            .copied()
            .ok_or(VoterError::UnknownGauge(*gauge))?;
        if !self.is_alive(gauge) {
            return Err(VoterError::GaugeAlreadyKilled(*gauge).into());
        }

        self.update_for(gauge)?;
        let pending = self.claimable.remove(gauge).unwrap_or(0);
        self.carry = checked_add(self.carry, pending)?;
        self.total_weight = checked_sub(self.total_weight, self.weight_of(&plugin))?;
        if let Some(record) = self.registry.get_mut(&plugin) {
            record.status = GaugeStatus::Killed;
        }
        info!(%gauge, %plugin, carried = pending, "gauge killed");
        Ok(())
    }

    // ---- voting ----

    fn check_new_epoch(&self, account: &Address, now: Timestamp) -> Result<()> {
        let epoch_start = now / self.epoch_length * self.epoch_length;
        match self.last_voted.get(account) {
            Some(last) if *last >= epoch_start => Err(VoterError::AlreadyVotedThisEpoch.into()),
            _ => Ok(()),
        }
    }

    /// Replace `account`'s allocation with `weights` across `plugins`
    pub fn vote(
        &mut self,
        vtoken: &VToken,
        account: &Address,
        plugins: &[Address],
        weights: &[u128],
        now: Timestamp,
    ) -> Result<u128> {
        if plugins.len() != weights.len() {
            return Err(VoterError::LengthMismatch {
                plugins: plugins.len(),
                weights: weights.len(),
            }
            .into());
        }
        let power = vtoken.balance_of(account);
        if power == 0 {
            return Err(VoterError::ZeroVotingPower.into());
        }
        self.check_new_epoch(account, now)?;

        let mut seen = HashSet::new();
        let mut alive = Vec::with_capacity(plugins.len());
        let mut total_vote_weight = 0u128;
        for (plugin, weight) in plugins.iter().zip(weights) {
            let record = self
                .registry
                .get(plugin)
                .ok_or(VoterError::UnknownPlugin(*plugin))?;
            if !seen.insert(*plugin) {
                return Err(VoterError::DuplicateVote(*plugin).into());
            }
            if record.status == GaugeStatus::Alive {
                total_vote_weight = checked_add(total_vote_weight, *weight)?;
                alive.push((*plugin, *record, *weight));
            }
        }

        self.reset_votes(account, now)?;

        let mut used = 0u128;
        let mut allocation = Vec::with_capacity(alive.len());
        for (plugin, record, weight) in alive {
            let plugin_weight = if total_vote_weight == 0 {
                0
            } else {
                mul_div(weight, power, total_vote_weight)?
            };
            if plugin_weight == 0 {
                return Err(VoterError::InvalidZeroInput.into());
            }
            self.update_for(&record.gauge)?;
            let total = checked_add(self.weight_of(&plugin), plugin_weight)?;
            self.weights.insert(plugin, total);
            self.total_weight = checked_add(self.total_weight, plugin_weight)?;
            let voter = self.address;
            let bribe = self
                .bribes
                .get_mut(&record.bribe)
                .ok_or(VoterError::UnknownBribe(record.bribe))?;
            bribe.deposit(&voter, account, plugin_weight, now)?;
            allocation.push((plugin, plugin_weight));
            used = checked_add(used, plugin_weight)?;
        }
        debug_assert!(used <= power);

        if allocation.is_empty() {
            self.votes.remove(account);
        } else {
            self.votes.insert(*account, allocation);
        }
        if used > 0 {
            self.used_weights.insert(*account, used);
        }
        self.last_voted.insert(*account, now);
        debug!(%account, power, used, "vote");
        Ok(used)
    }

    /// Clear `account`'s allocation
    pub fn reset(&mut self, account: &Address, now: Timestamp) -> Result<()> {
        self.check_new_epoch(account, now)?;
        self.last_voted.insert(*account, now);
        self.reset_votes(account, now)
    }

    fn reset_votes(&mut self, account: &Address, now: Timestamp) -> Result<()> {
        let Some(previous) = self.votes.remove(account) else {
            self.used_weights.remove(account);
            return Ok(());
        };
        let voter = self.address;
        for (plugin, weight) in previous {
            let record = *self
                .registry
                .get(&plugin)
                .ok_or(VoterError::UnknownPlugin(plugin))?;
            self.update_for(&record.gauge)?;
            let remaining = checked_sub(self.weight_of(&plugin), weight)?;
            self.weights.insert(plugin, remaining);
            if record.status == GaugeStatus::Alive {
                self.total_weight = checked_sub(self.total_weight, weight)?;
            }
            let bribe = self
                .bribes
                .get_mut(&record.bribe)
                .ok_or(VoterError::UnknownBribe(record.bribe))?;
            bribe.withdraw(&voter, account, weight, now)?;
        }
        self.used_weights.remove(account);
        debug!(%account, "votes reset");
        Ok(())
    }

    // ---- emissions ----

    /// Account for `amount` OTOKEN the minter just sent
    pub fn notify_reward_amount(&mut self, caller: &Address, amount: u128) -> Result<()> {
        if *caller != self.minter || self.state != VoterState::Initialized {
            return Err(VoterError::NotMinter(*caller).into());
        }
        let total = checked_add(amount, self.carry)?;
        if self.total_weight == 0 {
            self.carry = total;
            debug!(carried = total, "no live weight, emission carried");
            return Ok(());
        }
        let ratio = mul_div(total, PRECISION, self.total_weight)?;
        if ratio == 0 {
            self.carry = total;
            return Ok(());
        }
        self.index = checked_add(self.index, ratio)?;
        self.carry = 0;
        debug!(amount, index = self.index, "voter notified");
        Ok(())
    }

    fn update_for(&mut self, gauge: &Address) -> Result<()> {
        let share = self.unsettled_share(gauge)?;
        self.supply_index.insert(*gauge, self.index);
        if share > 0 {
            let owed = checked_add(self.claimable.get(gauge).copied().unwrap_or(0), share)?;
            self.claimable.insert(*gauge, owed);
        }
        Ok(())
    }

    /// Push `gauge`'s claimable share into its stream. Returns the amount sent.
    pub fn distribute(&mut self, bank: &mut Bank, gauge: &Address, now: Timestamp) -> Result<u128> {
        if !self.plugin_of_gauge.contains_key(gauge) {
            return Err(VoterError::UnknownGauge(*gauge).into());
        }
        self.update_for(gauge)?;
        let owed = self.claimable.get(gauge).copied().unwrap_or(0);
        let otoken = self.bindings.otoken;
        let voter = self.address;
        let target = self
            .gauges
            .get_mut(gauge)
            .ok_or(VoterError::UnknownGauge(*gauge))?;
        if owed <= target.left(otoken, now) || owed / u128::from(target.duration()) == 0 {
            return Ok(0);
        }
        self.claimable.insert(*gauge, 0);
        target.notify_reward_amount(bank, &voter, otoken, owed, now)?;
        debug!(%gauge, amount = owed, "emission distributed");
        Ok(owed)
    }

    /// Distribute to every registered gauge
    pub fn distribute_all(&mut self, bank: &mut Bank, now: Timestamp) -> Result<u128> {
        let gauges: Vec<Address> = self
            .plugins
            .iter()
            .filter_map(|p| self.registry.get(p).map(|r| r.gauge))
            .collect();
        let mut sent = 0u128;
        for gauge in gauges {
            sent = checked_add(sent, self.distribute(bank, &gauge, now)?)?;
        }
        Ok(sent)
    }

    // ---- claims ----

    /// Claim gauge rewards for `account`. All or nothing.
    pub fn claim_rewards(
        &mut self,
        bank: &mut Bank,
        account: &Address,
        gauges: &[Address],
        now: Timestamp,
    ) -> Result<Vec<(Address, Asset, u128)>> {
        let mut paid = Vec::new();
        for gauge in gauges {
            let target = self
                .gauges
                .get_mut(gauge)
                .ok_or(VoterError::UnknownGauge(*gauge))?;
            for (asset, amount) in target.get_reward(bank, account, now)? {
                paid.push((*gauge, asset, amount));
            }
        }
        Ok(paid)
    }

    /// Claim bribes for `account`. All or nothing.
    pub fn claim_bribes(
        &mut self,
        bank: &mut Bank,
        account: &Address,
        bribes: &[Address],
        now: Timestamp,
    ) -> Result<Vec<(Address, Asset, u128)>> {
        let mut paid = Vec::new();
        for bribe in bribes {
            let target = self
                .bribes
                .get_mut(bribe)
                .ok_or(VoterError::UnknownBribe(*bribe))?;
            for (asset, amount) in target.get_reward(bank, account, now)? {
                paid.push((*bribe, asset, amount));
            }
        }
        Ok(paid)
    }
}

/// Voter errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VoterError {
    #[error("Voter: {0} is not the minter")]
    NotMinter(Address),

    #[error("Voter: already initialized")]
    AlreadyInitialized,

    #[error("Voter: {0} is not the owner")]
    NotOwner(Address),

    #[error("Voter: plugin {0} already exists")]
    PluginExists(Address),

    #[error("Voter: unknown plugin {0}")]
    UnknownPlugin(Address),

    #[error("Voter: unknown gauge {0}")]
    UnknownGauge(Address),

    #[error("Voter: unknown bribe {0}")]
    UnknownBribe(Address),

    #[error("Voter: {plugins} plugins but {weights} weights")]
    LengthMismatch { plugins: usize, weights: usize },

    #[error("Voter: zero voting power")]
    ZeroVotingPower,

    #[error("Voter: already voted this epoch")]
    AlreadyVotedThisEpoch,

    #[error("Voter: duplicate vote for {0}")]
    DuplicateVote(Address),

    #[error("Voter: invalid zero input")]
    InvalidZeroInput,

    #[error("Voter: gauge {0} already killed")]
    GaugeAlreadyKilled(Address),
}

impl VoterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotMinter(_) | Self::NotOwner(_) => ErrorKind::Authorization,
            Self::UnknownPlugin(_)
            | Self::UnknownGauge(_)
            | Self::UnknownBribe(_)
            | Self::LengthMismatch { .. }
            | Self::DuplicateVote(_)
            | Self::InvalidZeroInput => ErrorKind::InvalidInput,
            Self::ZeroVotingPower => ErrorKind::EconomicLimit,
            Self::AlreadyInitialized
            | Self::PluginExists(_)
            | Self::AlreadyVotedThisEpoch
            | Self::GaugeAlreadyKilled(_) => ErrorKind::StateMachine,
        }
    }
}
