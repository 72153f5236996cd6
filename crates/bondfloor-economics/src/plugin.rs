//! # Plugins
//!
//! A plugin wraps an external yield-bearing asset so it can take part in
//! gauge voting. Depositors hand the plugin its underlying asset and get a
//! gauge balance in return; yield the plugin harvests is collected as bribe
//! tokens and forwarded to the plugin's bribe for voters.
//!
//! | Kind | Underlying | Typical bribe tokens |
//! |------|------------|----------------------|
//! | Vault | ERC-4626 style share | the vault's share token |
//! | LiquidityPair | AMM LP token | the two pair tokens |
//! | Farm | farm receipt | the farm's reward token |

use crate::bribe::Bribe;
use crate::error::{ErrorKind, Result};
use crate::gauge::Gauge;
use crate::ledger::Bank;
use crate::math::{checked_add, checked_sub};
use crate::types::{Address, Asset, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Yield source a plugin adapts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Vault,
    LiquidityPair,
    Farm,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vault => "Vault",
            Self::LiquidityPair => "LiquidityPair",
            Self::Farm => "Farm",
        };
        f.write_str(name)
    }
}

/// Deployment parameters of a plugin
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub underlying: Asset,
    /// Protocol the yield source belongs to ("Protocol0")
    pub protocol: String,
    /// Display symbol of the underlying
    pub symbol: String,
    pub kind: PluginKind,
    /// Assets the underlying is made of
    #[serde(default)]
    pub tokens_in_underlying: Vec<Asset>,
    /// Assets the plugin harvests into its bribe
    #[serde(default)]
    pub bribe_tokens: Vec<Asset>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plugin {
    address: Address,
    spec: PluginSpec,
    voter: Address,
    gauge: Option<Address>,
    bribe: Option<Address>,
    total_supply: u128,
    balances: HashMap<Address, u128>,
    /// Harvested bribe tokens waiting for `claim_and_distribute`
    bribe_pot: BTreeMap<Asset, u128>,
}

impl Plugin {
    pub fn new(address: Address, spec: PluginSpec, voter: Address) -> Self {
        Self {
            address,
            spec,
            voter,
            gauge: None,
            bribe: None,
            total_supply: 0,
            balances: HashMap::new(),
            bribe_pot: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    pub fn underlying(&self) -> Asset {
        self.spec.underlying
    }

    pub fn kind(&self) -> PluginKind {
        self.spec.kind
    }

    pub fn bribe_tokens(&self) -> &[Asset] {
        &self.spec.bribe_tokens
    }

    pub fn get_gauge(&self) -> Option<Address> {
        self.gauge
    }

    pub fn get_bribe(&self) -> Option<Address> {
        self.bribe
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn pending_bribe(&self, asset: Asset) -> u128 {
        self.bribe_pot.get(&asset).copied().unwrap_or(0)
    }

    /// Bind the gauge and bribe created for this plugin
    pub fn attach(&mut self, caller: &Address, gauge: Address, bribe: Address) -> Result<()> {
        if *caller != self.voter {
            return Err(PluginError::NotVoter(*caller).into());
        }
        self.gauge = Some(gauge);
        self.bribe = Some(bribe);
        Ok(())
    }

    fn check_gauge(&self, gauge: &Gauge) -> Result<()> {
        if self.gauge != Some(gauge.address()) {
            return Err(PluginError::NotRegistered.into());
        }
        Ok(())
    }

    /// Pull `amount` underlying from `caller` and credit `account`
    pub fn deposit_for(
        &mut self,
        bank: &mut Bank,
        gauge: &mut Gauge,
        caller: &Address,
        account: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(PluginError::InvalidZeroInput.into());
        }
        if account.is_zero() {
            return Err(PluginError::InvalidZeroAddress.into());
        }
        self.check_gauge(gauge)?;
        bank.transfer(self.spec.underlying, caller, &self.address, amount)?;
        let balance = checked_add(self.balance_of(account), amount)?;
        self.balances.insert(*account, balance);
        self.total_supply = checked_add(self.total_supply, amount)?;
        gauge.deposit(&self.address, account, amount, now)?;
        debug!(plugin = %self.spec.symbol, %account, amount, "plugin deposit");
        Ok(())
    }

    /// Debit `caller` and send `amount` underlying to `to`
    pub fn withdraw_to(
        &mut self,
        bank: &mut Bank,
        gauge: &mut Gauge,
        caller: &Address,
        to: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(PluginError::InvalidZeroInput.into());
        }
        if to.is_zero() {
            return Err(PluginError::InvalidZeroAddress.into());
        }
        self.check_gauge(gauge)?;
        let balance = self.balance_of(caller);
        if amount > balance {
            return Err(PluginError::InsufficientBalance {
                requested: amount,
                available: balance,
            }
            .into());
        }
        self.balances.insert(*caller, balance - amount);
        self.total_supply = checked_sub(self.total_supply, amount)?;
        gauge.withdraw(&self.address, caller, amount, now)?;
        bank.transfer(self.spec.underlying, &self.address, to, amount)?;
        debug!(plugin = %self.spec.symbol, %caller, %to, amount, "plugin withdraw");
        Ok(())
    }

    /// Add harvested yield to the bribe pot
    pub fn deposit_bribe(
        &mut self,
        bank: &mut Bank,
        from: &Address,
        asset: Asset,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Err(PluginError::InvalidZeroInput.into());
        }
        if !self.spec.bribe_tokens.contains(&asset) {
            return Err(PluginError::NotBribeToken(asset).into());
        }
        bank.transfer(asset, from, &self.address, amount)?;
        let pot = checked_add(self.pending_bribe(asset), amount)?;
        self.bribe_pot.insert(asset, pot);
        Ok(())
    }

    /// Push every pot large enough to start a stream into the bribe
    pub fn claim_and_distribute(
        &mut self,
        bank: &mut Bank,
        bribe: &mut Bribe,
        now: Timestamp,
    ) -> Result<Vec<(Asset, u128)>> {
        if self.bribe != Some(bribe.address()) {
            return Err(PluginError::NotRegistered.into());
        }
        let duration = u128::from(bribe.duration());
        let mut sent = Vec::new();
        for asset in self.spec.bribe_tokens.clone() {
            let amount = self.pending_bribe(asset);
            if amount < duration || amount <= bribe.left(asset, now) {
                continue;
            }
            bribe.notify_reward_amount(bank, &self.address, asset, amount, now)?;
            self.bribe_pot.insert(asset, 0);
            sent.push((asset, amount));
        }
        Ok(sent)
    }
}

/// Plugin errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin: invalid zero input")]
    InvalidZeroInput,

    #[error("Plugin: invalid zero address")]
    InvalidZeroAddress,

    #[error("Plugin: withdraw {requested} exceeds balance {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("Plugin: {0} is not the voter")]
    NotVoter(Address),

    #[error("Plugin: not registered with the voter")]
    NotRegistered,

    #[error("Plugin: {0} is not a bribe token")]
    NotBribeToken(Asset),
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidZeroInput | Self::InvalidZeroAddress | Self::NotBribeToken(_) => {
                ErrorKind::InvalidInput
            }
            Self::InsufficientBalance { .. } => ErrorKind::EconomicLimit,
            Self::NotVoter(_) => ErrorKind::Authorization,
            Self::NotRegistered => ErrorKind::StateMachine,
        }
    }
}
