//! Scenario files: a deployer label, a start time and a list of steps.
//!
//! ```toml
//! deployer = "owner"
//! start = 0
//!
//! [[step]]
//! action = "fund"
//! account = "user0"
//! asset = "BASE"
//! amount = "100"
//!
//! [[step]]
//! action = "buy"
//! account = "user0"
//! amount = "10"
//! ```
//!
//! Accounts are labels hashed into addresses. `BASE`, `TOKEN` and `OTOKEN`
//! name the protocol assets; any other asset symbol is an external token.
//! Plugins are referred to by the `name` given when they were created.

use anyhow::{anyhow, bail, Context};
use bondfloor_economics::market::SwapParams;
use bondfloor_economics::math::parse_units;
use bondfloor_economics::plugin::PluginSpec;
use bondfloor_economics::views::{self, BondingCurve, BribeCard, GaugeCard, SwapCard};
use bondfloor_economics::{Address, Asset, Chain, ManualClock, PluginKind, PriceOracle, Protocol};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_deployer")]
    pub deployer: String,
    #[serde(default)]
    pub start: u64,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_deployer() -> String {
    "owner".into()
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

/// A token amount, or `"max"` where the step can work one out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amount {
    Exact(u128),
    Max,
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Whole(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Whole(n) => Ok(Self::Exact(u128::from(n) * bondfloor_economics::ONE)),
            Raw::Text(s) if s.eq_ignore_ascii_case("max") => Ok(Self::Max),
            Raw::Text(s) => parse_units(&s)
                .map(Self::Exact)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Advance { seconds: u64 },
    Fund { account: String, asset: String, amount: Amount },
    Buy {
        account: String,
        amount: Amount,
        #[serde(default)]
        referrer: Option<String>,
    },
    Sell {
        account: String,
        amount: Amount,
        #[serde(default)]
        referrer: Option<String>,
    },
    Borrow { account: String, amount: Amount },
    Repay { account: String, amount: Amount },
    Exercise { account: String, amount: Amount },
    Redeem { account: String, amount: Amount },
    Deposit { account: String, amount: Amount },
    Withdraw { account: String, amount: Amount },
    BurnFor { account: String, to: String, amount: Amount },
    GetReward { account: String },
    DistributeFees,
    CreatePlugin {
        name: String,
        symbol: String,
        kind: PluginKind,
        #[serde(default)]
        protocol: String,
        #[serde(default)]
        bribe_tokens: Vec<String>,
    },
    AddPlugin { plugin: String },
    KillGauge { plugin: String },
    Vote { account: String, plugins: Vec<String>, weights: Vec<u128> },
    Reset { account: String },
    Distro,
    PluginDeposit { account: String, plugin: String, amount: Amount },
    PluginWithdraw { account: String, plugin: String, amount: Amount },
    DepositBribe { account: String, plugin: String, asset: String, amount: Amount },
    DistributeToBribes { plugins: Vec<String> },
    ClaimRewards { account: String, plugins: Vec<String> },
    ClaimBribes { account: String, plugins: Vec<String> },
}

impl Step {
    fn action(&self) -> &'static str {
        match self {
            Self::Advance { .. } => "advance",
            Self::Fund { .. } => "fund",
            Self::Buy { .. } => "buy",
            Self::Sell { .. } => "sell",
            Self::Borrow { .. } => "borrow",
            Self::Repay { .. } => "repay",
            Self::Exercise { .. } => "exercise",
            Self::Redeem { .. } => "redeem",
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::BurnFor { .. } => "burn_for",
            Self::GetReward { .. } => "get_reward",
            Self::DistributeFees => "distribute_fees",
            Self::CreatePlugin { .. } => "create_plugin",
            Self::AddPlugin { .. } => "add_plugin",
            Self::KillGauge { .. } => "kill_gauge",
            Self::Vote { .. } => "vote",
            Self::Reset { .. } => "reset",
            Self::Distro => "distro",
            Self::PluginDeposit { .. } => "plugin_deposit",
            Self::PluginWithdraw { .. } => "plugin_withdraw",
            Self::DepositBribe { .. } => "deposit_bribe",
            Self::DistributeToBribes { .. } => "distribute_to_bribes",
            Self::ClaimRewards { .. } => "claim_rewards",
            Self::ClaimBribes { .. } => "claim_bribes",
        }
    }
}

/// Outcome of one step
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final state summary printed by `simulate`
#[derive(Debug, Serialize)]
pub struct Report {
    pub time: u64,
    pub steps: Vec<StepReport>,
    pub reserves_consistent: bool,
    pub swap_card: SwapCard,
    pub accounts: BTreeMap<String, BondingCurve>,
    pub gauges: BTreeMap<String, GaugeCard>,
    pub bribes: BTreeMap<String, BribeCard>,
}

/// Executes steps against a chain, tracking the names scenario files use
#[derive(Debug)]
pub struct Runner {
    chain: Chain,
    clock: Arc<ManualClock>,
    deployer: Address,
    accounts: BTreeMap<String, Address>,
    plugins: BTreeMap<String, Address>,
}

impl Runner {
    /// Start a runner over a freshly deployed protocol
    pub fn new(protocol: Protocol, deployer_label: &str) -> Self {
        let clock = Arc::new(ManualClock::new(protocol.now()));
        let chain = Chain::new(protocol, clock.clone());
        let deployer = Address::from_label(deployer_label);
        let mut accounts = BTreeMap::new();
        accounts.insert(deployer_label.to_string(), deployer);
        Self {
            chain,
            clock,
            deployer,
            accounts,
            plugins: BTreeMap::new(),
        }
    }

    pub fn snapshot(&self) -> Protocol {
        self.chain.snapshot()
    }

    fn account(&mut self, label: &str) -> Address {
        *self
            .accounts
            .entry(label.to_string())
            .or_insert_with(|| Address::from_label(label))
    }

    fn plugin(&self, name: &str) -> anyhow::Result<Address> {
        self.plugins
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown plugin '{name}'"))
    }

    fn plugin_list(&self, names: &[String]) -> anyhow::Result<Vec<Address>> {
        names.iter().map(|n| self.plugin(n)).collect()
    }

    fn record_of(&self, name: &str, gauge: bool) -> anyhow::Result<Address> {
        let plugin = self.plugin(name)?;
        self.chain
            .read(|p| {
                let voter = p.voter();
                if gauge {
                    voter.gauge_of(&plugin)
                } else {
                    voter.bribe_of(&plugin)
                }
            })
            .ok_or_else(|| anyhow!("plugin '{name}' is not registered"))
    }

    fn exact(amount: Amount, max: impl FnOnce() -> anyhow::Result<u128>) -> anyhow::Result<u128> {
        match amount {
            Amount::Exact(n) => Ok(n),
            Amount::Max => max(),
        }
    }

    /// Apply one step. Returns an error if the step was rejected.
    pub fn apply(&mut self, step: &Step) -> anyhow::Result<()> {
        let chain = self.chain.clone();
        match step {
            Step::Advance { seconds } => {
                self.clock.advance(*seconds);
                chain.submit(|_| Ok(()))?;
            }
            Step::Fund { account, asset, amount } => {
                let who = self.account(account);
                let asset = chain.read(|p| resolve_asset(p, asset));
                let Amount::Exact(amount) = *amount else {
                    bail!("fund needs an exact amount");
                };
                chain.submit(|p| p.fund(asset, &who, amount))?;
            }
            Step::Buy { account, amount, referrer } | Step::Sell { account, amount, referrer } => {
                let who = self.account(account);
                let referrer = referrer.as_deref().map(|r| self.account(r));
                let buying = matches!(step, Step::Buy { .. });
                let amount_in = Self::exact(*amount, || {
                    chain.read(|p| -> anyhow::Result<u128> {
                        if buying {
                            Ok(p.balance_of(p.base(), &who))
                        } else {
                            Ok(p.get_max_sell()?.min(p.balance_of(p.token(), &who)))
                        }
                    })
                })?;
                let params = SwapParams {
                    amount_in,
                    min_amount_out: 1,
                    deadline: u64::MAX,
                    to: who,
                    referrer,
                };
                if buying {
                    chain.submit(|p| p.buy(&who, params))?;
                } else {
                    chain.submit(|p| p.sell(&who, params))?;
                }
            }
            Step::Borrow { account, amount } => {
                let who = self.account(account);
                let amount = Self::exact(*amount, || Ok(chain.read(|p| p.get_account_credit(&who))?))?;
                chain.submit(|p| p.borrow(&who, amount))?;
            }
            Step::Repay { account, amount } => {
                let who = self.account(account);
                let amount = Self::exact(*amount, || Ok(chain.read(|p| p.market().debt_of(&who))))?;
                chain.submit(|p| p.repay(&who, amount))?;
            }
            Step::Exercise { account, amount } => {
                let who = self.account(account);
                let amount = Self::exact(*amount, || {
                    Ok(chain.read(|p| p.balance_of(p.otoken_asset(), &who)))
                })?;
                chain.submit(|p| p.exercise(&who, amount, &who))?;
            }
            Step::Redeem { account, amount } => {
                let who = self.account(account);
                let amount = Self::exact(*amount, || Ok(chain.read(|p| p.balance_of(p.token(), &who))))?;
                chain.submit(|p| p.redeem(&who, amount, &who))?;
            }
            Step::Deposit { account, amount } => {
                let who = self.account(account);
                let amount = Self::exact(*amount, || Ok(chain.read(|p| p.balance_of(p.token(), &who))))?;
                chain.submit(|p| p.deposit(&who, amount))?;
            }
            Step::Withdraw { account, amount } => {
                let who = self.account(account);
                let amount = Self::exact(*amount, || {
                    Ok(chain.read(|p| p.vtoken().max_withdraw(&who, p.withdraw_locks(&who))))
                })?;
                chain.submit(|p| p.withdraw(&who, amount))?;
            }
            Step::BurnFor { account, to, amount } => {
                let who = self.account(account);
                let to = self.account(to);
                let amount = Self::exact(*amount, || {
                    Ok(chain.read(|p| p.balance_of(p.otoken_asset(), &who)))
                })?;
                chain.submit(|p| p.burn_for(&who, &to, amount))?;
            }
            Step::GetReward { account } => {
                let who = self.account(account);
                chain.submit(|p| p.get_reward(&who))?;
            }
            Step::DistributeFees => {
                chain.submit(|p| p.distribute_fees())?;
            }
            Step::CreatePlugin {
                name,
                symbol,
                kind,
                protocol,
                bribe_tokens,
            } => {
                if self.plugins.contains_key(name) {
                    bail!("plugin '{name}' already exists");
                }
                let spec = chain.read(|p| PluginSpec {
                    underlying: Asset::external(symbol),
                    protocol: protocol.clone(),
                    symbol: symbol.clone(),
                    kind: *kind,
                    tokens_in_underlying: vec![Asset::external(symbol)],
                    bribe_tokens: bribe_tokens.iter().map(|t| resolve_asset(p, t)).collect(),
                });
                let deployer = self.deployer;
                let address = chain.submit(|p| p.create_plugin(&deployer, spec))?;
                self.plugins.insert(name.clone(), address);
            }
            Step::AddPlugin { plugin } => {
                let plugin = self.plugin(plugin)?;
                let deployer = self.deployer;
                chain.submit(|p| p.add_plugin(&deployer, &plugin))?;
            }
            Step::KillGauge { plugin } => {
                let gauge = self.record_of(plugin, true)?;
                let deployer = self.deployer;
                chain.submit(|p| p.kill_gauge(&deployer, &gauge))?;
            }
            Step::Vote { account, plugins, weights } => {
                let who = self.account(account);
                let plugins = self.plugin_list(plugins)?;
                chain.submit(|p| p.vote(&who, &plugins, weights))?;
            }
            Step::Reset { account } => {
                let who = self.account(account);
                chain.submit(|p| p.reset(&who))?;
            }
            Step::Distro => {
                chain.submit(|p| p.distro())?;
            }
            Step::PluginDeposit { account, plugin, amount } => {
                let who = self.account(account);
                let plugin = self.plugin(plugin)?;
                let amount = Self::exact(*amount, || {
                    chain
                        .read(|p| p.plugin(&plugin).map(|x| p.balance_of(x.underlying(), &who)))
                        .ok_or_else(|| anyhow!("unknown plugin"))
                })?;
                chain.submit(|p| p.plugin_deposit(&who, &plugin, &who, amount))?;
            }
            Step::PluginWithdraw { account, plugin, amount } => {
                let who = self.account(account);
                let plugin = self.plugin(plugin)?;
                let amount = Self::exact(*amount, || {
                    chain
                        .read(|p| p.plugin(&plugin).map(|x| x.balance_of(&who)))
                        .ok_or_else(|| anyhow!("unknown plugin"))
                })?;
                chain.submit(|p| p.plugin_withdraw(&who, &plugin, &who, amount))?;
            }
            Step::DepositBribe { account, plugin, asset, amount } => {
                let who = self.account(account);
                let plugin = self.plugin(plugin)?;
                let asset = chain.read(|p| resolve_asset(p, asset));
                let amount = Self::exact(*amount, || Ok(chain.read(|p| p.balance_of(asset, &who))))?;
                chain.submit(|p| p.deposit_bribe(&who, &plugin, asset, amount))?;
            }
            Step::DistributeToBribes { plugins } => {
                let plugins = self.plugin_list(plugins)?;
                chain.submit(|p| p.distribute_to_bribes(&plugins))?;
            }
            Step::ClaimRewards { account, plugins } => {
                let who = self.account(account);
                let gauges = plugins
                    .iter()
                    .map(|n| self.record_of(n, true))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                chain.submit(|p| p.claim_rewards(&who, &gauges))?;
            }
            Step::ClaimBribes { account, plugins } => {
                let who = self.account(account);
                let bribes = plugins
                    .iter()
                    .map(|n| self.record_of(n, false))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                chain.submit(|p| p.claim_bribes(&who, &bribes))?;
            }
        }
        Ok(())
    }

    /// Run every step. With `strict`, stop at the first rejected step.
    pub fn run(&mut self, steps: &[Step], strict: bool) -> anyhow::Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let outcome = self.apply(step);
            let error = outcome.as_ref().err().map(|e| format!("{e:#}"));
            if let Some(error) = &error {
                tracing::warn!(index, action = step.action(), %error, "step rejected");
                if strict {
                    bail!("step {index} ({}) failed: {error}", step.action());
                }
            }
            reports.push(StepReport {
                index,
                action: step.action(),
                ok: error.is_none(),
                error,
            });
        }
        Ok(reports)
    }

    pub fn report(&self, steps: Vec<StepReport>, oracle: &dyn PriceOracle) -> anyhow::Result<Report> {
        let snapshot = self.chain.snapshot();
        let mut accounts = BTreeMap::new();
        for (label, address) in &self.accounts {
            accounts.insert(
                label.clone(),
                views::bonding_curve(&snapshot, oracle, Some(address))?,
            );
        }
        let mut gauges = BTreeMap::new();
        let mut bribes = BTreeMap::new();
        for (name, plugin) in &self.plugins {
            if snapshot.voter().record(plugin).is_none() {
                continue;
            }
            gauges.insert(name.clone(), views::gauge_card(&snapshot, plugin, None)?);
            bribes.insert(name.clone(), views::bribe_card(&snapshot, plugin, None)?);
        }
        Ok(Report {
            time: snapshot.now(),
            steps,
            reserves_consistent: snapshot.reserves_consistent(),
            swap_card: views::swap_card(&snapshot)?,
            accounts,
            gauges,
            bribes,
        })
    }
}

/// Map a scenario asset symbol to an asset
pub fn resolve_asset(protocol: &Protocol, symbol: &str) -> Asset {
    match symbol {
        "BASE" => protocol.base(),
        "TOKEN" => protocol.token(),
        "OTOKEN" => protocol.otoken_asset(),
        other => Asset::external(other),
    }
}
