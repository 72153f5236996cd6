//! # Read Views
//!
//! Front-end aggregates over a [`Protocol`]: the swap card, the bonding-curve
//! dashboard, per-plugin gauge and bribe cards, and swap quotes. Nothing in
//! here mutates state.
//!
//! Percentages are 18-decimal fixed point (`5 * ONE` is 5%). USD figures use
//! the injected [`PriceOracle`] for BASE and derive TOKEN and OTOKEN prices
//! from the curve.
//!
//! ## Quotes
//!
//! Every quote takes a slippage tolerance in basis points of the output the
//! caller is willing to accept (`9_800` accepts 2% less than quoted) and
//! returns:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `output` | Amount out (`*_in` quotes) or amount in (`*_out` quotes) |
//! | `slippage` | Price impact against the current spot price, percent |
//! | `min_output` | Quoted receive amount scaled by the tolerance |
//! | `auto_min_output` | Receive amount less a fixed 1% buffer |

use crate::constants::{DIVISOR, ONE};
use crate::error::{ErrorKind, Result};
use crate::market::Market;
use crate::math::{checked_add, mul_div, mul_div_ceil, units};
use crate::oracle::PriceOracle;
use crate::plugin::PluginKind;
use crate::protocol::Protocol;
use crate::types::{Address, Asset};
use crate::voter::GaugeStatus;
use serde::{Deserialize, Serialize};

const YEAR: u128 = 365 * 24 * 3600;

/// Buffer applied to `auto_min_output`
pub const AUTO_SLIPPAGE_BUFFER_BPS: u128 = 100;

const HUNDRED_PERCENT: u128 = 100 * ONE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapCard {
    #[serde(with = "units")]
    pub fr_base: u128,
    #[serde(with = "units")]
    pub mrv_base: u128,
    #[serde(with = "units")]
    pub mrr_base: u128,
    #[serde(with = "units")]
    pub mrr_token: u128,
    #[serde(with = "units")]
    pub market_max_token: u128,
}

pub fn swap_card(protocol: &Protocol) -> Result<SwapCard> {
    let market = protocol.market();
    let reserves = market.reserves();
    Ok(SwapCard {
        fr_base: reserves.fr_base,
        mrv_base: reserves.mrv_base,
        mrr_base: reserves.mrr_base,
        mrr_token: reserves.mrr_token,
        market_max_token: market.market_max_token()?,
    })
}

/// USD prices, 18 decimals
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prices {
    #[serde(with = "units")]
    pub base: u128,
    #[serde(with = "units")]
    pub token: u128,
    #[serde(with = "units")]
    pub otoken: u128,
}

impl Prices {
    /// Price `asset` if it is one the curve knows about
    fn of(&self, protocol: &Protocol, asset: Asset) -> u128 {
        if asset == protocol.base() {
            self.base
        } else if asset == protocol.token() {
            self.token
        } else if asset == protocol.otoken_asset() {
            self.otoken
        } else {
            0
        }
    }
}

pub fn prices(protocol: &Protocol, oracle: &dyn PriceOracle) -> Result<Prices> {
    let market = protocol.market();
    let base = oracle.base_price();
    let market_price = market.market_price()?;
    let option_value = market_price.saturating_sub(market.floor_price());
    Ok(Prices {
        base,
        token: mul_div(market_price, base, ONE)?,
        otoken: mul_div(option_value, base, ONE)?,
    })
}

/// One account's position across market, vote escrow and rewarder
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(with = "units")]
    pub balance_base: u128,
    #[serde(with = "units")]
    pub balance_token: u128,
    #[serde(with = "units")]
    pub balance_otoken: u128,
    /// Voting power
    #[serde(with = "units")]
    pub balance_vtoken: u128,
    /// Staked TOKEN principal
    #[serde(with = "units")]
    pub staked_token: u128,
    /// Unclaimed rewarder balances
    pub earned: Vec<Earned>,
    #[serde(with = "units")]
    pub used_weight: u128,
    #[serde(with = "units")]
    pub borrow_credit: u128,
    #[serde(with = "units")]
    pub borrow_debt: u128,
    #[serde(with = "units")]
    pub max_withdraw: u128,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earned {
    pub asset: Asset,
    #[serde(with = "units")]
    pub amount: u128,
}

/// Bonding-curve dashboard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondingCurve {
    pub prices: Prices,
    /// BASE held by the market (floor plus curve) in USD
    #[serde(with = "units")]
    pub tvl: u128,
    #[serde(with = "units")]
    pub supply_token: u128,
    #[serde(with = "units")]
    pub supply_otoken: u128,
    #[serde(with = "units")]
    pub supply_vtoken: u128,
    /// Annualised rewarder yield on staked TOKEN, percent
    #[serde(with = "units")]
    pub apr: u128,
    /// Floor price over market price, percent
    #[serde(with = "units")]
    pub ltv: u128,
    /// Market price over floor price, 18 decimals
    #[serde(with = "units")]
    pub ratio: u128,
    pub account: Option<AccountData>,
}

pub fn bonding_curve(
    protocol: &Protocol,
    oracle: &dyn PriceOracle,
    account: Option<&Address>,
) -> Result<BondingCurve> {
    let market = protocol.market();
    let vtoken = protocol.vtoken();
    let rewarder = protocol.rewarder();
    let bank = protocol.bank();
    let now = protocol.now();
    let prices = prices(protocol, oracle)?;
    let market_price = market.market_price()?;

    let reserve_base = checked_add(market.fr_base(), market.reserves().mrr_base)?;
    let tvl = mul_div(reserve_base, prices.base, ONE)?;

    let mut yearly_usd = 0u128;
    for &asset in rewarder.reward_tokens() {
        let Some(data) = rewarder.stream().reward_data(asset) else {
            continue;
        };
        if now >= data.period_finish {
            continue;
        }
        let yearly = data.reward_rate.saturating_mul(YEAR);
        yearly_usd = checked_add(yearly_usd, mul_div(yearly, prices.of(protocol, asset), ONE)?)?;
    }
    let staked_usd = mul_div(vtoken.total_supply_token(), prices.token, ONE)?;
    let apr = if staked_usd == 0 {
        0
    } else {
        mul_div(yearly_usd, HUNDRED_PERCENT, staked_usd)?
    };

    let account = match account {
        Some(who) => {
            let mut earned = Vec::new();
            for &asset in rewarder.reward_tokens() {
                earned.push(Earned {
                    asset,
                    amount: rewarder.earned(who, asset, now)?,
                });
            }
            Some(AccountData {
                balance_base: bank.balance_of(protocol.base(), who),
                balance_token: bank.balance_of(protocol.token(), who),
                balance_otoken: bank.balance_of(protocol.otoken_asset(), who),
                balance_vtoken: vtoken.balance_of(who),
                staked_token: vtoken.balance_of_token(who),
                earned,
                used_weight: protocol.voter().used_weight(who),
                borrow_credit: market.get_account_credit(vtoken, who)?,
                borrow_debt: market.debt_of(who),
                max_withdraw: vtoken.max_withdraw(who, protocol.withdraw_locks(who)),
            })
        }
        None => None,
    };

    Ok(BondingCurve {
        prices,
        tvl,
        supply_token: bank.total_supply(protocol.token()),
        supply_otoken: bank.total_supply(protocol.otoken_asset()),
        supply_vtoken: vtoken.total_supply(),
        apr,
        ltv: mul_div(market.floor_price(), HUNDRED_PERCENT, market_price)?,
        ratio: mul_div(market_price, ONE, market.floor_price())?,
        account,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeCard {
    pub plugin: Address,
    pub gauge: Address,
    pub symbol: String,
    pub kind: PluginKind,
    pub underlying: Asset,
    pub alive: bool,
    #[serde(with = "units")]
    pub total_supply: u128,
    #[serde(with = "units")]
    pub voting_weight: u128,
    /// Share of live voting weight, percent
    #[serde(with = "units")]
    pub voting_percent: u128,
    /// OTOKEN still to stream from the current window
    #[serde(with = "units")]
    pub reward_left: u128,
    pub account: Option<GaugeAccount>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeAccount {
    #[serde(with = "units")]
    pub balance_underlying: u128,
    #[serde(with = "units")]
    pub deposited: u128,
    #[serde(with = "units")]
    pub earned_otoken: u128,
}

pub fn gauge_card(protocol: &Protocol, plugin: &Address, account: Option<&Address>) -> Result<GaugeCard> {
    let voter = protocol.voter();
    let record = voter
        .record(plugin)
        .ok_or(QuoteError::UnknownPlugin(*plugin))?;
    let target = protocol
        .plugin(plugin)
        .ok_or(QuoteError::UnknownPlugin(*plugin))?;
    let gauge = voter
        .gauge(&record.gauge)
        .ok_or(QuoteError::UnknownPlugin(*plugin))?;
    let now = protocol.now();
    let otoken = protocol.otoken_asset();
    let alive = record.status == GaugeStatus::Alive;

    let voting_weight = voter.weight_of(plugin);
    let voting_percent = if alive && voter.total_weight() > 0 {
        mul_div(voting_weight, HUNDRED_PERCENT, voter.total_weight())?
    } else {
        0
    };

    let account = match account {
        Some(who) => Some(GaugeAccount {
            balance_underlying: protocol.balance_of(target.underlying(), who),
            deposited: target.balance_of(who),
            earned_otoken: gauge.earned(who, otoken, now)?,
        }),
        None => None,
    };

    Ok(GaugeCard {
        plugin: *plugin,
        gauge: record.gauge,
        symbol: target.spec().symbol.clone(),
        kind: target.kind(),
        underlying: target.underlying(),
        alive,
        total_supply: gauge.total_supply(),
        voting_weight,
        voting_percent,
        reward_left: gauge.left(otoken, now),
        account,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BribeCard {
    pub plugin: Address,
    pub bribe: Address,
    pub symbol: String,
    pub rewards: Vec<BribeReward>,
    /// Voting weight currently backing this bribe
    #[serde(with = "units")]
    pub total_votes: u128,
    pub account: Option<BribeAccount>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BribeReward {
    pub asset: Asset,
    /// Tokens still to stream
    #[serde(with = "units")]
    pub left: u128,
    /// Tokens released per second
    #[serde(with = "units")]
    pub rate: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BribeAccount {
    #[serde(with = "units")]
    pub votes: u128,
    pub earned: Vec<Earned>,
}

pub fn bribe_card(protocol: &Protocol, plugin: &Address, account: Option<&Address>) -> Result<BribeCard> {
    let voter = protocol.voter();
    let record = voter
        .record(plugin)
        .ok_or(QuoteError::UnknownPlugin(*plugin))?;
    let target = protocol
        .plugin(plugin)
        .ok_or(QuoteError::UnknownPlugin(*plugin))?;
    let bribe = voter
        .bribe(&record.bribe)
        .ok_or(QuoteError::UnknownPlugin(*plugin))?;
    let now = protocol.now();

    let rewards = bribe
        .reward_tokens()
        .iter()
        .map(|&asset| {
            let rate = bribe
                .stream()
                .reward_data(asset)
                .filter(|d| now < d.period_finish)
                .map(|d| d.reward_rate)
                .unwrap_or(0);
            BribeReward {
                asset,
                left: bribe.left(asset, now),
                rate,
            }
        })
        .collect();

    let account = match account {
        Some(who) => {
            let mut earned = Vec::new();
            for &asset in bribe.reward_tokens() {
                earned.push(Earned {
                    asset,
                    amount: bribe.earned(who, asset, now)?,
                });
            }
            Some(BribeAccount {
                votes: bribe.balance_of(who),
                earned,
            })
        }
        None => None,
    };

    Ok(BribeCard {
        plugin: *plugin,
        bribe: record.bribe,
        symbol: target.spec().symbol.clone(),
        rewards,
        total_votes: bribe.total_supply(),
        account,
    })
}

/// Result of a swap quote
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(with = "units")]
    pub output: u128,
    #[serde(with = "units")]
    pub slippage: u128,
    #[serde(with = "units")]
    pub min_output: u128,
    #[serde(with = "units")]
    pub auto_min_output: u128,
}

fn check_quote(amount: u128, tolerance_bps: u128) -> Result<()> {
    if amount == 0 {
        return Err(QuoteError::InvalidZeroInput.into());
    }
    if tolerance_bps > DIVISOR {
        return Err(QuoteError::InvalidTolerance(tolerance_bps).into());
    }
    Ok(())
}

/// Percent by which `actual` falls short of `ideal`
fn impact(ideal: u128, actual: u128) -> Result<u128> {
    if ideal == 0 {
        return Ok(0);
    }
    mul_div(ideal.saturating_sub(actual), HUNDRED_PERCENT, ideal)
}

fn with_floors(output: u128, received: u128, slippage: u128, tolerance_bps: u128) -> Result<Quote> {
    Ok(Quote {
        output,
        slippage,
        min_output: mul_div(received, tolerance_bps, DIVISOR)?,
        auto_min_output: mul_div(received, DIVISOR - AUTO_SLIPPAGE_BUFFER_BPS, DIVISOR)?,
    })
}

/// Net amount left after the swap fee is skimmed from `gross`
fn net_of_fee(market: &Market, gross: u128) -> Result<u128> {
    Ok(gross - market.split_fee(gross, None)?.total)
}

/// Smallest gross input whose net after the fee is at least `net`
fn gross_for_net(market: &Market, net: u128) -> Result<u128> {
    let gross = mul_div_ceil(net, DIVISOR, DIVISOR - market.swap_fee_bps())?;
    if net_of_fee(market, gross)? < net {
        return checked_add(gross, 1);
    }
    Ok(gross)
}

/// TOKEN received for `base_in` BASE
pub fn quote_buy_in(market: &Market, base_in: u128, tolerance_bps: u128) -> Result<Quote> {
    check_quote(base_in, tolerance_bps)?;
    let (out, _) = market.preview_buy(base_in)?;
    let ideal = mul_div(net_of_fee(market, base_in)?, ONE, market.market_price()?)?;
    with_floors(out, out, impact(ideal, out)?, tolerance_bps)
}

/// BASE needed to receive `token_out` TOKEN
pub fn quote_buy_out(market: &Market, token_out: u128, tolerance_bps: u128) -> Result<Quote> {
    check_quote(token_out, tolerance_bps)?;
    let reserves = market.reserves();
    if token_out >= reserves.mrr_token {
        return Err(QuoteError::ExceedsCurve {
            requested: token_out,
            available: reserves.mrr_token,
        }
        .into());
    }
    let x = checked_add(reserves.mrv_base, reserves.mrr_base)?;
    let new_y = reserves.mrr_token - token_out;
    let new_x = mul_div_ceil(x, reserves.mrr_token, new_y)?;
    let base_in = gross_for_net(market, new_x - x)?;

    let ideal_in = mul_div(token_out, market.market_price()?, ONE)?;
    let paid = net_of_fee(market, base_in)?;
    // Impact is the extra BASE paid over spot, relative to spot
    let slippage = if ideal_in == 0 {
        0
    } else {
        mul_div(paid.saturating_sub(ideal_in), HUNDRED_PERCENT, ideal_in)?
    };
    with_floors(base_in, token_out, slippage, tolerance_bps)
}

/// BASE received for `token_in` TOKEN
pub fn quote_sell_in(market: &Market, token_in: u128, tolerance_bps: u128) -> Result<Quote> {
    check_quote(token_in, tolerance_bps)?;
    let Some((out, _)) = market.preview_sell(token_in)? else {
        return Err(QuoteError::ExceedsCurve {
            requested: token_in,
            available: market.get_max_sell()?,
        }
        .into());
    };
    let ideal = mul_div(net_of_fee(market, token_in)?, market.market_price()?, ONE)?;
    with_floors(out, out, impact(ideal, out)?, tolerance_bps)
}

/// TOKEN needed to receive `base_out` BASE
pub fn quote_sell_out(market: &Market, base_out: u128, tolerance_bps: u128) -> Result<Quote> {
    check_quote(base_out, tolerance_bps)?;
    let reserves = market.reserves();
    if base_out >= reserves.mrr_base {
        return Err(QuoteError::ExceedsCurve {
            requested: base_out,
            available: reserves.mrr_base,
        }
        .into());
    }
    let x = checked_add(reserves.mrv_base, reserves.mrr_base)?;
    let new_x = x - base_out;
    let new_y = mul_div_ceil(x, reserves.mrr_token, new_x)?;
    let token_in = gross_for_net(market, new_y - reserves.mrr_token)?;
    let max_sell = market.get_max_sell()?;
    if token_in > max_sell {
        return Err(QuoteError::ExceedsCurve {
            requested: token_in,
            available: max_sell,
        }
        .into());
    }

    let ideal_in = mul_div_ceil(base_out, ONE, market.market_price()?)?;
    let paid = net_of_fee(market, token_in)?;
    let slippage = if ideal_in == 0 {
        0
    } else {
        mul_div(paid.saturating_sub(ideal_in), HUNDRED_PERCENT, ideal_in)?
    };
    with_floors(token_in, base_out, slippage, tolerance_bps)
}

/// View and quote errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("Multicall: invalid zero input")]
    InvalidZeroInput,

    #[error("Multicall: slippage tolerance {0} bps exceeds 10000")]
    InvalidTolerance(u128),

    #[error("Multicall: {requested} exceeds what the curve can fill ({available})")]
    ExceedsCurve { requested: u128, available: u128 },

    #[error("Multicall: unknown plugin {0}")]
    UnknownPlugin(Address),
}

impl QuoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidZeroInput | Self::InvalidTolerance(_) | Self::UnknownPlugin(_) => {
                ErrorKind::InvalidInput
            }
            Self::ExceedsCurve { .. } => ErrorKind::EconomicLimit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::market::SwapParams;
    use crate::oracle::FixedPriceOracle;

    fn setup() -> (Protocol, Address) {
        let deployer = Address::from_label("deployer");
        let mut protocol = Protocol::deploy_and_setup(ProtocolConfig::default(), deployer, 0).unwrap();
        let user = Address::from_label("user0");
        protocol.fund(protocol.base(), &user, 1_000 * ONE).unwrap();
        (protocol, user)
    }

    fn swap(amount_in: u128, min_amount_out: u128, to: Address) -> SwapParams {
        SwapParams {
            amount_in,
            min_amount_out,
            deadline: u64::MAX,
            to,
            referrer: None,
        }
    }

    #[test]
    fn test_quote_buy_in_matches_execution() {
        let (mut protocol, user) = setup();
        let quote = quote_buy_in(protocol.market(), 10 * ONE, 9_800).unwrap();
        assert!(quote.min_output < quote.output);
        assert!(quote.auto_min_output < quote.output);

        let out = protocol.buy(&user, swap(10 * ONE, quote.min_output, user)).unwrap();
        assert_eq!(out, quote.output);
    }

    #[test]
    fn test_quote_buy_out_delivers_at_least_requested() {
        let (mut protocol, user) = setup();
        let quote = quote_buy_out(protocol.market(), 10 * ONE, 9_700).unwrap();
        let out = protocol
            .buy(&user, swap(quote.output, quote.auto_min_output, user))
            .unwrap();
        assert!(out >= 10 * ONE);
    }

    #[test]
    fn test_quote_sell_out_delivers_at_least_requested() {
        let (mut protocol, user) = setup();
        protocol.buy(&user, swap(100 * ONE, 1, user)).unwrap();

        let quote = quote_sell_out(protocol.market(), 5 * ONE, 9_950).unwrap();
        let out = protocol
            .sell(&user, swap(quote.output, quote.auto_min_output, user))
            .unwrap();
        assert!(out >= 5 * ONE);
    }

    #[test]
    fn test_quote_sell_in_beyond_curve() {
        let (mut protocol, user) = setup();
        protocol.buy(&user, swap(10 * ONE, 1, user)).unwrap();
        let max = protocol.get_max_sell().unwrap();

        assert!(quote_sell_in(protocol.market(), max, 9_700).is_ok());
        let err = quote_sell_in(protocol.market(), max + 1, 9_700).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Quote(QuoteError::ExceedsCurve { .. })
        ));
    }

    #[test]
    fn test_quote_input_validation() {
        let (protocol, _) = setup();
        assert_eq!(
            quote_buy_in(protocol.market(), 0, 9_800).unwrap_err(),
            QuoteError::InvalidZeroInput.into()
        );
        assert_eq!(
            quote_buy_in(protocol.market(), ONE, 10_001).unwrap_err(),
            QuoteError::InvalidTolerance(10_001).into()
        );
    }

    #[test]
    fn test_bonding_curve_account_view() {
        let (mut protocol, user) = setup();
        protocol.buy(&user, swap(100 * ONE, 1, user)).unwrap();
        let token = protocol.balance_of(protocol.token(), &user);
        protocol.deposit(&user, token).unwrap();
        protocol.borrow(&user, ONE).unwrap();

        let oracle = FixedPriceOracle::new(2 * ONE);
        let view = bonding_curve(&protocol, &oracle, Some(&user)).unwrap();
        assert_eq!(view.prices.base, 2 * ONE);
        assert!(view.prices.token > view.prices.base);
        assert!(view.ltv < 100 * ONE);

        let account = view.account.unwrap();
        assert_eq!(account.staked_token, token);
        assert_eq!(account.borrow_debt, ONE);
        assert_eq!(account.borrow_credit, token - ONE);
        assert_eq!(account.max_withdraw, 0);
        assert_eq!(account.earned.len(), 3);
    }

    #[test]
    fn test_swap_card_reflects_reserves() {
        let (mut protocol, user) = setup();
        protocol.buy(&user, swap(10 * ONE, 1, user)).unwrap();
        let card = swap_card(&protocol).unwrap();
        let reserves = protocol.market().reserves();
        assert_eq!(card.mrr_token, reserves.mrr_token);
        assert_eq!(card.fr_base, reserves.fr_base);
        assert_eq!(card.market_max_token, card.mrr_token + protocol.get_max_sell().unwrap());
    }
}
