//! # Bonding-Curve Market
//!
//! TOKEN is issued against a BASE reserve split in two:
//!
//! | Reserve | Role |
//! |---------|------|
//! | `fr_base` | Floor reserve. Redeems TOKEN at 1 BASE. Grows from the floor share of every buy fee and from exercised OTOKEN; only `redeem` lowers it. |
//! | `mrv_base` | Virtual base. Fixed at construction so the curve opens at the floor price. |
//! | `mrr_base` | Real base paid into the curve by buyers. |
//! | `mrr_token` | TOKEN still held by the curve. |
//!
//! Trades move along `(mrv_base + mrr_base) * mrr_token = k` after the fee is
//! skimmed. Staked TOKEN (VTOKEN principal) can be borrowed against at the
//! floor price; outstanding debt locks the stake.
//!
//! Two identities hold after every call:
//!
//! ```text
//! mrr_base  == base_balance(market) + debt_total - fr_base
//! mrr_token == token_balance(market)
//! ```

use crate::config::MarketConfig;
use crate::constants::{DIVISOR, FLOOR_PRICE, ONE, PRECISION};
use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::math::{checked_add, checked_sub, mul_div, mul_div_ceil};
use crate::otoken::OToken;
use crate::types::{Address, Asset, Timestamp};
use crate::vtoken::VToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Arguments shared by `buy` and `sell`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    /// BASE in for a buy, TOKEN in for a sell
    pub amount_in: u128,
    /// Revert unless at least this much comes out
    pub min_amount_out: u128,
    /// Last timestamp at which the swap may execute
    pub deadline: Timestamp,
    /// Recipient of the output
    pub to: Address,
    /// Front end credited with the provider share of the fee
    #[serde(default)]
    pub referrer: Option<Address>,
}

/// How a swap fee is divided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Whole fee, rounded up
    pub total: u128,
    /// Paid to the referrer
    pub provider: u128,
    /// Captured by the floor (added to `fr_base` on buys, burned on sells)
    pub floor: u128,
    /// Sent to the fee collector
    pub collector: u128,
}

/// Snapshot of the four reserves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub fr_base: u128,
    pub mrv_base: u128,
    pub mrr_base: u128,
    pub mrr_token: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Market {
    address: Address,
    base: Asset,
    fees: Address,
    swap_fee_bps: u128,
    provider_fee_bps: u128,
    floor_fee_bps: u128,
    fr_base: u128,
    mrv_base: u128,
    mrr_base: u128,
    mrr_token: u128,
    debt_total: u128,
    debts: HashMap<Address, u128>,
}

impl Market {
    /// Mint the initial supply into the curve at the floor price
    pub fn new(
        bank: &mut Bank,
        address: Address,
        base: Asset,
        fees: Address,
        config: &MarketConfig,
    ) -> Result<Self> {
        let market = Self {
            address,
            base,
            fees,
            swap_fee_bps: u128::from(config.swap_fee_bps),
            provider_fee_bps: u128::from(config.provider_fee_bps),
            floor_fee_bps: u128::from(config.floor_fee_bps),
            fr_base: 0,
            mrv_base: config.initial_supply,
            mrr_base: 0,
            mrr_token: config.initial_supply,
            debt_total: 0,
            debts: HashMap::new(),
        };
        bank.mint(market.token(), &address, config.initial_supply)?;
        Ok(market)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// TOKEN itself; the market contract is the token contract
    pub fn token(&self) -> Asset {
        Asset::new(self.address)
    }

    pub fn base(&self) -> Asset {
        self.base
    }

    pub fn fees(&self) -> Address {
        self.fees
    }

    pub fn reserves(&self) -> Reserves {
        Reserves {
            fr_base: self.fr_base,
            mrv_base: self.mrv_base,
            mrr_base: self.mrr_base,
            mrr_token: self.mrr_token,
        }
    }

    pub fn fr_base(&self) -> u128 {
        self.fr_base
    }

    pub fn debt_total(&self) -> u128 {
        self.debt_total
    }

    pub fn debt_of(&self, account: &Address) -> u128 {
        self.debts.get(account).copied().unwrap_or(0)
    }

    pub fn swap_fee_bps(&self) -> u128 {
        self.swap_fee_bps
    }

    fn curve_base(&self) -> Result<u128> {
        checked_add(self.mrv_base, self.mrr_base)
    }

    /// Most TOKEN the curve can hold before its real base would go negative
    pub fn market_max_token(&self) -> Result<u128> {
        mul_div(self.curve_base()?, self.mrr_token, self.mrv_base)
    }

    /// Largest sell input the curve can absorb
    pub fn get_max_sell(&self) -> Result<u128> {
        Ok(self.market_max_token()?.saturating_sub(self.mrr_token))
    }

    /// BASE per TOKEN on the curve, 18 decimals
    pub fn market_price(&self) -> Result<u128> {
        mul_div(self.curve_base()?, PRECISION, self.mrr_token)
    }

    /// BASE per TOKEN against the floor reserve, 18 decimals
    pub fn floor_price(&self) -> u128 {
        FLOOR_PRICE
    }

    /// Remaining borrowable BASE for `account`
    pub fn get_account_credit(&self, vtoken: &VToken, account: &Address) -> Result<u128> {
        let limit = mul_div(vtoken.balance_of_token(account), FLOOR_PRICE, ONE)?;
        Ok(limit.saturating_sub(self.debt_of(account)))
    }

    /// Split the fee on `amount_in`
    pub fn split_fee(&self, amount_in: u128, referrer: Option<&Address>) -> Result<FeeSplit> {
        let total = mul_div_ceil(amount_in, self.swap_fee_bps, DIVISOR)?;
        let provider = match referrer {
            Some(r) if !r.is_zero() => mul_div(total, self.provider_fee_bps, DIVISOR)?,
            _ => 0,
        };
        let remainder = total - provider;
        let floor = mul_div(remainder, self.floor_fee_bps, DIVISOR)?;
        Ok(FeeSplit {
            total,
            provider,
            floor,
            collector: remainder - floor,
        })
    }

    /// TOKEN out for `base_in` and the curve after the trade
    pub fn preview_buy(&self, base_in: u128) -> Result<(u128, Reserves)> {
        let fee = self.split_fee(base_in, None)?;
        let net = base_in - fee.total;
        let x = self.curve_base()?;
        let new_x = checked_add(x, net)?;
        let new_y = mul_div(x, self.mrr_token, new_x)?;
        let out = self.mrr_token - new_y;
        let mut after = self.reserves();
        after.fr_base = checked_add(after.fr_base, fee.floor)?;
        after.mrr_base = new_x - self.mrv_base;
        after.mrr_token = new_y;
        Ok((out, after))
    }

    /// BASE out for `token_in`, or `None` when the curve cannot absorb it
    pub fn preview_sell(&self, token_in: u128) -> Result<Option<(u128, Reserves)>> {
        if checked_add(self.mrr_token, token_in)? > self.market_max_token()? {
            return Ok(None);
        }
        let fee = self.split_fee(token_in, None)?;
        let net = token_in - fee.total;
        let x = self.curve_base()?;
        let new_y = checked_add(self.mrr_token, net)?;
        let new_x = mul_div_ceil(x, self.mrr_token, new_y)?;
        let out = x - new_x;
        let mut after = self.reserves();
        after.mrr_base = new_x - self.mrv_base;
        after.mrr_token = new_y;
        Ok(Some((out, after)))
    }

    fn check_swap(&self, params: &SwapParams, now: Timestamp) -> Result<()> {
        if params.amount_in == 0 {
            return Err(MarketError::InvalidZeroInput.into());
        }
        if params.to.is_zero() {
            return Err(MarketError::InvalidZeroAddress.into());
        }
        if now > params.deadline {
            return Err(MarketError::SwapExpired {
                deadline: params.deadline,
                now,
            }
            .into());
        }
        Ok(())
    }

    /// Pay BASE into the curve for TOKEN
    pub fn buy(
        &mut self,
        bank: &mut Bank,
        caller: &Address,
        params: &SwapParams,
        now: Timestamp,
    ) -> Result<u128> {
        self.check_swap(params, now)?;
        let referrer = params.referrer.filter(|r| !r.is_zero());
        let fee = self.split_fee(params.amount_in, referrer.as_ref())?;
        let net = params.amount_in - fee.total;

        let x = self.curve_base()?;
        let new_x = checked_add(x, net)?;
        let new_y = mul_div(x, self.mrr_token, new_x)?;
        let out = self.mrr_token - new_y;
        if out == 0 || out < params.min_amount_out {
            return Err(MarketError::ExceedsSwapSlippageTolerance {
                out,
                min: params.min_amount_out,
            }
            .into());
        }

        bank.transfer(self.base, caller, &self.address, params.amount_in)?;
        if let Some(referrer) = referrer {
            if fee.provider > 0 {
                bank.transfer(self.base, &self.address, &referrer, fee.provider)?;
            }
        }
        if fee.collector > 0 {
            bank.transfer(self.base, &self.address, &self.fees, fee.collector)?;
        }
        self.fr_base = checked_add(self.fr_base, fee.floor)?;
        self.mrr_base = new_x - self.mrv_base;
        self.mrr_token = new_y;
        bank.transfer(self.token(), &self.address, &params.to, out)?;

        debug!(
            %caller,
            base_in = params.amount_in,
            token_out = out,
            floor_fee = fee.floor,
            "buy"
        );
        Ok(out)
    }

    /// Sell TOKEN back into the curve for BASE
    pub fn sell(
        &mut self,
        bank: &mut Bank,
        caller: &Address,
        params: &SwapParams,
        now: Timestamp,
    ) -> Result<u128> {
        self.check_swap(params, now)?;
        let max_token = self.market_max_token()?;
        if checked_add(self.mrr_token, params.amount_in)? > max_token {
            return Err(MarketError::ExceedsSwapMarketReserves {
                amount: params.amount_in,
                max_sell: max_token.saturating_sub(self.mrr_token),
            }
            .into());
        }
        let referrer = params.referrer.filter(|r| !r.is_zero());
        let fee = self.split_fee(params.amount_in, referrer.as_ref())?;
        let net = params.amount_in - fee.total;

        let x = self.curve_base()?;
        let new_y = checked_add(self.mrr_token, net)?;
        let new_x = mul_div_ceil(x, self.mrr_token, new_y)?;
        let out = x - new_x;
        if out == 0 || out < params.min_amount_out {
            return Err(MarketError::ExceedsSwapSlippageTolerance {
                out,
                min: params.min_amount_out,
            }
            .into());
        }

        let token = self.token();
        bank.transfer(token, caller, &self.address, params.amount_in)?;
        if let Some(referrer) = referrer {
            if fee.provider > 0 {
                bank.transfer(token, &self.address, &referrer, fee.provider)?;
            }
        }
        if fee.floor > 0 {
            bank.burn(token, &self.address, fee.floor)?;
        }
        if fee.collector > 0 {
            bank.transfer(token, &self.address, &self.fees, fee.collector)?;
        }
        self.mrr_base = new_x - self.mrv_base;
        self.mrr_token = new_y;
        bank.transfer(self.base, &self.address, &params.to, out)?;

        debug!(
            %caller,
            token_in = params.amount_in,
            base_out = out,
            burned = fee.floor,
            "sell"
        );
        Ok(out)
    }

    /// Borrow BASE against staked TOKEN
    pub fn borrow(
        &mut self,
        bank: &mut Bank,
        vtoken: &VToken,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Err(MarketError::InvalidZeroInput.into());
        }
        let credit = self.get_account_credit(vtoken, caller)?;
        if amount > credit {
            return Err(MarketError::ExceedsBorrowCreditLimit.into());
        }
        let debt = checked_add(self.debt_of(caller), amount)?;
        self.debts.insert(*caller, debt);
        self.debt_total = checked_add(self.debt_total, amount)?;
        bank.transfer(self.base, &self.address, caller, amount)?;
        debug!(%caller, amount, debt, "borrow");
        Ok(())
    }

    /// Pay back borrowed BASE. Repaying more than is owed fails.
    pub fn repay(&mut self, bank: &mut Bank, caller: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(MarketError::InvalidZeroInput.into());
        }
        let debt = self.debt_of(caller);
        if amount > debt {
            return Err(MarketError::RepayExceedsDebt { amount, debt }.into());
        }
        bank.transfer(self.base, caller, &self.address, amount)?;
        let remaining = debt - amount;
        if remaining == 0 {
            self.debts.remove(caller);
        } else {
            self.debts.insert(*caller, remaining);
        }
        self.debt_total = checked_sub(self.debt_total, amount)?;
        debug!(%caller, amount, remaining, "repay");
        Ok(())
    }

    /// Burn OTOKEN and pay the floor-price strike in BASE to receive TOKEN.
    ///
    /// The strike goes to the floor reserve, so every exercise raises the
    /// floor by exactly the TOKEN it creates.
    pub fn exercise(
        &mut self,
        bank: &mut Bank,
        otoken: &OToken,
        caller: &Address,
        amount: u128,
        to: &Address,
    ) -> Result<()> {
        if amount == 0 {
            return Err(MarketError::InvalidZeroInput.into());
        }
        if to.is_zero() {
            return Err(MarketError::InvalidZeroAddress.into());
        }
        let strike = mul_div(amount, FLOOR_PRICE, ONE)?;
        otoken.burn(bank, caller, amount)?;
        bank.transfer(self.base, caller, &self.address, strike)?;
        self.fr_base = checked_add(self.fr_base, strike)?;
        bank.mint(self.token(), to, amount)?;
        debug!(%caller, %to, amount, strike, "exercise");
        Ok(())
    }

    /// Burn TOKEN for BASE at the floor price
    pub fn redeem(
        &mut self,
        bank: &mut Bank,
        caller: &Address,
        amount: u128,
        to: &Address,
    ) -> Result<()> {
        if amount == 0 {
            return Err(MarketError::InvalidZeroInput.into());
        }
        if to.is_zero() {
            return Err(MarketError::InvalidZeroAddress.into());
        }
        let payout = mul_div(amount, FLOOR_PRICE, ONE)?;
        if payout > self.fr_base {
            return Err(MarketError::ExceedsRedeemableReserve {
                amount,
                floor: self.fr_base,
            }
            .into());
        }
        bank.burn(self.token(), caller, amount)?;
        self.fr_base -= payout;
        bank.transfer(self.base, &self.address, to, payout)?;
        debug!(%caller, %to, amount, floor = self.fr_base, "redeem");
        Ok(())
    }

    /// Check both reserve identities against the bank
    pub fn reserves_consistent(&self, bank: &Bank) -> bool {
        let base_balance = bank.balance_of(self.base, &self.address);
        let token_balance = bank.balance_of(self.token(), &self.address);
        let lhs = self.mrr_base.checked_add(self.fr_base);
        let rhs = base_balance.checked_add(self.debt_total);
        lhs.is_some() && lhs == rhs && self.mrr_token == token_balance
    }
}

/// Market (TOKEN) errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("TOKEN: invalid zero input")]
    InvalidZeroInput,

    #[error("TOKEN: invalid zero address")]
    InvalidZeroAddress,

    #[error("TOKEN: swap expired at {deadline}, now {now}")]
    SwapExpired { deadline: Timestamp, now: Timestamp },

    #[error("TOKEN: output {out} below minimum {min}")]
    ExceedsSwapSlippageTolerance { out: u128, min: u128 },

    #[error("TOKEN: sell of {amount} exceeds market reserves (max {max_sell})")]
    ExceedsSwapMarketReserves { amount: u128, max_sell: u128 },

    #[error("TOKEN: exceeds borrow credit limit")]
    ExceedsBorrowCreditLimit,

    #[error("TOKEN: repay {amount} exceeds debt {debt}")]
    RepayExceedsDebt { amount: u128, debt: u128 },

    #[error("TOKEN: redeem {amount} exceeds floor reserve {floor}")]
    ExceedsRedeemableReserve { amount: u128, floor: u128 },
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidZeroInput | Self::InvalidZeroAddress => ErrorKind::InvalidInput,
            Self::SwapExpired { .. } => ErrorKind::StateMachine,
            Self::ExceedsSwapSlippageTolerance { .. }
            | Self::ExceedsSwapMarketReserves { .. }
            | Self::ExceedsBorrowCreditLimit
            | Self::RepayExceedsDebt { .. }
            | Self::ExceedsRedeemableReserve { .. } => ErrorKind::EconomicLimit,
        }
    }
}
