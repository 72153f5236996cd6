//! # Balance Ledger
//!
//! One book for every fungible asset in the simulation: BASE, TOKEN, OTOKEN,
//! plugin underlyings and bribe tokens. Contracts hold balances under their
//! own address, so "the market's BASE balance" is an ordinary lookup.

use crate::error::{ErrorKind, Result};
use crate::types::{Address, Asset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Balances and supply of a single asset
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssetBook {
    /// Total minted minus burned
    pub total_supply: u128,
    /// Per-holder balance
    balances: HashMap<Address, u128>,
}

impl AssetBook {
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Number of non-zero holders
    pub fn holders(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }
}

/// Multi-asset bank
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bank {
    assets: BTreeMap<Asset, AssetBook>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, asset: Asset, account: &Address) -> u128 {
        self.assets
            .get(&asset)
            .map(|book| book.balance_of(account))
            .unwrap_or(0)
    }

    pub fn total_supply(&self, asset: Asset) -> u128 {
        self.assets.get(&asset).map(|b| b.total_supply).unwrap_or(0)
    }

    pub fn book(&self, asset: Asset) -> Option<&AssetBook> {
        self.assets.get(&asset)
    }

    /// Create `amount` of `asset` for `to`
    pub fn mint(&mut self, asset: Asset, to: &Address, amount: u128) -> Result<()> {
        let book = self.assets.entry(asset).or_default();
        let supply = book
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { asset })?;
        let balance = book.balance_of(to) + amount;
        book.total_supply = supply;
        book.balances.insert(*to, balance);
        Ok(())
    }

    /// Destroy `amount` of `asset` held by `from`
    pub fn burn(&mut self, asset: Asset, from: &Address, amount: u128) -> Result<()> {
        self.debit(asset, from, amount)?;
        if let Some(book) = self.assets.get_mut(&asset) {
            book.total_supply -= amount;
        }
        Ok(())
    }

    /// Move `amount` of `asset` from `from` to `to`
    pub fn transfer(
        &mut self,
        asset: Asset,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 || from == to {
            // Still reject an overdraft on self-transfer
            let available = self.balance_of(asset, from);
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    asset,
                    account: *from,
                    needed: amount,
                    available,
                }
                .into());
            }
            return Ok(());
        }
        self.debit(asset, from, amount)?;
        let book = self.assets.entry(asset).or_default();
        let balance = book.balance_of(to) + amount;
        book.balances.insert(*to, balance);
        Ok(())
    }

    fn debit(&mut self, asset: Asset, from: &Address, amount: u128) -> Result<()> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                account: *from,
                needed: amount,
                available,
            }
            .into());
        }
        let book = self.assets.entry(asset).or_default();
        book.balances.insert(*from, available - amount);
        Ok(())
    }
}

/// Ledger errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient {asset} balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        asset: Asset,
        account: Address,
        needed: u128,
        available: u128,
    },

    #[error("total supply of {asset} overflows")]
    SupplyOverflow { asset: Asset },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::EconomicLimit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn base() -> Asset {
        Asset::external("BASE")
    }

    #[test]
    fn test_mint_transfer_burn() {
        let mut bank = Bank::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        bank.mint(base(), &alice, 100).unwrap();
        bank.transfer(base(), &alice, &bob, 40).unwrap();
        bank.burn(base(), &bob, 10).unwrap();

        assert_eq!(bank.balance_of(base(), &alice), 60);
        assert_eq!(bank.balance_of(base(), &bob), 30);
        assert_eq!(bank.total_supply(base()), 90);
        assert_eq!(bank.book(base()).unwrap().holders(), 2);
    }

    #[test]
    fn test_overdraft_rejected() {
        let mut bank = Bank::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        bank.mint(base(), &alice, 5).unwrap();

        let err = bank.transfer(base(), &alice, &bob, 6).unwrap_err();
        assert!(matches!(
            err,
            Error::Ledger(LedgerError::InsufficientBalance { needed: 6, available: 5, .. })
        ));
        assert!(bank.burn(base(), &bob, 1).is_err());
        assert_eq!(bank.balance_of(base(), &alice), 5);
    }
}
