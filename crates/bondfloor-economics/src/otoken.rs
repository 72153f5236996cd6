//! Option token.
//!
//! OTOKEN is what the minter emits every epoch. A holder can exercise it at
//! the floor price through the market, or burn it into VTOKEN voting power.
//! Minting rights start with the deployer and are handed to the minter
//! contract during setup; once handed over they cannot be taken back.

use crate::error::{ErrorKind, Result};
use crate::ledger::Bank;
use crate::types::{Address, Asset};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OToken {
    address: Address,
    minter: Address,
}

impl OToken {
    pub fn new(address: Address, initial_minter: Address) -> Self {
        Self {
            address,
            minter: initial_minter,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn asset(&self) -> Asset {
        Asset::new(self.address)
    }

    pub fn minter(&self) -> Address {
        self.minter
    }

    /// Hand minting rights to `minter`. Only the current minter may do this.
    pub fn set_minter(&mut self, caller: &Address, minter: Address) -> Result<()> {
        if *caller != self.minter {
            return Err(OTokenError::UnauthorizedMinter(*caller).into());
        }
        if minter.is_zero() {
            return Err(OTokenError::InvalidZeroAddress.into());
        }
        self.minter = minter;
        info!(%minter, "OTOKEN minter set");
        Ok(())
    }

    pub fn mint(&self, bank: &mut Bank, caller: &Address, to: &Address, amount: u128) -> Result<()> {
        if *caller != self.minter {
            return Err(OTokenError::UnauthorizedMinter(*caller).into());
        }
        if to.is_zero() {
            return Err(OTokenError::InvalidZeroAddress.into());
        }
        bank.mint(self.asset(), to, amount)
    }

    pub fn burn(&self, bank: &mut Bank, from: &Address, amount: u128) -> Result<()> {
        bank.burn(self.asset(), from, amount)
    }
}

/// OTOKEN errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OTokenError {
    #[error("OTOKEN: {0} is not the minter")]
    UnauthorizedMinter(Address),

    #[error("OTOKEN: invalid zero address")]
    InvalidZeroAddress,
}

impl OTokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnauthorizedMinter(_) => ErrorKind::Authorization,
            Self::InvalidZeroAddress => ErrorKind::InvalidInput,
        }
    }
}
