//! Gauge and bribe factories.
//!
//! Each factory is deployed with an owner and no voter. During setup the
//! owner points it at the voter; from then on only that voter may create
//! contracts, and the owner or the current voter may repoint it.

use crate::bribe::Bribe;
use crate::error::{ErrorKind, Result};
use crate::gauge::Gauge;
use crate::types::{Address, Asset};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Which factory raised an error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryKind {
    Gauge,
    Bribe,
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gauge => f.write_str("GaugeFactory"),
            Self::Bribe => f.write_str("BribeFactory"),
        }
    }
}

/// Voter binding and address derivation shared by both factories
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Registrar {
    kind: FactoryKind,
    address: Address,
    owner: Address,
    voter: Option<Address>,
    nonce: u64,
}

impl Registrar {
    fn new(kind: FactoryKind, address: Address, owner: Address) -> Self {
        Self {
            kind,
            address,
            owner,
            voter: None,
            nonce: 0,
        }
    }

    fn set_voter(&mut self, caller: &Address, voter: Address) -> Result<()> {
        if *caller != self.owner && Some(*caller) != self.voter {
            return Err(FactoryError::UnauthorizedVoter(self.kind).into());
        }
        if voter.is_zero() {
            return Err(FactoryError::InvalidZeroAddress(self.kind).into());
        }
        self.voter = Some(voter);
        info!(factory = %self.kind, %voter, "factory voter set");
        Ok(())
    }

    /// Address for the next contract, if `caller` is the voter
    fn next_address(&mut self, caller: &Address) -> Result<Address> {
        if self.voter != Some(*caller) {
            return Err(FactoryError::UnauthorizedVoter(self.kind).into());
        }
        let address = Address::derive(&self.address, self.nonce);
        self.nonce += 1;
        Ok(address)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaugeFactory {
    registrar: Registrar,
}

impl GaugeFactory {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            registrar: Registrar::new(FactoryKind::Gauge, address, owner),
        }
    }

    pub fn address(&self) -> Address {
        self.registrar.address
    }

    pub fn voter(&self) -> Option<Address> {
        self.registrar.voter
    }

    pub fn set_voter(&mut self, caller: &Address, voter: Address) -> Result<()> {
        self.registrar.set_voter(caller, voter)
    }

    pub fn create_gauge(
        &mut self,
        caller: &Address,
        plugin: Address,
        otoken: Asset,
        duration: u64,
    ) -> Result<Gauge> {
        let address = self.registrar.next_address(caller)?;
        Gauge::new(address, plugin, *caller, otoken, duration)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BribeFactory {
    registrar: Registrar,
}

impl BribeFactory {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            registrar: Registrar::new(FactoryKind::Bribe, address, owner),
        }
    }

    pub fn address(&self) -> Address {
        self.registrar.address
    }

    pub fn voter(&self) -> Option<Address> {
        self.registrar.voter
    }

    pub fn set_voter(&mut self, caller: &Address, voter: Address) -> Result<()> {
        self.registrar.set_voter(caller, voter)
    }

    pub fn create_bribe(
        &mut self,
        caller: &Address,
        plugin: Address,
        reward_tokens: &[Asset],
        duration: u64,
    ) -> Result<Bribe> {
        let address = self.registrar.next_address(caller)?;
        Bribe::new(address, plugin, *caller, reward_tokens, duration)
    }
}

/// Factory errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("{0}: unauthorized voter")]
    UnauthorizedVoter(FactoryKind),

    #[error("{0}: invalid zero address")]
    InvalidZeroAddress(FactoryKind),
}

impl FactoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnauthorizedVoter(_) => ErrorKind::Authorization,
            Self::InvalidZeroAddress(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WEEK;
    use crate::error::Error;

    #[test]
    fn test_create_requires_voter() {
        let owner = Address::from_label("owner");
        let voter = Address::from_label("voter");
        let mut factory = GaugeFactory::new(Address::from_label("gauge-factory"), owner);
        let otoken = Asset::external("OTOKEN");
        let plugin = Address::from_label("plugin");

        let err = factory
            .create_gauge(&voter, plugin, otoken, WEEK)
            .unwrap_err();
        assert_eq!(
            err,
            Error::Factory(FactoryError::UnauthorizedVoter(FactoryKind::Gauge))
        );

        factory.set_voter(&owner, voter).unwrap();
        let first = factory.create_gauge(&voter, plugin, otoken, WEEK).unwrap();
        let second = factory.create_gauge(&voter, plugin, otoken, WEEK).unwrap();
        assert_ne!(first.address(), second.address());
    }

    #[test]
    fn test_set_voter_authorization() {
        let owner = Address::from_label("owner");
        let voter = Address::from_label("voter");
        let stranger = Address::from_label("stranger");
        let mut factory = BribeFactory::new(Address::from_label("bribe-factory"), owner);

        let err = factory.set_voter(&stranger, stranger).unwrap_err();
        assert_eq!(err.to_string(), "BribeFactory: unauthorized voter");

        let err = factory.set_voter(&owner, Address::ZERO).unwrap_err();
        assert_eq!(
            err,
            Error::Factory(FactoryError::InvalidZeroAddress(FactoryKind::Bribe))
        );

        factory.set_voter(&owner, voter).unwrap();
        // The current voter may hand over
        factory.set_voter(&voter, stranger).unwrap();
        assert_eq!(factory.voter(), Some(stranger));
    }
}
