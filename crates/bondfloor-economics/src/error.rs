//! Error types for Bondfloor operations
//!
//! Every component has its own error enum so that a rejection names the call
//! site it came from (`MarketError::InvalidZeroInput` is not the same failure
//! as `VTokenError::InvalidZeroInput`). [`Error`] wraps them all.

use crate::bribe::BribeError;
use crate::factory::FactoryError;
use crate::gauge::GaugeError;
use crate::ledger::LedgerError;
use crate::market::MarketError;
use crate::minter::MinterError;
use crate::otoken::OTokenError;
use crate::plugin::PluginError;
use crate::rewarder::RewarderError;
use crate::rewards::RewardError;
use crate::views::QuoteError;
use crate::voter::VoterError;
use crate::vtoken::VTokenError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Bondfloor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes every mutating entry point sorts its rejections into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Zero amount, zero address, malformed arguments
    InvalidInput,
    /// Caller lacks the required role or relationship
    Authorization,
    /// Credit limit, reserve bound, balance or float exceeded
    EconomicLimit,
    /// Operation not valid in the component's current state
    StateMachine,
}

/// Errors that can occur in Bondfloor operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    OToken(#[from] OTokenError),

    #[error(transparent)]
    VToken(#[from] VTokenError),

    #[error(transparent)]
    Reward(#[from] RewardError),

    #[error(transparent)]
    Rewarder(#[from] RewarderError),

    #[error(transparent)]
    Minter(#[from] MinterError),

    #[error(transparent)]
    Voter(#[from] VoterError),

    #[error(transparent)]
    Gauge(#[from] GaugeError),

    #[error(transparent)]
    Bribe(#[from] BribeError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    /// Intermediate or final value does not fit the numeric model
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by a zero denominator
    #[error("division by zero")]
    DivisionByZero,

    /// Protocol configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Taxonomy class of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Market(e) => e.kind(),
            Self::OToken(e) => e.kind(),
            Self::VToken(e) => e.kind(),
            Self::Reward(e) => e.kind(),
            Self::Rewarder(e) => e.kind(),
            Self::Minter(e) => e.kind(),
            Self::Voter(e) => e.kind(),
            Self::Gauge(e) => e.kind(),
            Self::Bribe(e) => e.kind(),
            Self::Factory(e) => e.kind(),
            Self::Plugin(e) => e.kind(),
            Self::Quote(e) => e.kind(),
            Self::Overflow | Self::DivisionByZero => ErrorKind::EconomicLimit,
            Self::InvalidConfig(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::from(MarketError::InvalidZeroInput).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            Error::from(MarketError::ExceedsBorrowCreditLimit).kind(),
            ErrorKind::EconomicLimit
        );
        assert_eq!(
            Error::from(MinterError::UnauthorizedInitializer).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            Error::from(VTokenError::CollateralActive).kind(),
            ErrorKind::StateMachine
        );
    }

    #[test]
    fn test_call_sites_stay_distinct() {
        let market: Error = MarketError::InvalidZeroInput.into();
        let vtoken: Error = VTokenError::InvalidZeroInput.into();
        assert_ne!(market, vtoken);
        assert_eq!(market.to_string(), "TOKEN: invalid zero input");
    }
}
