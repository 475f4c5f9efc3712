//! Market errors

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::math::fixed::{Fixed, FixedPointError};
use crate::math::lmsr::LmsrError;
use crate::types::Address;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("market is already initialized")]
    AlreadyInitialized,
    #[error("market is not initialized")]
    NotInitialized,
    #[error("overround must be positive")]
    InvalidOverround,
    #[error("insufficient funding: required {required}, available {available}")]
    InsufficientFunding { required: u128, available: u128 },
    #[error("invalid outcome count {count}: must be between {min} and {max}")]
    InvalidOutcomeCount { count: usize, min: usize, max: usize },

    #[error("invalid outcome mask {mask:#b}")]
    InvalidOutcome { mask: u128 },
    #[error("trade amount must be positive, got {0}")]
    InvalidAmount(Fixed),
    #[error("market is resolved")]
    MarketResolved,
    #[error("payment of {amount} from {buyer} was refused")]
    PaymentFailed { buyer: Address, amount: u128 },

    #[error("market is already resolved")]
    AlreadyResolved,
    #[error("expected {expected} payouts, got {actual}")]
    InvalidPayoutLength { expected: usize, actual: usize },
    #[error("market is not resolved")]
    NotResolved,
    #[error("{caller} is not the market owner")]
    Unauthorized { caller: Address },

    #[error(transparent)]
    FixedPoint(#[from] FixedPointError),
    #[error(transparent)]
    Lmsr(LmsrError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<LmsrError> for MarketError {
    fn from(err: LmsrError) -> Self {
        match err {
            LmsrError::FixedPoint(err) => Self::FixedPoint(err),
            LmsrError::NotInitialized => Self::NotInitialized,
            LmsrError::NonPositiveOverround => Self::InvalidOverround,
            LmsrError::InvalidOutcomeCount { count, min, max } => {
                Self::InvalidOutcomeCount { count, min, max }
            }
            LmsrError::MaskOutOfRange { mask, .. } => {
                Self::InvalidOutcome { mask: mask.bits() }
            }
            err @ LmsrError::NonPositiveBeta(_) => Self::Lmsr(err),
        }
    }
}
