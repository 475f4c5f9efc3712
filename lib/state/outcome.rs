//! Outcome selection as a bitmask over outcome slots.
//!
//! Bit `i` selects outcome `i`. The same encoding is the position ledger's
//! index set, so a mask doubles as the partition element for splits and
//! redemptions.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::state::error::MarketError;

/// Most outcomes a market can have, one per mask bit
pub const MAX_OUTCOMES: usize = u128::BITS as usize;

/// Non-empty set of outcome slots
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
#[serde(try_from = "u128", into = "u128")]
pub struct OutcomeMask(u128);

impl OutcomeMask {
    pub fn new(bits: u128) -> Result<Self, MarketError> {
        if bits == 0 {
            return Err(MarketError::InvalidOutcome { mask: bits });
        }
        Ok(Self(bits))
    }

    pub fn singleton(index: usize) -> Result<Self, MarketError> {
        if index >= MAX_OUTCOMES {
            return Err(MarketError::InvalidOutcome { mask: 0 });
        }
        Ok(Self(1 << index))
    }

    /// Every outcome of an `num_outcomes`-slot condition
    pub fn full(num_outcomes: usize) -> Result<Self, MarketError> {
        match num_outcomes {
            0 => Err(MarketError::InvalidOutcome { mask: 0 }),
            MAX_OUTCOMES => Ok(Self(u128::MAX)),
            n if n < MAX_OUTCOMES => Ok(Self((1 << n) - 1)),
            _ => Err(MarketError::InvalidOutcome { mask: u128::MAX }),
        }
    }

    pub fn bits(self) -> u128 {
        self.0
    }

    pub fn contains(self, index: usize) -> bool {
        index < MAX_OUTCOMES && (self.0 >> index) & 1 == 1
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Whether every selected slot is below `num_outcomes`
    pub fn is_within(self, num_outcomes: usize) -> bool {
        num_outcomes >= MAX_OUTCOMES || self.0 >> num_outcomes == 0
    }

    pub fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Selected slot indices in ascending order
    pub fn indices(self) -> impl Iterator<Item = usize> {
        (0..MAX_OUTCOMES).filter(move |index| self.contains(*index))
    }

    /// Every unselected slot below `num_outcomes` as its own singleton
    pub fn complement_singletons(
        self,
        num_outcomes: usize,
    ) -> impl Iterator<Item = Self> {
        (0..num_outcomes.min(MAX_OUTCOMES))
            .filter(move |index| !self.contains(*index))
            .map(|index| Self(1 << index))
    }
}

impl TryFrom<u128> for OutcomeMask {
    type Error = MarketError;

    fn try_from(bits: u128) -> Result<Self, Self::Error> {
        Self::new(bits)
    }
}

impl From<OutcomeMask> for u128 {
    fn from(mask: OutcomeMask) -> Self {
        mask.0
    }
}

impl std::fmt::Display for OutcomeMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}
