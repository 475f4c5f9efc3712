//! Collaborator ledgers.
//!
//! The market maker never owns balances itself. Outcome tokens live in a
//! [`PositionLedger`] (conditional tokens keyed by condition, collection and
//! position ids) and the subsidy and trade payments live in a
//! [`CollateralLedger`]. Both are synchronous: every call either completes or
//! returns an error, and neither can call back into the market.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::OutcomeMask;
use crate::types::hashes::hash_parts;
use crate::types::{Address, QuestionId};

pub mod memory;

pub use memory::{InMemoryCollateral, InMemoryPositionLedger};

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            BorshDeserialize,
            BorshSerialize,
            Clone,
            Copy,
            Debug,
            Default,
            Deserialize,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            Serialize,
        )]
        pub struct $name(#[serde(with = "hex::serde")] pub [u8; 32]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }
    };
}

ledger_id!(
    /// Identifies an (oracle, question, outcome count) triple
    ConditionId
);
ledger_id!(
    /// Set of outcome slots, possibly nested under a parent collection
    CollectionId
);
ledger_id!(
    /// Collection backed by a specific collateral token
    PositionId
);

impl CollectionId {
    /// Parent of positions backed directly by collateral
    pub const ROOT: Self = Self([0; 32]);
}

impl ConditionId {
    pub fn derive(
        oracle: &Address,
        question: &QuestionId,
        num_outcomes: usize,
    ) -> Self {
        let slots = (num_outcomes as u64).to_le_bytes();
        Self(hash_parts(&[oracle.as_bytes(), question.as_bytes(), &slots]))
    }
}

impl CollectionId {
    pub fn derive(
        parent: &CollectionId,
        condition: &ConditionId,
        index_set: OutcomeMask,
    ) -> Self {
        let index_set = index_set.bits().to_le_bytes();
        Self(hash_parts(&[parent.as_bytes(), condition.as_bytes(), &index_set]))
    }
}

impl PositionId {
    pub fn derive(token: &Address, collection: &CollectionId) -> Self {
        Self(hash_parts(&[token.as_bytes(), collection.as_bytes()]))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("condition {0} is not prepared")]
    UnknownCondition(ConditionId),
    #[error("condition {0} is already prepared")]
    ConditionAlreadyPrepared(ConditionId),
    #[error("invalid outcome slot count {0}")]
    InvalidOutcomeSlotCount(usize),
    #[error("invalid partition: {reason}")]
    InvalidPartition { reason: &'static str },
    #[error("{holder} holds {available}, needs {required}")]
    InsufficientBalance {
        holder: Address,
        required: u128,
        available: u128,
    },
    #[error("collateral transfer of {amount} from {holder} was refused")]
    CollateralRefused { holder: Address, amount: u128 },
    #[error("payouts for condition {0} are already reported")]
    PayoutsAlreadyReported(ConditionId),
    #[error("payouts for condition {0} are not reported")]
    PayoutsNotReported(ConditionId),
    #[error("invalid payouts: {reason}")]
    InvalidPayouts { reason: &'static str },
    #[error("ledger amount overflow")]
    Overflow,
}

/// Conditional-token ledger
pub trait PositionLedger {
    /// Identity the ledger holds collateral under
    fn address(&self) -> Address;

    fn prepare_condition(
        &mut self,
        oracle: Address,
        question: QuestionId,
        num_outcomes: usize,
    ) -> Result<ConditionId, LedgerError>;

    fn condition_id(
        &self,
        oracle: &Address,
        question: &QuestionId,
        num_outcomes: usize,
    ) -> ConditionId {
        ConditionId::derive(oracle, question, num_outcomes)
    }

    fn collection_id(
        &self,
        parent: &CollectionId,
        condition: &ConditionId,
        index_set: OutcomeMask,
    ) -> CollectionId {
        CollectionId::derive(parent, condition, index_set)
    }

    fn position_id(
        &self,
        token: &Address,
        collection: &CollectionId,
    ) -> PositionId {
        PositionId::derive(token, collection)
    }

    /// Convert `amount` of the full outcome set into one position per
    /// partition element. The partition must be disjoint and cover every
    /// outcome slot. Splitting from [`CollectionId::ROOT`] pulls `amount` of
    /// collateral from `holder`.
    fn split_position<C: CollateralLedger>(
        &mut self,
        collateral: &mut C,
        holder: Address,
        parent: CollectionId,
        condition: ConditionId,
        partition: &[OutcomeMask],
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Record the final payout numerators, once per condition
    fn report_payouts(
        &mut self,
        condition: ConditionId,
        payouts: &[u128],
    ) -> Result<(), LedgerError>;

    /// Sum of the reported payout numerators, zero while unresolved
    fn payout_denominator(
        &self,
        condition: &ConditionId,
    ) -> Result<u128, LedgerError>;

    /// Burn `holder`'s positions for each index set and pay out their
    /// collateral share. Returns the collateral paid.
    fn redeem_positions<C: CollateralLedger>(
        &mut self,
        collateral: &mut C,
        holder: Address,
        parent: CollectionId,
        condition: ConditionId,
        index_sets: &[OutcomeMask],
    ) -> Result<u128, LedgerError>;

    fn balance_of(&self, holder: &Address, position: &PositionId) -> u128;

    fn safe_transfer_from(
        &mut self,
        from: Address,
        to: Address,
        position: PositionId,
        amount: u128,
    ) -> Result<(), LedgerError>;
}

/// Fungible collateral token
pub trait CollateralLedger {
    fn token(&self) -> Address;

    fn decimals(&self) -> u8;

    fn balance_of(&self, holder: &Address) -> u128;

    fn allowance(&self, owner: &Address, spender: &Address) -> u128;

    fn approve(&mut self, owner: Address, spender: Address, amount: u128);

    /// Move `from`'s own balance
    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Move `amount` out of `from` against `spender`'s allowance. Returns
    /// `false` without moving anything when the allowance or balance is
    /// short.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<bool, LedgerError>;
}

/// Both collaborators of one market, staged and committed together
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledgers<P, C> {
    pub positions: P,
    pub collateral: C,
}

impl<P, C> Ledgers<P, C> {
    pub fn new(positions: P, collateral: C) -> Self {
        Self {
            positions,
            collateral,
        }
    }
}
