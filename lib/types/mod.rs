//! Identities shared by the market and its collaborators

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

pub mod hashes;

/// Account identity at the collateral and position ledgers
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
pub struct Address(#[serde(with = "hex::serde")] pub [u8; 20]);

impl Address {
    pub const fn new(data: [u8; 20]) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Oracle-chosen identifier of the question a condition resolves
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
    PartialEq,
    Serialize,
)]
pub struct QuestionId(#[serde(with = "hex::serde")] pub [u8; 32]);

impl QuestionId {
    pub const fn new(data: [u8; 32]) -> Self {
        Self(data)
    }

    /// Question id derived from a human-readable question
    pub fn from_text(question: &str) -> Self {
        Self(hashes::hash(question.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
