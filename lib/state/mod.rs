//! Per-market ledger of outstanding shares and pricing parameters

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ledger::ConditionId;
use crate::math::fixed::Fixed;
use crate::math::lmsr::TradeQuote;
use crate::types::{Address, QuestionId};

pub mod error;
pub mod outcome;

pub use error::MarketError;
pub use outcome::{MAX_OUTCOMES, OutcomeMask};

/// Fewest outcomes a market can have
pub const MIN_OUTCOMES: usize = 2;

/// Lifecycle phase, derived from the one-way `initialized` and `resolved`
/// flags
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Resolved,
}

/// Mutable state of one market.
///
/// Outside of an in-flight trade, `current_cost` is the cost function
/// evaluated at `q` with liquidity `b`, `total_shares` is the sum of `q`, and
/// `b == alpha * total_shares`.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
)]
pub struct MarketState {
    pub num_outcomes: usize,
    /// Outstanding shares per outcome
    pub q: Vec<Fixed>,
    /// Sensitivity constant, fixed at setup
    pub alpha: Fixed,
    /// Liquidity parameter
    pub b: Fixed,
    pub total_shares: Fixed,
    pub current_cost: Fixed,
    pub initialized: bool,
    pub resolved: bool,
    /// Only identity allowed to report payouts for the condition
    pub oracle: Option<Address>,
    pub question_id: Option<QuestionId>,
    pub condition: Option<ConditionId>,
    /// Decimal scale of the collateral token, read once at setup
    pub collateral_decimals: u8,
}

impl MarketState {
    pub fn phase(&self) -> Phase {
        match (self.initialized, self.resolved) {
            (false, _) => Phase::Uninitialized,
            (true, false) => Phase::Initialized,
            (true, true) => Phase::Resolved,
        }
    }

    /// Commit a trade priced by the engine
    pub fn apply_trade(&mut self, quote: TradeQuote) {
        self.q = quote.q;
        self.total_shares = quote.total_shares;
        self.b = quote.b;
        self.current_cost = quote.cost;
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, borsh::io::Error> {
        borsh::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized_state() -> MarketState {
        let share = Fixed::from_int(250).unwrap();
        MarketState {
            num_outcomes: 4,
            q: vec![share; 4],
            alpha: Fixed::from_ratio(1, 100).unwrap(),
            b: Fixed::from_int(10).unwrap(),
            total_shares: Fixed::from_int(1000).unwrap(),
            current_cost: Fixed::from_int(1000).unwrap(),
            initialized: true,
            resolved: false,
            oracle: Some(Address([7; 20])),
            question_id: Some(QuestionId::from_text("will it rain")),
            condition: Some(ConditionId([9; 32])),
            collateral_decimals: 18,
        }
    }

    #[test]
    fn test_phase() {
        let mut state = MarketState::default();
        assert_eq!(state.phase(), Phase::Uninitialized);
        state.initialized = true;
        assert_eq!(state.phase(), Phase::Initialized);
        state.resolved = true;
        assert_eq!(state.phase(), Phase::Resolved);
        assert_eq!(state.phase().to_string(), "Resolved");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let state = initialized_state();
        let bytes = state.to_bytes().unwrap();
        assert_eq!(MarketState::from_bytes(&bytes).unwrap(), state);

        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(serde_json::from_str::<MarketState>(&json).unwrap(), state);
    }

    #[test]
    fn test_truncated_snapshot_rejected() {
        let bytes = initialized_state().to_bytes().unwrap();
        assert!(MarketState::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
