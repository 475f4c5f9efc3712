//! Market setup parameters

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{MAX_OUTCOMES, MIN_OUTCOMES, MarketError};
use crate::types::{Address, QuestionId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse market parameters")]
    Parse(#[from] serde_json::Error),
    #[error("invalid market parameters")]
    Invalid(#[from] MarketError),
}

/// Arguments to `MarketMaker::setup`
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    /// Identity allowed to report the outcome at the position ledger
    pub oracle: Address,
    pub question_id: QuestionId,
    pub num_outcomes: usize,
    /// Collateral, in integer token units, already held by the market
    pub subsidy: u128,
    /// Market maker margin in basis points, e.g. 501 for 5.01%
    pub overround_bips: u32,
}

impl MarketParams {
    /// Checks that need no ledger access
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(MIN_OUTCOMES..=MAX_OUTCOMES).contains(&self.num_outcomes) {
            return Err(MarketError::InvalidOutcomeCount {
                count: self.num_outcomes,
                min: MIN_OUTCOMES,
                max: MAX_OUTCOMES,
            });
        }
        if self.overround_bips == 0 {
            return Err(MarketError::InvalidOverround);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }
}
