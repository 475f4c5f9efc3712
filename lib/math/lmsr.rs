//! Liquidity-sensitive LMSR pricing over 64.64 fixed point.
//!
//! The liquidity parameter follows traded volume, `b = alpha * sum(q)`, and
//! the cost function is `C(q) = b * ln(sum(exp(q_i / b)))`. A trade costs
//! `C(q') - C(q)`. Nothing here mutates market state: `buy` commits the
//! [`TradeQuote`] that quoting produced.

use std::marker::PhantomData;

use thiserror::Error;

use crate::math::fixed::{Fixed, FixedPointError};
use crate::math::transcendental::{BinaryExpansion, Transcendental};
use crate::state::{MAX_OUTCOMES, MIN_OUTCOMES, MarketState, OutcomeMask};

/// Basis points in one whole unit of overround
pub const BIPS_SCALE: u128 = 10_000;

/// `exp` of anything below `-64 * ln 2` is under one ulp
const NEGLIGIBLE_EXPONENT: Fixed = Fixed::from_raw(-64 * Fixed::LN_2.raw());

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LmsrError {
    #[error(transparent)]
    FixedPoint(#[from] FixedPointError),
    #[error("invalid outcome count {count}: must be between {min} and {max}")]
    InvalidOutcomeCount { count: usize, min: usize, max: usize },
    #[error("liquidity parameter must be positive, got {0}")]
    NonPositiveBeta(Fixed),
    #[error("overround must be positive")]
    NonPositiveOverround,
    #[error("outcome mask {mask} does not fit {num_outcomes} outcomes")]
    MaskOutOfRange { mask: OutcomeMask, num_outcomes: usize },
    #[error("market is not initialized")]
    NotInitialized,
}

/// Hypothetical market after a trade
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeQuote {
    pub q: Vec<Fixed>,
    pub total_shares: Fixed,
    pub b: Fixed,
    pub cost: Fixed,
}

/// LS-LMSR pricing engine, generic over the `ln`/`exp` strategy
#[derive(Clone, Copy, Debug, Default)]
pub struct LsLmsr<M = BinaryExpansion> {
    _math: PhantomData<M>,
}

impl LsLmsr {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M: Transcendental> LsLmsr<M> {
    pub fn with_math() -> Self {
        Self { _math: PhantomData }
    }

    pub fn validate_outcome_count(count: usize) -> Result<(), LmsrError> {
        if !(MIN_OUTCOMES..=MAX_OUTCOMES).contains(&count) {
            return Err(LmsrError::InvalidOutcomeCount {
                count,
                min: MIN_OUTCOMES,
                max: MAX_OUTCOMES,
            });
        }
        Ok(())
    }

    /// Sensitivity constant `alpha = overround / (n * ln n)`
    pub fn alpha(
        &self,
        num_outcomes: usize,
        overround_bips: u32,
    ) -> Result<Fixed, LmsrError> {
        Self::validate_outcome_count(num_outcomes)?;
        if overround_bips == 0 {
            return Err(LmsrError::NonPositiveOverround);
        }
        let overround = Fixed::divu(u128::from(overround_bips), BIPS_SCALE)?;
        let n = Fixed::from_uint(num_outcomes as u128)?;
        Ok(overround.div(n.mul(M::ln(n)?)?)?)
    }

    /// Cost function `b * ln(sum(exp(q_i / b)))`.
    ///
    /// Evaluated as `max(q) + b * ln(sum(exp((q_i - max(q)) / b)))` so every
    /// exponent is non-positive and the sum stays in `[1, n]`.
    pub fn cost(&self, q: &[Fixed], b: Fixed) -> Result<Fixed, LmsrError> {
        let Some(max) = q.iter().copied().max() else {
            return Ok(Fixed::ZERO);
        };
        if !b.is_positive() {
            return Err(LmsrError::NonPositiveBeta(b));
        }
        let sum = self.shifted_weights(q, max, b)?.try_fold(
            Fixed::ZERO,
            |acc, weight| -> Result<Fixed, LmsrError> { Ok(acc.add(weight?)?) },
        )?;
        Ok(max.add(b.mul(M::ln(sum)?)?)?)
    }

    /// Cost of the market as stored; zero before setup
    pub fn market_cost(&self, state: &MarketState) -> Result<Fixed, LmsrError> {
        if !state.initialized {
            return Ok(Fixed::ZERO);
        }
        self.cost(&state.q, state.b)
    }

    /// Price the market after buying `amount` of every outcome in `mask`
    pub fn cost_after_buy(
        &self,
        q: &[Fixed],
        total_shares: Fixed,
        alpha: Fixed,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<TradeQuote, LmsrError> {
        if !mask.is_within(q.len()) {
            return Err(LmsrError::MaskOutOfRange {
                mask,
                num_outcomes: q.len(),
            });
        }
        let mut q = q.to_vec();
        let mut total_shares = total_shares;
        for index in mask.indices() {
            q[index] = q[index].add(amount)?;
            total_shares = total_shares.add(amount)?;
        }
        let b = alpha.mul(total_shares)?;
        let cost = self.cost(&q, b)?;
        Ok(TradeQuote {
            q,
            total_shares,
            b,
            cost,
        })
    }

    /// Quote a trade against the market without changing it
    pub fn quote(
        &self,
        state: &MarketState,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<TradeQuote, LmsrError> {
        if !state.initialized {
            return Err(LmsrError::NotInitialized);
        }
        self.cost_after_buy(
            &state.q,
            state.total_shares,
            state.alpha,
            mask,
            amount,
        )
    }

    /// Price of a trade, `C(q') - C(q)`
    pub fn quote_price(
        &self,
        state: &MarketState,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<Fixed, LmsrError> {
        let quote = self.quote(state, mask, amount)?;
        Ok(quote.cost.sub(state.current_cost)?)
    }

    /// Instantaneous price of each outcome.
    ///
    /// `p_i = alpha * ln(sum_j e^(q_j/b))
    ///      + (sum_j q_j * e^(q_i/b) - sum_j q_j * e^(q_j/b))
    ///        / (sum_j q_j * sum_j e^(q_j/b))`
    ///
    /// Prices sum to between 1 and `1 + overround`.
    pub fn marginal_prices(
        &self,
        state: &MarketState,
    ) -> Result<Vec<Fixed>, LmsrError> {
        if !state.initialized {
            return Err(LmsrError::NotInitialized);
        }
        let q = &state.q;
        let Some(max) = q.iter().copied().max() else {
            return Ok(Vec::new());
        };
        let weights = self
            .shifted_weights(q, max, state.b)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut weight_sum = Fixed::ZERO;
        let mut weighted_shares = Fixed::ZERO;
        for (share, weight) in q.iter().zip(&weights) {
            weight_sum = weight_sum.add(*weight)?;
            weighted_shares = weighted_shares.add(share.mul(*weight)?)?;
        }
        let log_sum = max.div(state.b)?.add(M::ln(weight_sum)?)?;
        let level = state.alpha.mul(log_sum)?;
        let denominator = state.total_shares.mul(weight_sum)?;

        weights
            .iter()
            .map(|weight| -> Result<Fixed, LmsrError> {
                let spread = state
                    .total_shares
                    .mul(*weight)?
                    .sub(weighted_shares)?;
                Ok(level.add(spread.div(denominator)?)?)
            })
            .collect()
    }

    /// `exp((q_i - max) / b)` for each outcome, zero where negligible
    fn shifted_weights<'a>(
        &'a self,
        q: &'a [Fixed],
        max: Fixed,
        b: Fixed,
    ) -> Result<impl Iterator<Item = Result<Fixed, LmsrError>> + 'a, LmsrError>
    {
        if !b.is_positive() {
            return Err(LmsrError::NonPositiveBeta(b));
        }
        Ok(q.iter().map(move |share| {
            let exponent = share.sub(max)?.div(b)?;
            if exponent < NEGLIGIBLE_EXPONENT {
                return Ok(Fixed::ZERO);
            }
            Ok(M::exp(exponent)?)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::transcendental::CompactTaylor;

    fn fixed(value: i128) -> Fixed {
        Fixed::from_int(value).unwrap()
    }

    fn mask(bits: u128) -> OutcomeMask {
        OutcomeMask::new(bits).unwrap()
    }

    /// Market seeded like setup does: `n` outcomes of `share` each
    fn seeded_state(
        n: usize,
        share: Fixed,
        overround_bips: u32,
    ) -> MarketState {
        let lmsr = LsLmsr::new();
        let alpha = lmsr.alpha(n, overround_bips).unwrap();
        let total_shares = share.mul(fixed(n as i128)).unwrap();
        let b = total_shares.mul(alpha).unwrap();
        let q = vec![share; n];
        let current_cost = lmsr.cost(&q, b).unwrap();
        MarketState {
            num_outcomes: n,
            q,
            alpha,
            b,
            total_shares,
            current_cost,
            initialized: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_alpha() {
        let lmsr = LsLmsr::new();
        let alpha = lmsr.alpha(2, 100).unwrap();
        let expected = 0.01 / (2.0 * 2f64.ln());
        assert!((alpha.to_f64() - expected).abs() < 1e-15);

        assert_eq!(lmsr.alpha(2, 0), Err(LmsrError::NonPositiveOverround));
        assert!(matches!(
            lmsr.alpha(1, 100),
            Err(LmsrError::InvalidOutcomeCount { count: 1, .. })
        ));
    }

    #[test]
    fn test_cost_uniform() {
        // C(s, .., s) = s + b * ln(n)
        let lmsr = LsLmsr::new();
        let q = vec![fixed(100); 3];
        let b = fixed(7);
        let cost = lmsr.cost(&q, b).unwrap().to_f64();
        assert!((cost - (100.0 + 7.0 * 3f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_cost_matches_direct_formula() {
        let lmsr = LsLmsr::new();
        let q = vec![fixed(10), fixed(5), fixed(1)];
        let b = fixed(14);
        let direct = 14.0
            * [10.0f64, 5.0, 1.0]
                .iter()
                .map(|q| (q / 14.0).exp())
                .sum::<f64>()
                .ln();
        let cost = lmsr.cost(&q, b).unwrap().to_f64();
        assert!((cost - direct).abs() < 1e-12);
    }

    #[test]
    fn test_cost_requires_positive_beta() {
        let lmsr = LsLmsr::new();
        assert_eq!(
            lmsr.cost(&[fixed(1), fixed(1)], Fixed::ZERO),
            Err(LmsrError::NonPositiveBeta(Fixed::ZERO))
        );
        assert_eq!(lmsr.cost(&[], Fixed::ZERO).unwrap(), Fixed::ZERO);
    }

    #[test]
    fn test_cost_survives_extreme_imbalance() {
        // (q_0 - q_1) / b is far past the point where exp underflows
        let lmsr = LsLmsr::new();
        let q = vec![fixed(1_000_000), fixed(1)];
        let cost = lmsr.cost(&q, fixed(100)).unwrap();
        assert!((cost.to_f64() - 1_000_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_market_cost_before_setup_is_zero() {
        let lmsr = LsLmsr::new();
        assert_eq!(
            lmsr.market_cost(&MarketState::default()).unwrap(),
            Fixed::ZERO
        );
        assert_eq!(
            lmsr.quote_price(&MarketState::default(), mask(1), fixed(1)),
            Err(LmsrError::NotInitialized)
        );
    }

    #[test]
    fn test_cost_after_buy_updates_volume() {
        let lmsr = LsLmsr::new();
        let state = seeded_state(4, fixed(100), 500);
        let quote = lmsr
            .cost_after_buy(
                &state.q,
                state.total_shares,
                state.alpha,
                mask(0b0101),
                fixed(10),
            )
            .unwrap();
        assert_eq!(
            quote.q,
            vec![fixed(110), fixed(100), fixed(110), fixed(100)]
        );
        assert_eq!(quote.total_shares, fixed(420));
        assert_eq!(quote.b, state.alpha.mul(fixed(420)).unwrap());
        assert!(quote.cost > state.current_cost);
    }

    #[test]
    fn test_mask_out_of_range() {
        let lmsr = LsLmsr::new();
        let state = seeded_state(2, fixed(100), 100);
        assert!(matches!(
            lmsr.quote_price(&state, mask(0b100), fixed(1)),
            Err(LmsrError::MaskOutOfRange { num_outcomes: 2, .. })
        ));
    }

    #[test]
    fn test_average_price_rises_with_size() {
        let lmsr = LsLmsr::new();
        for n in [2, 3, 5, 8] {
            let state = seeded_state(n, fixed(100), 300);
            let mut previous: Option<f64> = None;
            for amount in [1, 5, 20, 80, 320] {
                let price = lmsr
                    .quote_price(&state, mask(1), fixed(amount))
                    .unwrap()
                    .to_f64();
                let per_unit = price / amount as f64;
                assert!(price > 0.0);
                if let Some(previous) = previous {
                    assert!(
                        per_unit > previous,
                        "n = {n}, amount = {amount}: {per_unit} <= {previous}"
                    );
                }
                previous = Some(per_unit);
            }
        }
    }

    #[test]
    fn test_marginal_prices_at_setup() {
        let lmsr = LsLmsr::new();
        let state = seeded_state(4, fixed(250), 501);
        let prices = lmsr.marginal_prices(&state).unwrap();
        let expected = 1.0501 / 4.0;
        for price in &prices {
            assert!((price.to_f64() - expected).abs() < 1e-12);
        }
        let sum: f64 = prices.iter().map(|price| price.to_f64()).sum();
        assert!((sum - 1.0501).abs() < 1e-12);
    }

    #[test]
    fn test_marginal_prices_bounded_after_trades() {
        let lmsr = LsLmsr::new();
        let mut state = seeded_state(3, fixed(100), 400);
        for (bits, amount) in [(0b001, 50), (0b011, 20), (0b001, 200)] {
            let quote = lmsr.quote(&state, mask(bits), fixed(amount)).unwrap();
            state.apply_trade(quote);
            let prices = lmsr.marginal_prices(&state).unwrap();
            let sum: f64 = prices.iter().map(|price| price.to_f64()).sum();
            assert!(sum >= 1.0 - 1e-12 && sum <= 1.04 + 1e-12, "sum = {sum}");
            assert!(prices[0] > prices[2]);
        }
    }

    #[test]
    fn test_compact_taylor_tracks_precise_strategy() {
        let precise = LsLmsr::new();
        let compact = LsLmsr::<CompactTaylor>::with_math();
        let q = vec![fixed(120), fixed(100), fixed(90)];
        let b = fixed(12);
        let a = precise.cost(&q, b).unwrap().to_f64();
        let c = compact.cost(&q, b).unwrap().to_f64();
        // relative exp error e moves the cost by at most b * ln(1 + e)
        assert!((a - c).abs() < 12.0 * 2e-3);
    }
}
