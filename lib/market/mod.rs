//! Market maker lifecycle.
//!
//! A market moves `Uninitialized -> Initialized -> Resolved`. Every mutating
//! operation quotes first, then applies its ledger effects, then commits the
//! new [`MarketState`]. All three happen against staged copies, so a failure
//! at any step leaves the market and both ledgers untouched.

use std::iter;

use itertools::Itertools;

use crate::config::MarketParams;
use crate::ledger::{
    CollateralLedger, CollectionId, ConditionId, Ledgers, PositionId,
    PositionLedger,
};
use crate::math::fixed::Fixed;
use crate::math::lmsr::{BIPS_SCALE, LsLmsr};
use crate::math::tokens::{Rounding, from_token_units, to_token_units};
use crate::math::transcendental::{BinaryExpansion, Transcendental};
use crate::state::{MarketError, MarketState, OutcomeMask, Phase};
use crate::types::Address;

pub mod shared;

pub use shared::SharedMarket;

/// Run `op` against copies of the state and ledgers, keeping the copies only
/// if it succeeds
fn transact<P, C, T, F>(
    state: &mut MarketState,
    ledgers: &mut Ledgers<P, C>,
    op: F,
) -> Result<T, MarketError>
where
    P: Clone,
    C: Clone,
    F: FnOnce(&mut MarketState, &mut Ledgers<P, C>) -> Result<T, MarketError>,
{
    let mut staged_state = state.clone();
    let mut staged_ledgers = ledgers.clone();
    let output = op(&mut staged_state, &mut staged_ledgers)?;
    *state = staged_state;
    *ledgers = staged_ledgers;
    Ok(output)
}

/// LS-LMSR market maker over one condition
#[derive(Clone, Debug)]
pub struct MarketMaker<M = BinaryExpansion> {
    /// Identity the market holds collateral and positions under
    address: Address,
    owner: Address,
    state: MarketState,
    engine: LsLmsr<M>,
}

impl MarketMaker {
    pub fn new(address: Address, owner: Address) -> Self {
        Self::with_math(address, owner)
    }
}

impl<M: Transcendental> MarketMaker<M> {
    pub fn with_math(address: Address, owner: Address) -> Self {
        Self::from_state(address, owner, MarketState::default())
    }

    /// Resume a market from a snapshot
    pub fn from_state(
        address: Address,
        owner: Address,
        state: MarketState,
    ) -> Self {
        Self {
            address,
            owner,
            state,
            engine: LsLmsr::with_math(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn num_outcomes(&self) -> usize {
        self.state.num_outcomes
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn oracle(&self) -> Option<Address> {
        self.state.oracle
    }

    pub fn condition(&self) -> Option<ConditionId> {
        self.state.condition
    }

    /// Current value of the cost function, zero before setup
    pub fn cost(&self) -> Fixed {
        self.state.current_cost
    }

    /// Price of buying `amount` of every outcome in `mask`, without trading
    pub fn price(
        &self,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<Fixed, MarketError> {
        if !self.state.initialized {
            return Err(MarketError::NotInitialized);
        }
        validate_trade(&self.state, mask, amount)?;
        let (amount, _) = snap_to_units(&self.state, amount)?;
        Ok(self.engine.quote_price(&self.state, mask, amount)?)
    }

    pub fn marginal_prices(&self) -> Result<Vec<Fixed>, MarketError> {
        Ok(self.engine.marginal_prices(&self.state)?)
    }

    /// Initialize the market from a subsidy the market already holds.
    ///
    /// The subsidy is spread evenly over the outcomes so that the initial
    /// cost equals the subsidy: with overround `v` each outcome is seeded
    /// with `subsidy / (1 + v)` shares.
    pub fn setup<P, C>(
        &mut self,
        ledgers: &mut Ledgers<P, C>,
        params: &MarketParams,
    ) -> Result<(), MarketError>
    where
        P: PositionLedger + Clone,
        C: CollateralLedger + Clone,
    {
        if self.state.initialized {
            tracing::warn!(
                market = %self.address,
                "setup on an initialized market"
            );
            return Err(MarketError::AlreadyInitialized);
        }
        params.validate()?;
        let available = ledgers.collateral.balance_of(&self.address);
        if available < params.subsidy {
            return Err(MarketError::InsufficientFunding {
                required: params.subsidy,
                available,
            });
        }

        let address = self.address;
        let engine = self.engine;
        transact(&mut self.state, ledgers, |state, ledgers| {
            let n = params.num_outcomes;
            let condition = ledgers.positions.prepare_condition(
                params.oracle,
                params.question_id,
                n,
            )?;
            // splits pull collateral from the market
            ledgers.collateral.approve(
                address,
                ledgers.positions.address(),
                u128::MAX,
            );
            let decimals = ledgers.collateral.decimals();

            let alpha = engine.alpha(n, params.overround_bips)?;
            let overround = Fixed::divu(
                u128::from(params.overround_bips),
                BIPS_SCALE,
            )?;
            let subsidy = from_token_units(params.subsidy, decimals)?;
            let share = subsidy.div(Fixed::ONE.add(overround)?)?;
            let total_shares = share.mul(Fixed::from_uint(n as u128)?)?;
            let b = total_shares.mul(alpha)?;
            let q = vec![share; n];
            let current_cost = engine.cost(&q, b)?;

            *state = MarketState {
                num_outcomes: n,
                q,
                alpha,
                b,
                total_shares,
                current_cost,
                initialized: true,
                resolved: false,
                oracle: Some(params.oracle),
                question_id: Some(params.question_id),
                condition: Some(condition),
                collateral_decimals: decimals,
            };
            tracing::info!(
                market = %address,
                %condition,
                num_outcomes = n,
                cost = %current_cost,
                "market initialized"
            );
            Ok(())
        })
    }

    /// Buy `amount` shares of every outcome in `mask`, paying the returned
    /// price in collateral
    pub fn buy<P, C>(
        &mut self,
        ledgers: &mut Ledgers<P, C>,
        buyer: Address,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<Fixed, MarketError>
    where
        P: PositionLedger + Clone,
        C: CollateralLedger + Clone,
    {
        let condition =
            self.state.condition.ok_or(MarketError::NotInitialized)?;
        if !self.state.initialized {
            return Err(MarketError::NotInitialized);
        }
        if self.state.resolved
            || ledgers.positions.payout_denominator(&condition)? != 0
        {
            tracing::warn!(
                market = %self.address,
                %buyer,
                "buy on a resolved market"
            );
            return Err(MarketError::MarketResolved);
        }
        validate_trade(&self.state, mask, amount)?;
        let decimals = self.state.collateral_decimals;
        let (amount, shares) = snap_to_units(&self.state, amount)?;

        let quote = self.engine.quote(&self.state, mask, amount)?;
        let price = quote.cost.sub(self.state.current_cost)?;
        let payment = to_token_units(price, decimals, Rounding::Up)?;

        let address = self.address;
        let num_outcomes = self.state.num_outcomes;
        transact(&mut self.state, ledgers, |state, ledgers| {
            if !ledgers
                .collateral
                .transfer_from(address, buyer, address, payment)?
            {
                return Err(MarketError::PaymentFailed {
                    buyer,
                    amount: payment,
                });
            }

            let position = position_for(ledgers, &condition, mask);
            if ledgers.positions.balance_of(&address, &position) < shares {
                let partition = iter::once(mask)
                    .chain(mask.complement_singletons(num_outcomes))
                    .collect_vec();
                ledgers.positions.split_position(
                    &mut ledgers.collateral,
                    address,
                    CollectionId::ROOT,
                    condition,
                    &partition,
                    shares,
                )?;
            }
            ledgers
                .positions
                .safe_transfer_from(address, buyer, position, shares)?;

            state.apply_trade(quote);
            Ok(())
        })?;
        tracing::debug!(
            market = %self.address,
            %buyer,
            %mask,
            %amount,
            %price,
            "trade executed"
        );
        Ok(price)
    }

    /// Report the outcome to the position ledger and stop trading
    pub fn resolve_market<P, C>(
        &mut self,
        ledgers: &mut Ledgers<P, C>,
        caller: Address,
        payouts: &[u128],
    ) -> Result<(), MarketError>
    where
        P: PositionLedger + Clone,
        C: CollateralLedger + Clone,
    {
        self.ensure_owner(caller)?;
        let condition =
            self.state.condition.ok_or(MarketError::NotInitialized)?;
        if self.state.resolved
            || ledgers.positions.payout_denominator(&condition)? != 0
        {
            return Err(MarketError::AlreadyResolved);
        }
        if payouts.len() != self.state.num_outcomes {
            return Err(MarketError::InvalidPayoutLength {
                expected: self.state.num_outcomes,
                actual: payouts.len(),
            });
        }

        transact(&mut self.state, ledgers, |state, ledgers| {
            ledgers.positions.report_payouts(condition, payouts)?;
            state.resolved = true;
            Ok(())
        })?;
        tracing::info!(
            market = %self.address,
            %condition,
            ?payouts,
            "market resolved"
        );
        Ok(())
    }

    /// Redeem every outcome the market still holds and hand the collateral
    /// to the owner. Returns the amount transferred.
    pub fn withdraw<P, C>(
        &mut self,
        ledgers: &mut Ledgers<P, C>,
        caller: Address,
    ) -> Result<u128, MarketError>
    where
        P: PositionLedger + Clone,
        C: CollateralLedger + Clone,
    {
        self.ensure_owner(caller)?;
        let condition = self.state.condition.ok_or(MarketError::NotResolved)?;
        if ledgers.positions.payout_denominator(&condition)? == 0 {
            return Err(MarketError::NotResolved);
        }

        let address = self.address;
        let singletons = (0..self.state.num_outcomes)
            .map(OutcomeMask::singleton)
            .collect::<Result<Vec<_>, _>>()?;
        let withdrawn = transact(&mut self.state, ledgers, |_, ledgers| {
            ledgers.positions.redeem_positions(
                &mut ledgers.collateral,
                address,
                CollectionId::ROOT,
                condition,
                &singletons,
            )?;
            let balance = ledgers.collateral.balance_of(&address);
            ledgers.collateral.transfer(address, caller, balance)?;
            Ok(balance)
        })?;
        tracing::info!(
            market = %self.address,
            %condition,
            withdrawn,
            "collateral withdrawn"
        );
        Ok(withdrawn)
    }

    fn ensure_owner(&self, caller: Address) -> Result<(), MarketError> {
        if caller != self.owner {
            tracing::warn!(
                market = %self.address,
                %caller,
                "caller is not the owner"
            );
            return Err(MarketError::Unauthorized { caller });
        }
        Ok(())
    }
}

/// Outcome mask and amount checks shared by quoting and trading. A mask
/// selecting every outcome is rejected: the full set has no position of its
/// own at the ledger.
fn validate_trade(
    state: &MarketState,
    mask: OutcomeMask,
    amount: Fixed,
) -> Result<(), MarketError> {
    let n = state.num_outcomes;
    if !mask.is_within(n) || mask.count() as usize >= n {
        return Err(MarketError::InvalidOutcome { mask: mask.bits() });
    }
    if !amount.is_positive() {
        return Err(MarketError::InvalidAmount(amount));
    }
    Ok(())
}

/// Round `amount` down to whole collateral token units, the finest
/// quantity the position ledger can issue. Returns the rounded amount and
/// its size in token units.
fn snap_to_units(
    state: &MarketState,
    amount: Fixed,
) -> Result<(Fixed, u128), MarketError> {
    let decimals = state.collateral_decimals;
    let shares = to_token_units(amount, decimals, Rounding::Down)?;
    if shares == 0 {
        return Err(MarketError::InvalidAmount(amount));
    }
    Ok((from_token_units(shares, decimals)?, shares))
}

fn position_for<P, C>(
    ledgers: &Ledgers<P, C>,
    condition: &ConditionId,
    mask: OutcomeMask,
) -> PositionId
where
    P: PositionLedger,
    C: CollateralLedger,
{
    let collection = ledgers.positions.collection_id(
        &CollectionId::ROOT,
        condition,
        mask,
    );
    ledgers
        .positions
        .position_id(&ledgers.collateral.token(), &collection)
}
