//! Thread-safe market handle.
//!
//! One lock guards a market together with its ledgers. Mutations hold the
//! write lock across the whole quote, ledger effects and commit sequence, so
//! readers only ever see committed state.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::MarketParams;
use crate::ledger::{CollateralLedger, Ledgers, PositionLedger};
use crate::market::MarketMaker;
use crate::math::fixed::Fixed;
use crate::math::transcendental::{BinaryExpansion, Transcendental};
use crate::state::{MarketError, MarketState, OutcomeMask, Phase};
use crate::types::Address;

#[derive(Debug)]
struct Inner<P, C, M> {
    market: MarketMaker<M>,
    ledgers: Ledgers<P, C>,
}

#[derive(Debug)]
pub struct SharedMarket<P, C, M = BinaryExpansion> {
    inner: Arc<RwLock<Inner<P, C, M>>>,
}

impl<P, C, M> Clone for SharedMarket<P, C, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, C, M> SharedMarket<P, C, M>
where
    P: PositionLedger + Clone,
    C: CollateralLedger + Clone,
    M: Transcendental,
{
    pub fn new(market: MarketMaker<M>, ledgers: Ledgers<P, C>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner { market, ledgers })),
        }
    }

    pub fn setup(&self, params: &MarketParams) -> Result<(), MarketError> {
        let mut inner = self.inner.write();
        let Inner { market, ledgers } = &mut *inner;
        market.setup(ledgers, params)
    }

    pub fn buy(
        &self,
        buyer: Address,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<Fixed, MarketError> {
        let mut inner = self.inner.write();
        let Inner { market, ledgers } = &mut *inner;
        market.buy(ledgers, buyer, mask, amount)
    }

    pub fn resolve_market(
        &self,
        caller: Address,
        payouts: &[u128],
    ) -> Result<(), MarketError> {
        let mut inner = self.inner.write();
        let Inner { market, ledgers } = &mut *inner;
        market.resolve_market(ledgers, caller, payouts)
    }

    pub fn withdraw(&self, caller: Address) -> Result<u128, MarketError> {
        let mut inner = self.inner.write();
        let Inner { market, ledgers } = &mut *inner;
        market.withdraw(ledgers, caller)
    }

    pub fn price(
        &self,
        mask: OutcomeMask,
        amount: Fixed,
    ) -> Result<Fixed, MarketError> {
        self.inner.read().market.price(mask, amount)
    }

    pub fn cost(&self) -> Fixed {
        self.inner.read().market.cost()
    }

    pub fn phase(&self) -> Phase {
        self.inner.read().market.phase()
    }

    pub fn marginal_prices(&self) -> Result<Vec<Fixed>, MarketError> {
        self.inner.read().market.marginal_prices()
    }

    /// Snapshot of the committed market state
    pub fn state(&self) -> MarketState {
        self.inner.read().market.state().clone()
    }

    pub fn with_ledgers<R>(&self, f: impl FnOnce(&Ledgers<P, C>) -> R) -> R {
        f(&self.inner.read().ledgers)
    }

    /// Direct ledger access, e.g. to fund buyers. Holds the write lock.
    pub fn with_ledgers_mut<R>(
        &self,
        f: impl FnOnce(&mut Ledgers<P, C>) -> R,
    ) -> R {
        f(&mut self.inner.write().ledgers)
    }
}
