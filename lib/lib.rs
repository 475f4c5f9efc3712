//! Liquidity-sensitive LMSR automated market maker for multi-outcome
//! prediction markets, priced in deterministic 64.64 fixed point.

pub mod config;
pub mod ledger;
pub mod market;
pub mod math;
pub mod state;
pub mod types;

pub use config::MarketParams;
pub use ledger::{CollateralLedger, Ledgers, PositionLedger};
pub use market::{MarketMaker, SharedMarket};
pub use math::fixed::Fixed;
pub use state::{MarketError, MarketState, OutcomeMask, Phase};
