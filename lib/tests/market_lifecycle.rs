//! End-to-end market scenarios against the in-memory ledgers

use lslmsr_amm::ledger::{
    CollectionId, InMemoryCollateral, InMemoryPositionLedger,
};
use lslmsr_amm::math::tokens::{Rounding, to_token_units};
use lslmsr_amm::types::{Address, QuestionId};
use lslmsr_amm::{
    CollateralLedger, Fixed, Ledgers, MarketError, MarketMaker, MarketParams,
    MarketState, OutcomeMask, Phase, PositionLedger, SharedMarket,
};
use tracing_subscriber::EnvFilter;

const MARKET: Address = Address::new([0xaa; 20]);
const OWNER: Address = Address::new([0x01; 20]);
const ORACLE: Address = Address::new([0x02; 20]);
const ALICE: Address = Address::new([0x03; 20]);
const BOB: Address = Address::new([0x04; 20]);
const CUSTODY: Address = Address::new([0x05; 20]);
const TOKEN: Address = Address::new([0x06; 20]);
const DECIMALS: u8 = 18;
const UNIT: u128 = 1_000_000_000_000_000_000;

type MemoryLedgers = Ledgers<InMemoryPositionLedger, InMemoryCollateral>;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Ledgers where the market holds `subsidy` whole tokens and both traders
/// are funded and have approved the market
fn funded_ledgers(subsidy: u128) -> anyhow::Result<MemoryLedgers> {
    let mut collateral = InMemoryCollateral::new(TOKEN, DECIMALS);
    collateral.mint(MARKET, subsidy * UNIT)?;
    for trader in [ALICE, BOB] {
        collateral.mint(trader, 10_000 * UNIT)?;
        collateral.approve(trader, MARKET, u128::MAX);
    }
    Ok(Ledgers::new(InMemoryPositionLedger::new(CUSTODY), collateral))
}

fn params(num_outcomes: usize, subsidy: u128, bips: u32) -> MarketParams {
    MarketParams {
        oracle: ORACLE,
        question_id: QuestionId::from_text("which team wins the final"),
        num_outcomes,
        subsidy: subsidy * UNIT,
        overround_bips: bips,
    }
}

fn open_market(
    num_outcomes: usize,
    subsidy: u128,
    bips: u32,
) -> anyhow::Result<(MarketMaker, MemoryLedgers)> {
    init_tracing();
    let mut ledgers = funded_ledgers(subsidy)?;
    let mut market = MarketMaker::new(MARKET, OWNER);
    market.setup(&mut ledgers, &params(num_outcomes, subsidy, bips))?;
    Ok((market, ledgers))
}

fn whole(value: i128) -> anyhow::Result<Fixed> {
    Ok(Fixed::from_int(value)?)
}

#[test]
fn four_outcome_market_prices_rise_with_demand() -> anyhow::Result<()> {
    let (mut market, mut ledgers) = open_market(4, 1_000, 501)?;
    let cost = market.cost().to_f64();
    assert!((cost - 1_000.0).abs() / 1_000.0 < 1e-9, "cost = {cost}");

    let mask = OutcomeMask::new(1)?;
    let first = market.buy(&mut ledgers, ALICE, mask, whole(10)?)?;
    assert!(first.is_positive());
    assert!(first < whole(10)?);

    let second = market.buy(&mut ledgers, ALICE, mask, whole(10)?)?;
    assert!(second > first, "{second} <= {first}");
    assert!(second < whole(10)?);
    Ok(())
}

#[test]
fn two_outcome_market_is_symmetric() -> anyhow::Result<()> {
    let amount = whole(5)?;
    let (mut left, mut left_ledgers) = open_market(2, 100, 100)?;
    let (mut right, mut right_ledgers) = open_market(2, 100, 100)?;

    let first = OutcomeMask::singleton(0)?;
    let second = OutcomeMask::singleton(1)?;
    assert_eq!(left.price(first, amount)?, left.price(second, amount)?);

    let on_first = left.buy(&mut left_ledgers, ALICE, first, amount)?;
    let on_second = right.buy(&mut right_ledgers, ALICE, second, amount)?;
    assert!((on_first.to_f64() - on_second.to_f64()).abs() < 1e-12);
    Ok(())
}

#[test]
fn multi_outcome_buy_leaves_dust_with_market() -> anyhow::Result<()> {
    let (mut market, mut ledgers) = open_market(5, 1_000, 300)?;
    let mask = OutcomeMask::new(0b00110)?;
    let single = market.price(OutcomeMask::singleton(1)?, whole(4)?)?;
    let price = market.buy(&mut ledgers, BOB, mask, whole(4)?)?;
    // two outcomes cost more than one, but less than two separate buys
    // at the same starting prices
    assert!(price > single);
    assert!(price < single.add(single)?);

    let state = market.state();
    assert_eq!(state.q[1], state.q[2]);
    assert_eq!(state.q[1], state.q[0].add(whole(4)?)?);
    assert_eq!(
        state.total_shares,
        state.q.iter().try_fold(Fixed::ZERO, |acc, q| acc.add(*q))?
    );
    Ok(())
}

#[test]
fn marginal_prices_carry_the_overround() -> anyhow::Result<()> {
    for (n, bips) in [(2, 100), (4, 501), (7, 1_000)] {
        let (mut market, mut ledgers) = open_market(n, 1_000, bips)?;
        let overround = f64::from(bips) / 10_000.0;
        let sum: f64 =
            market.marginal_prices()?.iter().map(|p| p.to_f64()).sum();
        assert!((sum - (1.0 + overround)).abs() < 1e-9, "sum = {sum}");

        let first = OutcomeMask::singleton(0)?;
        market.buy(&mut ledgers, ALICE, first, whole(50)?)?;
        let prices = market.marginal_prices()?;
        let sum: f64 = prices.iter().map(|p| p.to_f64()).sum();
        assert!(sum >= 1.0 - 1e-9 && sum <= 1.0 + overround + 1e-9);
        assert!(prices[0] > prices[1]);
    }
    Ok(())
}

#[test]
fn lifecycle_guards() -> anyhow::Result<()> {
    init_tracing();
    let mut ledgers = funded_ledgers(1_000)?;
    let mut market = MarketMaker::new(MARKET, OWNER);
    let mask = OutcomeMask::singleton(0)?;
    assert_eq!(market.phase(), Phase::Uninitialized);
    assert_eq!(
        market.buy(&mut ledgers, ALICE, mask, whole(1)?),
        Err(MarketError::NotInitialized)
    );

    market.setup(&mut ledgers, &params(3, 1_000, 200))?;
    assert_eq!(
        market.setup(&mut ledgers, &params(3, 1_000, 200)),
        Err(MarketError::AlreadyInitialized)
    );

    market.resolve_market(&mut ledgers, OWNER, &[0, 1, 0])?;
    assert_eq!(
        market.resolve_market(&mut ledgers, OWNER, &[0, 1, 0]),
        Err(MarketError::AlreadyResolved)
    );
    assert_eq!(
        market.buy(&mut ledgers, ALICE, mask, whole(1)?),
        Err(MarketError::MarketResolved)
    );
    assert_eq!(market.phase(), Phase::Resolved);
    Ok(())
}

#[test]
fn full_lifecycle_settles_every_party() -> anyhow::Result<()> {
    let (mut market, mut ledgers) = open_market(3, 1_000, 400)?;
    let alice_pick = OutcomeMask::singleton(0)?;
    let bob_pick = OutcomeMask::singleton(2)?;
    let alice_paid = market.buy(&mut ledgers, ALICE, alice_pick, whole(30)?)?;
    let bob_paid = market.buy(&mut ledgers, BOB, bob_pick, whole(20)?)?;

    market.resolve_market(&mut ledgers, OWNER, &[1, 0, 0])?;
    let condition = market.condition().ok_or(MarketError::NotInitialized)?;

    // alice redeems her winning shares at the ledger
    let paid_out = ledgers.positions.redeem_positions(
        &mut ledgers.collateral,
        ALICE,
        CollectionId::ROOT,
        condition,
        &[alice_pick],
    )?;
    assert_eq!(paid_out, 30 * UNIT);

    let withdrawn = market.withdraw(&mut ledgers, OWNER)?;
    let collected = to_token_units(alice_paid, DECIMALS, Rounding::Up)?
        + to_token_units(bob_paid, DECIMALS, Rounding::Up)?;
    // subsidy plus payments, less the 30 paid to alice
    assert_eq!(withdrawn, 1_000 * UNIT + collected - 30 * UNIT);
    assert_eq!(ledgers.collateral.balance_of(&OWNER), withdrawn);
    assert_eq!(ledgers.collateral.balance_of(&MARKET), 0);
    assert_eq!(ledgers.collateral.balance_of(&CUSTODY), 0);
    Ok(())
}

#[test]
fn snapshot_restores_pricing() -> anyhow::Result<()> {
    let (mut market, mut ledgers) = open_market(4, 1_000, 250)?;
    market.buy(&mut ledgers, BOB, OutcomeMask::new(0b1001)?, whole(12)?)?;
    let json = serde_json::to_string(market.state())?;
    let restored: MarketMaker = MarketMaker::from_state(
        MARKET,
        OWNER,
        serde_json::from_str::<MarketState>(&json)?,
    );
    let mask = OutcomeMask::singleton(2)?;
    assert_eq!(
        restored.price(mask, whole(3)?)?,
        market.price(mask, whole(3)?)?
    );
    Ok(())
}

#[test]
fn shared_market_runs_the_same_lifecycle() -> anyhow::Result<()> {
    init_tracing();
    let shared = SharedMarket::new(
        MarketMaker::new(MARKET, OWNER),
        funded_ledgers(1_000)?,
    );
    shared.setup(&params(4, 1_000, 501))?;
    let mask = OutcomeMask::singleton(3)?;
    let quoted = shared.price(mask, whole(10)?)?;
    assert_eq!(shared.buy(ALICE, mask, whole(10)?)?, quoted);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            std::thread::spawn(move || shared.cost())
        })
        .collect();
    let cost = shared.cost();
    for reader in readers {
        let read = reader
            .join()
            .map_err(|_| anyhow::anyhow!("reader panicked"))?;
        assert_eq!(read, cost);
    }

    shared.resolve_market(OWNER, &[0, 0, 0, 1])?;
    assert_eq!(shared.phase(), Phase::Resolved);
    assert!(shared.withdraw(OWNER)? > 0);
    Ok(())
}
