
use anchor_lang::prelude::Pubkey;
use common::setup::{exp, market_error, units, Fixture};
use money_market::{
    Exp, InterestRateModel, MarketError, RateModel, TokenCustody, WhitePaperModel, EXP_SCALE, REPAY_MAX,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn per_block_model(base_mantissa: u128) -> RateModel {
    RateModel::WhitePaper(WhitePaperModel {
        base_rate_per_block: Exp::new(base_mantissa),
        multiplier_per_block: Exp::ZERO,
    })
}

#[test]
fn test_mint_then_redeem_everything_empties_the_market() {
    let mut fx = Fixture::two_markets();
    let supplier = Pubkey::new_unique();
    fx.fund(fx.asset_a, supplier, units(100));

    let minted = fx.engine.mint(supplier, fx.market_a, units(100)).unwrap();
    assert_eq!(minted, units(100));
    let market = fx.engine.market(&fx.market_a).unwrap();
    assert_eq!(market.total_supply, units(100));
    assert_eq!(market.cash, units(100));
    assert_eq!(fx.balance(fx.asset_a, supplier), 0);

    let paid = fx.engine.redeem(supplier, fx.market_a, units(100)).unwrap();
    assert_eq!(paid, units(100));
    let market = fx.engine.market(&fx.market_a).unwrap();
    assert_eq!(market.total_supply, 0);
    assert_eq!(market.cash, 0);
    assert_eq!(fx.engine.supply_rate_per_block(&fx.market_a).unwrap(), Exp::ZERO);
    assert_eq!(fx.balance(fx.asset_a, supplier), units(100));
}

#[test]
fn test_mint_without_allowance_fails_and_leaves_state() {
    let mut fx = Fixture::two_markets();
    let supplier = Pubkey::new_unique();
    fx.engine
        .tokens_mut()
        .mint_to(&fx.asset_a, &supplier, units(10))
        .unwrap();

    let before = fx.engine.snapshot_bytes().unwrap();
    let err = fx.engine.mint(supplier, fx.market_a, units(10)).unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientAllowanceOrBalance));
    assert_eq!(fx.engine.snapshot_bytes().unwrap(), before);
    assert_eq!(fx.balance(fx.asset_a, supplier), units(10));
}

#[test]
fn test_mint_beyond_balance_fails() {
    let mut fx = Fixture::two_markets();
    let supplier = Pubkey::new_unique();
    fx.fund(fx.asset_a, supplier, units(5));

    let err = fx.engine.mint(supplier, fx.market_a, units(6)).unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientAllowanceOrBalance));
}

#[test]
fn test_zero_amounts_and_unlisted_markets_are_rejected() {
    let mut fx = Fixture::two_markets();
    let user = Pubkey::new_unique();
    fx.fund(fx.asset_a, user, units(1));

    assert_eq!(
        fx.engine.mint(user, fx.market_a, 0).unwrap_err(),
        market_error(MarketError::InvalidAmount)
    );
    assert_eq!(
        fx.engine.mint(user, Pubkey::new_unique(), units(1)).unwrap_err(),
        market_error(MarketError::MarketNotListed)
    );
    assert_eq!(
        fx.engine.borrow(user, Pubkey::new_unique(), units(1)).unwrap_err(),
        market_error(MarketError::MarketNotListed)
    );
    assert_eq!(
        fx.engine.redeem(user, fx.market_a, 0).unwrap_err(),
        market_error(MarketError::InvalidAmount)
    );
}

#[test]
fn test_redeem_underlying_rounds_burned_tokens_up() {
    let mut fx = Fixture::two_markets();
    let asset = Pubkey::new_unique();
    let market = fx
        .engine
        .support_market(fx.admin, asset, RateModel::zero(), exp("3"), Exp::ZERO)
        .unwrap();
    let user = Pubkey::new_unique();
    fx.fund(asset, user, 10);

    // 10 / 3 truncates to 3 tokens, leaving the rate at 3.33..
    assert_eq!(fx.engine.mint(user, market, 10).unwrap(), 3);
    assert_eq!(
        fx.engine.exchange_rate_stored(&market).unwrap(),
        Exp::new(3_333_333_333_333_333_333)
    );

    // 5 / 3.33.. is 1.5 tokens, so 2 are burned
    let burned = fx.engine.redeem_underlying(user, market, 5).unwrap();
    assert_eq!(burned, 2);
    assert_eq!(fx.engine.receipt_balance(&market, &user), 1);
    assert_eq!(fx.balance(asset, user), 5);
    assert_eq!(fx.engine.exchange_rate_stored(&market).unwrap(), Exp::from_units(5).unwrap());
}

#[test]
fn test_redeem_more_than_held_fails() {
    let mut fx = Fixture::two_markets();
    let supplier = fx.supplier_with_a(units(10));

    let err = fx.engine.redeem(supplier, fx.market_a, units(10) + 1).unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientBalance));
}

#[test]
fn test_redeem_beyond_cash_fails_with_insufficient_cash() {
    let mut fx = Fixture::two_markets();
    let supplier = fx.supplier_with_a(units(100));
    fx.borrower(units(1), units(50));

    let before = fx.engine.snapshot_bytes().unwrap();
    let err = fx.engine.redeem(supplier, fx.market_a, units(100)).unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientCash));
    assert_eq!(fx.engine.snapshot_bytes().unwrap(), before);

    // Whatever cash remains can still leave.
    fx.engine.redeem(supplier, fx.market_a, units(50)).unwrap();
    assert_eq!(fx.engine.get_cash(&fx.market_a).unwrap(), 0);
}

#[test]
fn test_interest_accrues_into_borrows_reserves_and_index() {
    let mut fx = Fixture::two_markets_with(per_block_model(1_000_000_000_000), exp("0.1"));
    fx.supplier_with_a(units(100));
    let borrower = fx.borrower(units(1), units(50));

    fx.engine.advance_blocks(100);
    fx.engine.accrue_interest(&fx.market_a).unwrap();

    let market = fx.engine.market(&fx.market_a).unwrap();
    // factor = 1e-6 * 100 = 1e-4; interest = 50 * 1e-4 = 0.005
    assert_eq!(market.total_borrows, units(50) + 5_000_000_000_000_000);
    assert_eq!(market.total_reserves, 500_000_000_000_000);
    assert_eq!(market.borrow_index, Exp::new(1_000_100_000_000_000_000));
    assert_eq!(market.accrual_block, fx.engine.current_block());
    assert_eq!(
        fx.engine.borrow_balance_stored(&fx.market_a, &borrower).unwrap(),
        units(50) + 5_000_000_000_000_000
    );
    // (50 cash + 50.005 borrows - 0.0005 reserves) / 100 supply
    assert_eq!(
        fx.engine.exchange_rate_stored(&fx.market_a).unwrap(),
        Exp::new(1_000_045_000_000_000_000)
    );
}

#[test]
fn test_accrual_is_idempotent_within_a_block() {
    let mut fx = Fixture::two_markets_with(per_block_model(1_000_000_000_000), Exp::ZERO);
    fx.supplier_with_a(units(100));
    fx.borrower(units(1), units(50));
    fx.engine.advance_blocks(10);

    fx.engine.accrue_interest(&fx.market_a).unwrap();
    let once = fx.engine.market(&fx.market_a).unwrap().clone();
    fx.engine.accrue_interest(&fx.market_a).unwrap();
    assert_eq!(fx.engine.market(&fx.market_a).unwrap(), &once);

    // Moving the clock backwards is a no-op as well.
    fx.engine.set_block(once.accrual_block - 5);
    fx.engine.accrue_interest(&fx.market_a).unwrap();
    assert_eq!(fx.engine.market(&fx.market_a).unwrap(), &once);
}

#[test]
fn test_excessive_borrow_rate_blocks_accrual() {
    let mut fx = Fixture::two_markets();
    let supplier = fx.supplier_with_a(units(10));
    fx.engine
        .set_interest_rate_model(fx.admin, fx.market_a, per_block_model(6_000_000_000_000))
        .unwrap();
    fx.engine.advance_blocks(1);

    let before = fx.engine.snapshot_bytes().unwrap();
    let err = fx.engine.redeem(supplier, fx.market_a, units(1)).unwrap_err();
    assert_eq!(err, market_error(MarketError::BorrowRateTooHigh));
    assert_eq!(fx.engine.snapshot_bytes().unwrap(), before);
}

#[test]
fn test_accrual_overflow_leaves_state_untouched() {
    let mut fx = Fixture::two_markets_with(per_block_model(5_000_000_000_000), Exp::ZERO);
    fx.supplier_with_a(units(20_000_000));
    fx.borrower(units(200_000), units(10_000_000));
    fx.engine.set_block(u64::MAX);

    let before = fx.engine.snapshot_bytes().unwrap();
    let err = fx.engine.accrue_interest(&fx.market_a).unwrap_err();
    assert_eq!(err, market_error(MarketError::AccrualOverflow));
    assert_eq!(fx.engine.snapshot_bytes().unwrap(), before);
}

#[test]
fn test_full_repay_returns_borrows_to_zero() {
    let mut fx = Fixture::two_markets_with(per_block_model(1_000_000_000_000), exp("0.1"));
    fx.supplier_with_a(units(100));
    let borrower = fx.borrower(units(1), units(50));
    fx.engine.advance_blocks(37);

    let owed = fx.engine.borrow_balance_current(&fx.market_a, &borrower).unwrap();
    assert!(owed > units(50));
    fx.fund(fx.asset_a, borrower, owed - units(50));

    let repaid = fx
        .engine
        .repay_borrow(borrower, borrower, fx.market_a, REPAY_MAX)
        .unwrap();
    assert_eq!(repaid, owed);
    assert_eq!(fx.engine.borrow_balance_stored(&fx.market_a, &borrower).unwrap(), 0);
    assert_eq!(fx.engine.market(&fx.market_a).unwrap().total_borrows, 0);
    assert_eq!(fx.balance(fx.asset_a, borrower), 0);
}

#[test]
fn test_repay_above_debt_is_rejected() {
    let mut fx = Fixture::two_markets();
    fx.supplier_with_a(units(100));
    let borrower = fx.borrower(units(1), units(20));
    fx.fund(fx.asset_a, borrower, units(5));

    let before = fx.engine.snapshot_bytes().unwrap();
    let err = fx
        .engine
        .repay_borrow(borrower, borrower, fx.market_a, units(20) + 1)
        .unwrap_err();
    assert_eq!(err, market_error(MarketError::RepayAmountExceedsDebt));
    assert_eq!(fx.engine.snapshot_bytes().unwrap(), before);
}

#[test]
fn test_third_party_repays_on_behalf_of_borrower() {
    let mut fx = Fixture::two_markets();
    fx.supplier_with_a(units(100));
    let borrower = fx.borrower(units(1), units(30));
    let benefactor = Pubkey::new_unique();
    fx.fund(fx.asset_a, benefactor, units(10));

    fx.engine
        .repay_borrow(benefactor, borrower, fx.market_a, units(10))
        .unwrap();
    assert_eq!(
        fx.engine.borrow_balance_stored(&fx.market_a, &borrower).unwrap(),
        units(20)
    );
    assert_eq!(fx.balance(fx.asset_a, benefactor), 0);
    assert_eq!(fx.balance(fx.asset_a, borrower), units(30));
    assert_eq!(fx.engine.market(&fx.market_a).unwrap().total_borrows, units(20));
}

#[test]
fn test_receipt_transfer_respects_solvency() {
    let mut fx = Fixture::two_markets();
    fx.supplier_with_a(units(100));
    let borrower = fx.borrower(units(2), units(50));
    let friend = Pubkey::new_unique();

    // 2 B back 100 of liquidity; 1 B is spare.
    fx.engine
        .transfer(fx.market_b, borrower, friend, units(1))
        .unwrap();
    assert_eq!(fx.engine.receipt_balance(&fx.market_b, &friend), units(1));
    assert_eq!(fx.liquidity(borrower), (0, 0));

    let err = fx
        .engine
        .transfer(fx.market_b, borrower, friend, 1)
        .unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientLiquidity));

    let err = fx
        .engine
        .transfer(fx.market_b, friend, friend, 1)
        .unwrap_err();
    assert_eq!(err, market_error(MarketError::InvalidAmount));
}

#[test]
fn test_reserves_can_be_reduced_by_admin_only() {
    let mut fx = Fixture::two_markets();
    let donor = Pubkey::new_unique();
    fx.fund(fx.asset_a, donor, units(3));
    fx.engine.add_reserves(donor, fx.market_a, units(3)).unwrap();
    assert_eq!(fx.engine.market(&fx.market_a).unwrap().total_reserves, units(3));

    let err = fx
        .engine
        .reduce_reserves(donor, fx.market_a, units(1))
        .unwrap_err();
    assert_eq!(err, market_error(MarketError::Unauthorized));

    let err = fx
        .engine
        .reduce_reserves(fx.admin, fx.market_a, units(4))
        .unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientCash));

    fx.engine
        .reduce_reserves(fx.admin, fx.market_a, units(2))
        .unwrap();
    let market = fx.engine.market(&fx.market_a).unwrap();
    assert_eq!(market.total_reserves, units(1));
    assert_eq!(market.cash, units(1));
    assert_eq!(fx.balance(fx.asset_a, fx.admin), units(2));
}

#[test]
fn test_reduce_reserves_cannot_touch_supplier_cash() {
    let mut fx = Fixture::two_markets();
    fx.supplier_with_a(units(10));

    let err = fx
        .engine
        .reduce_reserves(fx.admin, fx.market_a, units(1))
        .unwrap_err();
    assert_eq!(err, market_error(MarketError::InsufficientReserves));
}

#[test]
fn test_market_views_report_rates() {
    let mut fx = Fixture::two_markets_with(per_block_model(2_000_000_000), exp("0.25"));
    fx.supplier_with_a(units(100));
    fx.borrower(units(1), units(50));

    let market = fx.engine.market(&fx.market_a).unwrap();
    let borrow_rate = fx.engine.borrow_rate_per_block(&fx.market_a).unwrap();
    assert_eq!(borrow_rate, Exp::new(2_000_000_000));
    let expected_supply = market
        .rate_model
        .supply_rate(market.cash, market.total_borrows, market.total_reserves, market.reserve_factor)
        .unwrap();
    // 0.5 utilization * 2e-9 * 0.75
    assert_eq!(expected_supply, Exp::new(750_000_000));
    assert_eq!(fx.engine.supply_rate_per_block(&fx.market_a).unwrap(), expected_supply);
}

#[test]
fn test_balance_of_underlying_tracks_exchange_rate() {
    let mut fx = Fixture::two_markets_with(per_block_model(1_000_000_000_000), Exp::ZERO);
    let supplier = fx.supplier_with_a(units(100));
    fx.borrower(units(1), units(50));
    fx.engine.advance_blocks(100);

    // 100 tokens at (50 + 50.005) / 100
    assert_eq!(
        fx.engine.balance_of_underlying(&fx.market_a, &supplier).unwrap(),
        units(100) + 5_000_000_000_000_000
    );
}

#[test]
fn test_random_mint_redeem_sequences_keep_cash_backed() {
    let mut fx = Fixture::two_markets();
    let asset = Pubkey::new_unique();
    let market = fx
        .engine
        .support_market(fx.admin, asset, RateModel::zero(), exp("3"), Exp::ZERO)
        .unwrap();
    let users: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
    for user in &users {
        fx.fund(asset, *user, 1_000_000_000_000_000);
    }

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut deposited: u128 = 0;
    let mut withdrawn: u128 = 0;

    for _ in 0..300 {
        let user = users[rng.gen_range(0..users.len())];
        let held = fx.engine.receipt_balance(&market, &user);
        if held == 0 || rng.gen_bool(0.55) {
            let amount = rng.gen_range(3..=1_000_000_000_000u128);
            if fx.engine.mint(user, market, amount).is_ok() {
                deposited += amount;
            }
        } else {
            let tokens = rng.gen_range(1..=held);
            withdrawn += fx.engine.redeem(user, market, tokens).unwrap();
        }

        let state = fx.engine.market(&market).unwrap();
        let rate = fx.engine.exchange_rate_stored(&market).unwrap();
        let backed = rate.mul_scalar(state.total_supply, money_market::Rounding::Down).unwrap();
        assert!(state.cash >= backed, "cash {} below backed {}", state.cash, backed);
        assert!(state.cash - backed <= 1, "cash {} vs backed {}", state.cash, backed);
        assert_eq!(state.cash, fx.engine.tokens().balance_of(&asset, &market));
    }

    assert!(withdrawn <= deposited);
    assert!(fx.engine.exchange_rate_stored(&market).unwrap().mantissa >= 3 * EXP_SCALE);
}
