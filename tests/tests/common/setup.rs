use anchor_lang::prelude::Pubkey;
use money_market::{
    Exp, InMemoryEngine, LendingEngine, MarketError, RateModel, TokenCustody, TokenLedger, EXP_SCALE,
};
use oracle_framework::OracleState;

pub const fn units(n: u128) -> u128 {
    n * EXP_SCALE
}

pub fn exp(value: &str) -> Exp {
    Exp::from_decimal_str(value).expect("valid decimal")
}

pub fn market_error(err: MarketError) -> anchor_lang::error::Error {
    anchor_lang::error::Error::from(err)
}

/// Two markets sharing a comptroller:
/// A priced at 1 and B priced at 100, both with collateral factor 0.5,
/// a zero-rate interest model, close factor 0.5 and incentive 1.1.
pub struct Fixture {
    pub engine: InMemoryEngine,
    pub admin: Pubkey,
    pub oracle_authority: Pubkey,
    pub asset_a: Pubkey,
    pub asset_b: Pubkey,
    pub market_a: Pubkey,
    pub market_b: Pubkey,
}

impl Fixture {
    pub fn two_markets() -> Self {
        Self::two_markets_with(RateModel::zero(), Exp::ZERO)
    }

    pub fn two_markets_with(rate_model: RateModel, reserve_factor: Exp) -> Self {
        let admin = Pubkey::new_unique();
        let oracle_authority = Pubkey::new_unique();
        let oracle = OracleState::new(oracle_authority, admin);
        let mut engine = LendingEngine::new(admin, Pubkey::new_unique(), oracle, TokenLedger::new());

        let asset_a = Pubkey::new_unique();
        let asset_b = Pubkey::new_unique();
        let market_a = engine
            .support_market(admin, asset_a, rate_model, Exp::ONE, reserve_factor)
            .expect("list A");
        let market_b = engine
            .support_market(admin, asset_b, rate_model, Exp::ONE, reserve_factor)
            .expect("list B");

        let mut fixture = Self {
            engine,
            admin,
            oracle_authority,
            asset_a,
            asset_b,
            market_a,
            market_b,
        };
        fixture.set_price(market_a, exp("1"));
        fixture.set_price(market_b, exp("100"));
        fixture
            .engine
            .set_collateral_factor(admin, market_a, exp("0.5"))
            .expect("cf A");
        fixture
            .engine
            .set_collateral_factor(admin, market_b, exp("0.5"))
            .expect("cf B");
        fixture
            .engine
            .set_close_factor(admin, exp("0.5"))
            .expect("close factor");
        fixture
            .engine
            .set_liquidation_incentive(admin, exp("1.1"))
            .expect("incentive");
        fixture
    }

    pub fn set_price(&mut self, market: Pubkey, price: Exp) {
        let block = self.engine.current_block();
        self.engine
            .oracle_mut()
            .set_underlying_price(self.oracle_authority, market, price.mantissa, block)
            .expect("set price");
    }

    /// Credits `amount` of `asset` to `holder` and approves every listed market to pull it.
    pub fn fund(&mut self, asset: Pubkey, holder: Pubkey, amount: u128) {
        let markets = self.engine.market_ids();
        let tokens = self.engine.tokens_mut();
        tokens.mint_to(&asset, &holder, amount).expect("mint");
        for market in markets {
            tokens.approve(&asset, &holder, &market, u128::MAX);
        }
    }

    pub fn balance(&self, asset: Pubkey, holder: Pubkey) -> u128 {
        self.engine.tokens().balance_of(&asset, &holder)
    }

    /// (liquidity, shortfall)
    pub fn liquidity(&self, account: Pubkey) -> (u128, u128) {
        let liquidity = self
            .engine
            .get_account_liquidity(&account)
            .expect("liquidity");
        (liquidity.liquidity, liquidity.shortfall)
    }

    pub fn supplier_with_a(&mut self, amount: u128) -> Pubkey {
        let supplier = Pubkey::new_unique();
        self.fund(self.asset_a, supplier, amount);
        self.engine
            .mint(supplier, self.market_a, amount)
            .expect("supply A");
        self.engine
            .enter_markets(supplier, &[self.market_a])
            .expect("enter A");
        supplier
    }

    /// Borrower holding `collateral_b` of B as collateral and owing `debt_a` of A.
    pub fn borrower(&mut self, collateral_b: u128, debt_a: u128) -> Pubkey {
        let borrower = Pubkey::new_unique();
        self.fund(self.asset_b, borrower, collateral_b);
        self.engine
            .mint(borrower, self.market_b, collateral_b)
            .expect("supply B");
        self.engine
            .enter_markets(borrower, &[self.market_b])
            .expect("enter B");
        if debt_a > 0 {
            self.engine
                .borrow(borrower, self.market_a, debt_a)
                .expect("borrow A");
        }
        borrower
    }
}
