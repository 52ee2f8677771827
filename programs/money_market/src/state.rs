use anchor_lang::prelude::*;

use crate::error::MarketError;
use crate::interest_rate_model::{InterestRateModel, RateModel};
use crate::math::{Exp, Rounding};

/// Per-block borrow rate ceiling (0.0005% per block).
pub const BORROW_RATE_MAX_MANTISSA: u128 = 5_000_000_000_000;

/// Upper bound on markets one account may enter.
pub const MAX_ENTERED_MARKETS: usize = 16;

pub const MARKET_SEED: &[u8] = b"market";

/// Risk parameters and the market listing. Prices come from the oracle named in `oracle`.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct Comptroller {
    pub admin: Pubkey,
    pub oracle: Pubkey,
    pub close_factor: Exp,
    pub liquidation_incentive: Exp,
    pub protocol_seize_share: Exp,
    pub markets: Vec<MarketListing>,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketListing {
    pub market: Pubkey,
    pub collateral_factor: Exp,
    pub is_listed: bool,
}

impl MarketListing {
    pub const LEN: usize = 32 + 16 + 1;
}

impl Comptroller {
    pub const MAX_MARKETS: usize = 32;
    pub const LEN: usize = 32 + 32 + 16 * 3 + 4 + Self::MAX_MARKETS * MarketListing::LEN;

    /// 2.8% of every seizure goes to reserves unless configured otherwise.
    pub const DEFAULT_PROTOCOL_SEIZE_SHARE: Exp = Exp::new(28_000_000_000_000_000);

    pub fn new(admin: Pubkey, oracle: Pubkey) -> Self {
        Self {
            admin,
            oracle,
            close_factor: Exp::new(Exp::ONE.mantissa / 2),
            liquidation_incentive: Exp::ONE,
            protocol_seize_share: Self::DEFAULT_PROTOCOL_SEIZE_SHARE,
            markets: Vec::new(),
        }
    }

    pub fn listing(&self, market: &Pubkey) -> Option<&MarketListing> {
        self.markets
            .iter()
            .find(|listing| listing.market == *market && listing.is_listed)
    }

    pub fn require_listed(&self, market: &Pubkey) -> Result<&MarketListing> {
        self.listing(market)
            .ok_or_else(|| error!(MarketError::MarketNotListed))
    }

    pub fn listing_mut(&mut self, market: &Pubkey) -> Result<&mut MarketListing> {
        self.markets
            .iter_mut()
            .find(|listing| listing.market == *market && listing.is_listed)
            .ok_or_else(|| error!(MarketError::MarketNotListed))
    }

    pub fn is_listed(&self, market: &Pubkey) -> bool {
        self.listing(market).is_some()
    }

    pub fn require_admin(&self, caller: &Pubkey) -> Result<()> {
        require_keys_eq!(self.admin, *caller, MarketError::Unauthorized);
        Ok(())
    }
}

/// One listed asset's ledger.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct Market {
    pub id: Pubkey,
    pub underlying: Pubkey,
    pub cash: u128,
    pub total_supply: u128,
    pub total_borrows: u128,
    pub total_reserves: u128,
    pub reserve_factor: Exp,
    pub initial_exchange_rate: Exp,
    pub borrow_index: Exp,
    pub accrual_block: u64,
    pub rate_model: RateModel,
}

/// Outcome of a single accrual, used for the `AccrueInterest` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accrual {
    pub cash_prior: u128,
    pub interest_accumulated: u128,
}

impl Market {
    pub const LEN: usize = 32 + 32 + 16 * 4 + 16 * 3 + 8 + 1 + 16 * 4;

    pub fn address(underlying: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[MARKET_SEED, underlying.as_ref()], &crate::ID).0
    }

    pub fn new(
        underlying: Pubkey,
        rate_model: RateModel,
        initial_exchange_rate: Exp,
        reserve_factor: Exp,
        block: u64,
    ) -> Self {
        Self {
            id: Self::address(&underlying),
            underlying,
            cash: 0,
            total_supply: 0,
            total_borrows: 0,
            total_reserves: 0,
            reserve_factor,
            initial_exchange_rate,
            borrow_index: Exp::ONE,
            accrual_block: block,
            rate_model,
        }
    }

    /// `(cash + borrows - reserves) / supply`, or the initial rate for an empty market.
    pub fn exchange_rate_stored(&self) -> Result<Exp> {
        if self.total_supply == 0 {
            return Ok(self.initial_exchange_rate);
        }
        let backing = self
            .cash
            .checked_add(self.total_borrows)
            .and_then(|v| v.checked_sub(self.total_reserves))
            .ok_or(MarketError::MathOverflow)?;
        Exp::from_ratio(backing, self.total_supply, Rounding::Down)
            .ok_or_else(|| error!(MarketError::MathOverflow))
    }

    /// Debt implied by a snapshot at the current index, rounded up.
    pub fn borrow_balance(&self, snapshot: &BorrowSnapshot) -> Result<u128> {
        if snapshot.principal == 0 || snapshot.interest_index.is_zero() {
            return Ok(0);
        }
        crate::math::mul_div(
            snapshot.principal,
            self.borrow_index.mantissa,
            snapshot.interest_index.mantissa,
            Rounding::Up,
        )
        .ok_or_else(|| error!(MarketError::MathOverflow))
    }

    pub fn borrow_rate_per_block(&self) -> Result<Exp> {
        self.rate_model
            .borrow_rate(self.cash, self.total_borrows, self.total_reserves)
            .ok_or_else(|| error!(MarketError::MathOverflow))
    }

    pub fn supply_rate_per_block(&self) -> Result<Exp> {
        self.rate_model
            .supply_rate(self.cash, self.total_borrows, self.total_reserves, self.reserve_factor)
            .ok_or_else(|| error!(MarketError::MathOverflow))
    }

    /// Brings borrows, reserves and the index forward to `current_block`.
    /// A block at or before the last accrual leaves the market untouched and returns `None`.
    pub fn accrue_interest(&mut self, current_block: u64) -> Result<Option<Accrual>> {
        if current_block <= self.accrual_block {
            return Ok(None);
        }
        let cash_prior = self.cash;

        let borrow_rate = self
            .rate_model
            .borrow_rate(self.cash, self.total_borrows, self.total_reserves)
            .ok_or(MarketError::AccrualOverflow)?;
        require!(
            borrow_rate.mantissa <= BORROW_RATE_MAX_MANTISSA,
            MarketError::BorrowRateTooHigh
        );

        let blocks = (current_block - self.accrual_block) as u128;
        let simple_interest_factor = borrow_rate
            .mantissa
            .checked_mul(blocks)
            .map(Exp::new)
            .ok_or(MarketError::AccrualOverflow)?;
        let interest_accumulated = simple_interest_factor
            .mul_scalar(self.total_borrows, Rounding::Down)
            .ok_or(MarketError::AccrualOverflow)?;
        let total_borrows = self
            .total_borrows
            .checked_add(interest_accumulated)
            .ok_or(MarketError::AccrualOverflow)?;
        let total_reserves = self
            .reserve_factor
            .mul_scalar(interest_accumulated, Rounding::Down)
            .and_then(|v| v.checked_add(self.total_reserves))
            .ok_or(MarketError::AccrualOverflow)?;
        let borrow_index = simple_interest_factor
            .mul(self.borrow_index, Rounding::Down)
            .and_then(|v| v.checked_add(self.borrow_index))
            .ok_or(MarketError::AccrualOverflow)?;

        self.total_borrows = total_borrows;
        self.total_reserves = total_reserves;
        self.borrow_index = borrow_index;
        self.accrual_block = current_block;

        Ok(Some(Accrual {
            cash_prior,
            interest_accumulated,
        }))
    }

    /// Receipt balance, debt and exchange rate for one account.
    pub fn account_snapshot(&self, position: Option<&AccountPosition>) -> Result<crate::risk::AccountSnapshot> {
        let (receipt_balance, borrow_balance) = match position {
            Some(position) => (position.receipt_balance, self.borrow_balance(&position.borrow)?),
            None => (0, 0),
        };
        Ok(crate::risk::AccountSnapshot {
            receipt_balance,
            borrow_balance,
            exchange_rate: self.exchange_rate_stored()?,
        })
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BorrowSnapshot {
    pub principal: u128,
    pub interest_index: Exp,
}

/// An account's receipt balance and borrow snapshot in one market.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct AccountPosition {
    pub market: Pubkey,
    pub owner: Pubkey,
    pub receipt_balance: u128,
    pub borrow: BorrowSnapshot,
}

impl AccountPosition {
    pub const LEN: usize = 32 + 32 + 16 + 32;

    pub fn new(market: Pubkey, owner: Pubkey) -> Self {
        Self {
            market,
            owner,
            receipt_balance: 0,
            borrow: BorrowSnapshot::default(),
        }
    }
}

/// Markets an account has entered; only these count toward its liquidity.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct AccountMembership {
    pub owner: Pubkey,
    pub markets: Vec<Pubkey>,
}

impl AccountMembership {
    pub const LEN: usize = 32 + 4 + MAX_ENTERED_MARKETS * 32;

    pub fn new(owner: Pubkey) -> Self {
        Self {
            owner,
            markets: Vec::new(),
        }
    }

    pub fn contains(&self, market: &Pubkey) -> bool {
        self.markets.contains(market)
    }

    /// Returns `false` when the market was already entered.
    pub fn enter(&mut self, market: Pubkey) -> Result<bool> {
        if self.contains(&market) {
            return Ok(false);
        }
        require!(
            self.markets.len() < MAX_ENTERED_MARKETS,
            MarketError::TooManyMarkets
        );
        self.markets.push(market);
        Ok(true)
    }

    pub fn exit(&mut self, market: &Pubkey) -> bool {
        let before = self.markets.len();
        self.markets.retain(|entered| entered != market);
        before != self.markets.len()
    }
}
