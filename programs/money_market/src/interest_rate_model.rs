use anchor_lang::prelude::*;

use crate::math::{Exp, Rounding};

/// Approximate blocks per year used to convert annual rates to per-block rates.
pub const BLOCKS_PER_YEAR: u128 = 2_102_400;

/// Maps a market's balances to a per-block borrow rate. Implementations are
/// pure; `None` means the inputs overflowed the rate arithmetic.
pub trait InterestRateModel {
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Option<Exp>;

    /// `utilization * borrow_rate * (1 - reserve_factor)`
    fn supply_rate(&self, cash: u128, borrows: u128, reserves: u128, reserve_factor: Exp) -> Option<Exp> {
        let one_minus_reserve_factor = Exp::ONE.checked_sub(reserve_factor)?;
        let borrow_rate = self.borrow_rate(cash, borrows, reserves)?;
        let rate_to_pool = borrow_rate.mul(one_minus_reserve_factor, Rounding::Down)?;
        utilization_rate(cash, borrows, reserves)?.mul(rate_to_pool, Rounding::Down)
    }
}

/// `borrows / (cash + borrows - reserves)`, zero when nothing is borrowed.
pub fn utilization_rate(cash: u128, borrows: u128, reserves: u128) -> Option<Exp> {
    if borrows == 0 {
        return Some(Exp::ZERO);
    }
    let denominator = cash.checked_add(borrows)?.checked_sub(reserves)?;
    Exp::from_ratio(borrows, denominator, Rounding::Down)
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WhitePaperModel {
    pub base_rate_per_block: Exp,
    pub multiplier_per_block: Exp,
}

impl WhitePaperModel {
    pub fn from_annual(base_rate_per_year: Exp, multiplier_per_year: Exp) -> Self {
        Self {
            base_rate_per_block: per_block(base_rate_per_year),
            multiplier_per_block: per_block(multiplier_per_year),
        }
    }
}

impl InterestRateModel for WhitePaperModel {
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Option<Exp> {
        utilization_rate(cash, borrows, reserves)?
            .mul(self.multiplier_per_block, Rounding::Down)?
            .checked_add(self.base_rate_per_block)
    }
}

/// Linear up to `kink`, then a steeper `jump_multiplier` slope on the excess.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpRateModel {
    pub base_rate_per_block: Exp,
    pub multiplier_per_block: Exp,
    pub jump_multiplier_per_block: Exp,
    pub kink: Exp,
}

impl JumpRateModel {
    pub fn from_annual(
        base_rate_per_year: Exp,
        multiplier_per_year: Exp,
        jump_multiplier_per_year: Exp,
        kink: Exp,
    ) -> Self {
        Self {
            base_rate_per_block: per_block(base_rate_per_year),
            multiplier_per_block: per_block(multiplier_per_year),
            jump_multiplier_per_block: per_block(jump_multiplier_per_year),
            kink,
        }
    }
}

impl InterestRateModel for JumpRateModel {
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Option<Exp> {
        let util = utilization_rate(cash, borrows, reserves)?;
        if util <= self.kink {
            return util
                .mul(self.multiplier_per_block, Rounding::Down)?
                .checked_add(self.base_rate_per_block);
        }
        let normal_rate = self
            .kink
            .mul(self.multiplier_per_block, Rounding::Down)?
            .checked_add(self.base_rate_per_block)?;
        util.checked_sub(self.kink)?
            .mul(self.jump_multiplier_per_block, Rounding::Down)?
            .checked_add(normal_rate)
    }
}

/// Rate model stored on a market.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateModel {
    WhitePaper(WhitePaperModel),
    JumpRate(JumpRateModel),
}

impl RateModel {
    /// Zero base rate and zero slope. Borrowing is free.
    pub fn zero() -> Self {
        RateModel::WhitePaper(WhitePaperModel {
            base_rate_per_block: Exp::ZERO,
            multiplier_per_block: Exp::ZERO,
        })
    }
}

impl InterestRateModel for RateModel {
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Option<Exp> {
        match self {
            RateModel::WhitePaper(model) => model.borrow_rate(cash, borrows, reserves),
            RateModel::JumpRate(model) => model.borrow_rate(cash, borrows, reserves),
        }
    }
}

fn per_block(annual: Exp) -> Exp {
    Exp::new(annual.mantissa / BLOCKS_PER_YEAR)
}
