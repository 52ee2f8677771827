//! Cross-market solvency checks.
//!
//! The controller never owns market ledgers. It reads them through
//! [`LedgerView`], which lets callers pass staged (already accrued) copies of
//! the markets an operation touches while everything else is read as stored.

use anchor_lang::prelude::*;
use oracle_framework::PriceFeed;

use crate::error::MarketError;
use crate::liquidation;
use crate::math::{Exp, Rounding};
use crate::state::{AccountMembership, Comptroller};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub receipt_balance: u128,
    pub borrow_balance: u128,
    pub exchange_rate: Exp,
}

/// Read-only access to per-account market state.
pub trait LedgerView {
    fn account_snapshot(&self, market: &Pubkey, account: &Pubkey) -> Result<AccountSnapshot>;
}

/// A pending change evaluated without touching the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiquidityDelta {
    None,
    Redeem { market: Pubkey, tokens: u128 },
    Borrow { market: Pubkey, amount: u128 },
}

/// Exactly one side is nonzero, except at the exact boundary where both are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountLiquidity {
    pub liquidity: u128,
    pub shortfall: u128,
}

impl AccountLiquidity {
    pub fn is_solvent(&self) -> bool {
        self.shortfall == 0
    }
}

/// Oracle price as an Exp; any oracle failure or zero price is `StalePrice`.
pub fn price_of(oracle: &impl PriceFeed, market: &Pubkey) -> Result<Exp> {
    match oracle.underlying_price(market) {
        Ok(price) if price > 0 => Ok(Exp::new(price)),
        _ => err!(MarketError::StalePrice),
    }
}

fn overflow() -> Error {
    error!(MarketError::MathOverflow)
}

impl Comptroller {
    /// Sums collateral (rounded down) and debt (rounded up) over every
    /// entered market, applying `delta` to its market as extra debt.
    pub fn hypothetical_account_liquidity(
        &self,
        account: &Pubkey,
        membership: &AccountMembership,
        ledger: &impl LedgerView,
        oracle: &impl PriceFeed,
        delta: LiquidityDelta,
    ) -> Result<AccountLiquidity> {
        let mut sum_collateral: u128 = 0;
        let mut sum_borrow_plus_effects: u128 = 0;

        for market in &membership.markets {
            let listing = self.require_listed(market)?;
            let snapshot = ledger.account_snapshot(market, account)?;
            let price = price_of(oracle, market)?;

            let tokens_to_denom = listing
                .collateral_factor
                .mul(snapshot.exchange_rate, Rounding::Down)
                .and_then(|v| v.mul(price, Rounding::Down))
                .ok_or_else(overflow)?;

            let collateral = tokens_to_denom
                .mul_scalar(snapshot.receipt_balance, Rounding::Down)
                .ok_or_else(overflow)?;
            sum_collateral = sum_collateral.checked_add(collateral).ok_or_else(overflow)?;

            let debt = price
                .mul_scalar(snapshot.borrow_balance, Rounding::Up)
                .ok_or_else(overflow)?;
            sum_borrow_plus_effects = sum_borrow_plus_effects.checked_add(debt).ok_or_else(overflow)?;

            let effect = match delta {
                LiquidityDelta::Redeem { market: target, tokens } if target == *market => tokens_to_denom
                    .mul_scalar(tokens, Rounding::Up)
                    .ok_or_else(overflow)?,
                LiquidityDelta::Borrow { market: target, amount } if target == *market => {
                    price.mul_scalar(amount, Rounding::Up).ok_or_else(overflow)?
                }
                _ => 0,
            };
            sum_borrow_plus_effects = sum_borrow_plus_effects.checked_add(effect).ok_or_else(overflow)?;
        }

        Ok(if sum_collateral >= sum_borrow_plus_effects {
            AccountLiquidity {
                liquidity: sum_collateral - sum_borrow_plus_effects,
                shortfall: 0,
            }
        } else {
            AccountLiquidity {
                liquidity: 0,
                shortfall: sum_borrow_plus_effects - sum_collateral,
            }
        })
    }

    pub fn account_liquidity(
        &self,
        account: &Pubkey,
        membership: &AccountMembership,
        ledger: &impl LedgerView,
        oracle: &impl PriceFeed,
    ) -> Result<AccountLiquidity> {
        self.hypothetical_account_liquidity(account, membership, ledger, oracle, LiquidityDelta::None)
    }

    pub fn mint_allowed(&self, market: &Pubkey) -> Result<()> {
        self.require_listed(market)?;
        Ok(())
    }

    pub fn redeem_allowed(
        &self,
        market: &Pubkey,
        redeemer: &Pubkey,
        tokens: u128,
        membership: &AccountMembership,
        ledger: &impl LedgerView,
        oracle: &impl PriceFeed,
    ) -> Result<()> {
        self.require_listed(market)?;
        // Tokens outside entered markets back nothing.
        if !membership.contains(market) {
            return Ok(());
        }
        let liquidity = self.hypothetical_account_liquidity(
            redeemer,
            membership,
            ledger,
            oracle,
            LiquidityDelta::Redeem {
                market: *market,
                tokens,
            },
        )?;
        require!(liquidity.is_solvent(), MarketError::InsufficientLiquidity);
        Ok(())
    }

    /// `membership` must already include `market`.
    pub fn borrow_allowed(
        &self,
        market: &Pubkey,
        borrower: &Pubkey,
        amount: u128,
        membership: &AccountMembership,
        ledger: &impl LedgerView,
        oracle: &impl PriceFeed,
    ) -> Result<()> {
        self.require_listed(market)?;
        let liquidity = self.hypothetical_account_liquidity(
            borrower,
            membership,
            ledger,
            oracle,
            LiquidityDelta::Borrow {
                market: *market,
                amount,
            },
        )?;
        require!(liquidity.is_solvent(), MarketError::InsufficientLiquidity);
        Ok(())
    }

    pub fn repay_borrow_allowed(&self, market: &Pubkey) -> Result<()> {
        self.require_listed(market)?;
        Ok(())
    }

    /// Borrower must be in shortfall and `repay_amount` within the close factor
    /// of the current debt.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate_borrow_allowed(
        &self,
        borrowed_market: &Pubkey,
        collateral_market: &Pubkey,
        borrower: &Pubkey,
        repay_amount: u128,
        membership: &AccountMembership,
        ledger: &impl LedgerView,
        oracle: &impl PriceFeed,
    ) -> Result<()> {
        self.require_listed(borrowed_market)?;
        self.require_listed(collateral_market)?;

        let liquidity = self.account_liquidity(borrower, membership, ledger, oracle)?;
        require!(liquidity.shortfall > 0, MarketError::InsufficientShortfall);

        let borrow_balance = ledger.account_snapshot(borrowed_market, borrower)?.borrow_balance;
        let max_close = self
            .close_factor
            .mul_scalar(borrow_balance, Rounding::Down)
            .ok_or_else(overflow)?;
        require!(repay_amount <= max_close, MarketError::RepayExceedsCloseFactor);
        Ok(())
    }

    pub fn seize_allowed(
        &self,
        collateral_market: &Pubkey,
        borrowed_market: &Pubkey,
        liquidator: &Pubkey,
        borrower: &Pubkey,
    ) -> Result<()> {
        self.require_listed(collateral_market)?;
        self.require_listed(borrowed_market)?;
        require_keys_neq!(*liquidator, *borrower, MarketError::LiquidatorIsBorrower);
        Ok(())
    }

    /// Same solvency rule as redeeming `tokens`.
    pub fn transfer_allowed(
        &self,
        market: &Pubkey,
        src: &Pubkey,
        tokens: u128,
        membership: &AccountMembership,
        ledger: &impl LedgerView,
        oracle: &impl PriceFeed,
    ) -> Result<()> {
        self.redeem_allowed(market, src, tokens, membership, ledger, oracle)
    }

    /// Collateral receipt tokens owed to a liquidator repaying `repay_amount`.
    pub fn liquidate_calculate_seize_tokens(
        &self,
        borrowed_market: &Pubkey,
        collateral_market: &Pubkey,
        repay_amount: u128,
        collateral_exchange_rate: Exp,
        oracle: &impl PriceFeed,
    ) -> Result<u128> {
        let price_borrowed = price_of(oracle, borrowed_market)?;
        let price_collateral = price_of(oracle, collateral_market)?;
        liquidation::seize_tokens(
            repay_amount,
            self.liquidation_incentive,
            price_borrowed,
            price_collateral,
            collateral_exchange_rate,
        )
    }
}
