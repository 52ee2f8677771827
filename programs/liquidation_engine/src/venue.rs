use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use money_market::math::{mul_div, Rounding};
use money_market::{Exp, TokenCustody, TokenError};
use thiserror::Error;

use crate::{LiquidationError, SwapExecuted};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("no route from {asset_in} to {asset_out}")]
    NoRoute { asset_in: Pubkey, asset_out: Pubkey },
    #[error("swap would return {quoted}, below the minimum {minimum}")]
    Slippage { quoted: u128, minimum: u128 },
    #[error("venue holds {available} of {asset}, swap needs {required}")]
    Liquidity {
        asset: Pubkey,
        available: u128,
        required: u128,
    },
    #[error("overflow while quoting")]
    Overflow,
    #[error(transparent)]
    Custody(#[from] TokenError),
}

impl From<VenueError> for anchor_lang::error::Error {
    fn from(err: VenueError) -> Self {
        msg!("swap venue: {}", err);
        match err {
            VenueError::NoRoute { .. } => error!(LiquidationError::SwapRouteNotFound),
            VenueError::Slippage { .. } => error!(LiquidationError::SlippageTooHigh),
            VenueError::Liquidity { .. } => error!(LiquidationError::SwapLiquidityUnavailable),
            VenueError::Overflow => error!(LiquidationError::MathOverflow),
            VenueError::Custody(inner) => inner.into(),
        }
    }
}

/// Exchange used to turn seized collateral back into the repay asset.
pub trait SwapVenue {
    /// Sells exactly `amount_in` of `asset_in` held by `trader`; fails if fewer
    /// than `min_amount_out` units of `asset_out` would come back.
    fn swap_exact_input<T: TokenCustody>(
        &mut self,
        tokens: &mut T,
        trader: &Pubkey,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u128,
        min_amount_out: u128,
    ) -> std::result::Result<u128, VenueError>;
}

/// Venue quoting from operator-set rates, settling against its own pool inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FixedRateVenue {
    pub pool: Pubkey,
    pub fee_bps: u16,
    rates: BTreeMap<(Pubkey, Pubkey), Exp>,
}

impl FixedRateVenue {
    pub fn new(pool: Pubkey, fee_bps: u16) -> Self {
        Self {
            pool,
            fee_bps,
            rates: BTreeMap::new(),
        }
    }

    /// `rate` units of `asset_out` per unit of `asset_in`.
    pub fn set_rate(&mut self, asset_in: Pubkey, asset_out: Pubkey, rate: Exp) {
        self.rates.insert((asset_in, asset_out), rate);
    }

    pub fn quote(&self, asset_in: &Pubkey, asset_out: &Pubkey, amount_in: u128) -> std::result::Result<u128, VenueError> {
        let rate = self
            .rates
            .get(&(*asset_in, *asset_out))
            .ok_or(VenueError::NoRoute {
                asset_in: *asset_in,
                asset_out: *asset_out,
            })?;
        let gross = rate
            .mul_scalar(amount_in, Rounding::Down)
            .ok_or(VenueError::Overflow)?;
        let keep_bps = 10_000u128.saturating_sub(self.fee_bps as u128);
        mul_div(gross, keep_bps, 10_000, Rounding::Down).ok_or(VenueError::Overflow)
    }
}

impl SwapVenue for FixedRateVenue {
    fn swap_exact_input<T: TokenCustody>(
        &mut self,
        tokens: &mut T,
        trader: &Pubkey,
        asset_in: &Pubkey,
        asset_out: &Pubkey,
        amount_in: u128,
        min_amount_out: u128,
    ) -> std::result::Result<u128, VenueError> {
        let amount_out = self.quote(asset_in, asset_out, amount_in)?;
        if amount_out < min_amount_out {
            return Err(VenueError::Slippage {
                quoted: amount_out,
                minimum: min_amount_out,
            });
        }
        let available = tokens.balance_of(asset_out, &self.pool);
        if available < amount_out {
            return Err(VenueError::Liquidity {
                asset: *asset_out,
                available,
                required: amount_out,
            });
        }

        tokens.transfer(asset_in, trader, &self.pool, amount_in)?;
        tokens.transfer(asset_out, &self.pool, trader, amount_out)?;
        emit!(SwapExecuted {
            trader: *trader,
            asset_in: *asset_in,
            asset_out: *asset_out,
            amount_in,
            amount_out,
        });

        Ok(amount_out)
    }
}
