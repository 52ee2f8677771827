use anchor_lang::prelude::*;

use crate::error::MarketError;
use crate::math::{Exp, Rounding};

/// How a seizure is divided between the liquidator and the collateral market's reserves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeizeSplit {
    pub seize_tokens: u128,
    pub liquidator_tokens: u128,
    pub protocol_tokens: u128,
    /// Underlying value of `protocol_tokens`, credited to reserves.
    pub protocol_amount: u128,
}

/// `repay * incentive * price_borrowed / (price_collateral * exchange_rate)`, rounded down.
pub fn seize_tokens(
    repay_amount: u128,
    liquidation_incentive: Exp,
    price_borrowed: Exp,
    price_collateral: Exp,
    collateral_exchange_rate: Exp,
) -> Result<u128> {
    require!(!price_collateral.is_zero(), MarketError::StalePrice);
    require!(!collateral_exchange_rate.is_zero(), MarketError::MathOverflow);

    let numerator = liquidation_incentive
        .mul(price_borrowed, Rounding::Down)
        .ok_or(MarketError::MathOverflow)?;
    let denominator = price_collateral
        .mul(collateral_exchange_rate, Rounding::Up)
        .ok_or(MarketError::MathOverflow)?;
    let ratio = numerator
        .div(denominator, Rounding::Down)
        .ok_or(MarketError::MathOverflow)?;
    ratio
        .mul_scalar(repay_amount, Rounding::Down)
        .ok_or_else(|| error!(MarketError::MathOverflow))
}

pub fn split_seized(seize_tokens: u128, protocol_seize_share: Exp, exchange_rate: Exp) -> Result<SeizeSplit> {
    let protocol_tokens = protocol_seize_share
        .mul_scalar(seize_tokens, Rounding::Down)
        .ok_or(MarketError::MathOverflow)?;
    let liquidator_tokens = seize_tokens
        .checked_sub(protocol_tokens)
        .ok_or(MarketError::MathOverflow)?;
    let protocol_amount = exchange_rate
        .mul_scalar(protocol_tokens, Rounding::Down)
        .ok_or(MarketError::MathOverflow)?;

    Ok(SeizeSplit {
        seize_tokens,
        liquidator_tokens,
        protocol_tokens,
        protocol_amount,
    })
}
