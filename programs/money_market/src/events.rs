use anchor_lang::prelude::*;

use crate::interest_rate_model::RateModel;

#[event]
pub struct AccrueInterest {
    pub market: Pubkey,
    pub cash_prior: u128,
    pub interest_accumulated: u128,
    pub borrow_index: u128,
    pub total_borrows: u128,
    pub block: u64,
}

#[event]
pub struct Mint {
    pub market: Pubkey,
    pub minter: Pubkey,
    pub mint_amount: u128,
    pub mint_tokens: u128,
    pub block: u64,
}

#[event]
pub struct Redeem {
    pub market: Pubkey,
    pub redeemer: Pubkey,
    pub redeem_amount: u128,
    pub redeem_tokens: u128,
    pub block: u64,
}

#[event]
pub struct Borrow {
    pub market: Pubkey,
    pub borrower: Pubkey,
    pub borrow_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
    pub block: u64,
}

#[event]
pub struct RepayBorrow {
    pub market: Pubkey,
    pub payer: Pubkey,
    pub borrower: Pubkey,
    pub repay_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
    pub block: u64,
}

#[event]
pub struct LiquidateBorrow {
    pub liquidator: Pubkey,
    pub borrower: Pubkey,
    pub repay_amount: u128,
    pub borrowed_market: Pubkey,
    pub collateral_market: Pubkey,
    pub seize_tokens: u128,
    pub protocol_tokens: u128,
    pub block: u64,
}

#[event]
pub struct ReceiptTransfer {
    pub market: Pubkey,
    pub from: Pubkey,
    pub to: Pubkey,
    pub tokens: u128,
}

#[event]
pub struct ReservesChanged {
    pub market: Pubkey,
    pub account: Pubkey,
    pub added: u128,
    pub reduced: u128,
    pub total_reserves: u128,
    pub block: u64,
}

#[event]
pub struct MarketListed {
    pub market: Pubkey,
    pub underlying: Pubkey,
}

#[event]
pub struct MarketEntered {
    pub market: Pubkey,
    pub account: Pubkey,
}

#[event]
pub struct MarketExited {
    pub market: Pubkey,
    pub account: Pubkey,
}

/// Emitted for every risk-parameter change. `market` is the default key for
/// controller-wide parameters.
#[event]
pub struct RiskParameterChanged {
    pub parameter: RiskParameter,
    pub market: Pubkey,
    pub old_mantissa: u128,
    pub new_mantissa: u128,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskParameter {
    CollateralFactor,
    CloseFactor,
    LiquidationIncentive,
    ProtocolSeizeShare,
    ReserveFactor,
}

#[event]
pub struct NewPriceOracle {
    pub old_oracle: Pubkey,
    pub new_oracle: Pubkey,
}

#[event]
pub struct NewRateModel {
    pub market: Pubkey,
    pub model: RateModel,
}
