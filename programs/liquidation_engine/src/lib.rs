use anchor_lang::prelude::*;

pub mod flash_loan;
pub mod liquidator;
pub mod venue;

pub use flash_loan::{FlashLender, FlashLoanProvider, FlashLoanReceiver, FLASH_LOAN_PREMIUM_BPS};
pub use liquidator::{FlashLiquidator, LiquidationParams};
pub use venue::{FixedRateVenue, SwapVenue, VenueError};

declare_id!("Liqd111111111111111111111111111111111111111");

/// Operator record for a flash liquidator. `pending` is set only while a
/// loan this liquidator requested is in flight.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct LiquidationAuthority {
    pub owner: Pubkey,
    pub receiver: Pubkey,
    pub pending: bool,
    pub executed_count: u64,
    pub last_repay_amount: u128,
    pub last_profit: u128,
    pub total_profit: u128,
}

impl LiquidationAuthority {
    pub const LEN: usize = 32 + 32 + 1 + 8 + 16 * 3;

    pub fn new(owner: Pubkey, receiver: Pubkey) -> Self {
        Self {
            owner,
            receiver,
            pending: false,
            executed_count: 0,
            last_repay_amount: 0,
            last_profit: 0,
            total_profit: 0,
        }
    }

    pub fn can_liquidate(&self) -> bool {
        self.owner != Pubkey::default() && self.receiver != Pubkey::default() && !self.pending
    }
}

#[event]
pub struct FlashLoan {
    pub provider: Pubkey,
    pub receiver: Pubkey,
    pub initiator: Pubkey,
    pub asset: Pubkey,
    pub amount: u128,
    pub premium: u128,
}

#[event]
pub struct FlashLiquidationExecuted {
    pub owner: Pubkey,
    pub borrower: Pubkey,
    pub debt_market: Pubkey,
    pub collateral_market: Pubkey,
    pub repay_amount: u128,
    pub seize_tokens: u128,
    pub profit: u128,
}

#[event]
pub struct SwapExecuted {
    pub trader: Pubkey,
    pub asset_in: Pubkey,
    pub asset_out: Pubkey,
    pub amount_in: u128,
    pub amount_out: u128,
}

#[error_code(offset = 7000)]
pub enum LiquidationError {
    #[msg("Unauthorized liquidation attempt")]
    Unauthorized,
    #[msg("A flash liquidation is already in flight")]
    LiquidationInProgress,
    #[msg("Flash loan callback without a pending liquidation")]
    UnexpectedCallback,
    #[msg("Flash loan assets and amounts are inconsistent")]
    InvalidFlashLoan,
    #[msg("Flash loan provider lacks liquidity")]
    FlashLiquidityUnavailable,
    #[msg("Flash loan principal plus premium was not returned")]
    FlashLoanNotRepaid,
    #[msg("Loaned asset does not match the market's underlying")]
    AssetMismatch,
    #[msg("Liquidation parameters could not be decoded")]
    InvalidParams,
    #[msg("Liquidation proceeds do not cover the flash loan")]
    Unprofitable,
    #[msg("Slippage too high for DEX routing")]
    SlippageTooHigh,
    #[msg("No swap route between the assets")]
    SwapRouteNotFound,
    #[msg("Swap venue lacks liquidity")]
    SwapLiquidityUnavailable,
    #[msg("Math overflow")]
    MathOverflow,
}
