use anchor_lang::prelude::*;

#[error_code]
pub enum MarketError {
    #[msg("Account would be undercollateralized")]
    InsufficientLiquidity,
    #[msg("Market does not hold enough cash")]
    InsufficientCash,
    #[msg("Market is not listed")]
    MarketNotListed,
    #[msg("Account still has an outstanding borrow in this market")]
    NonzeroBorrowBalance,
    #[msg("Repay amount exceeds the outstanding borrow")]
    RepayAmountExceedsDebt,
    #[msg("Borrower does not hold enough collateral to seize")]
    TooMuchRepay,
    #[msg("Liquidator cannot be the borrower")]
    LiquidatorIsBorrower,
    #[msg("Oracle price is missing or zero")]
    StalePrice,
    #[msg("Arithmetic overflow while accruing interest")]
    AccrualOverflow,
    #[msg("Token transfer failed: insufficient allowance or balance")]
    InsufficientAllowanceOrBalance,
    #[msg("Amount must be positive")]
    InvalidAmount,
    #[msg("Account has no shortfall")]
    InsufficientShortfall,
    #[msg("Repay amount exceeds the close factor")]
    RepayExceedsCloseFactor,
    #[msg("Market is already listed")]
    MarketAlreadyListed,
    #[msg("Collateral factor must be between 0 and 1")]
    InvalidCollateralFactor,
    #[msg("Close factor must be greater than 0 and at most 1")]
    InvalidCloseFactor,
    #[msg("Liquidation incentive must be at least 1")]
    InvalidLiquidationIncentive,
    #[msg("Reserve factor must be at most 1")]
    InvalidReserveFactor,
    #[msg("Protocol seize share must be at most 1")]
    InvalidSeizeShare,
    #[msg("Borrow rate is absurdly high")]
    BorrowRateTooHigh,
    #[msg("Account has entered too many markets")]
    TooManyMarkets,
    #[msg("Reduce amount exceeds reserves")]
    InsufficientReserves,
    #[msg("Account does not hold enough receipt tokens")]
    InsufficientBalance,
    #[msg("Math overflow")]
    MathOverflow,
    #[msg("Caller is not the admin")]
    Unauthorized,
    #[msg("Invalid protocol configuration")]
    InvalidConfig,
}
