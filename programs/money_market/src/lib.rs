//! Collateralized money market: per-asset ledgers with interest-bearing
//! receipt tokens, a cross-market risk controller, and liquidation.
//!
//! State types are Anchor accounts; [`LendingEngine`] drives them as one
//! serialized state machine over an oracle and a token custody backend.

use anchor_lang::prelude::*;

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod interest_rate_model;
pub mod liquidation;
pub mod math;
pub mod risk;
pub mod state;
pub mod token;

pub use config::{MarketConfig, ProtocolConfig, RateModelConfig};
pub use engine::{LendingEngine, REPAY_MAX};
pub use error::MarketError;
pub use interest_rate_model::{InterestRateModel, JumpRateModel, RateModel, WhitePaperModel};
pub use liquidation::SeizeSplit;
pub use math::{Exp, Rounding, EXP_SCALE};
pub use risk::{AccountLiquidity, AccountSnapshot, LedgerView, LiquidityDelta};
pub use state::{AccountMembership, AccountPosition, BorrowSnapshot, Comptroller, Market, MarketListing};
pub use token::{TokenCustody, TokenError, TokenLedger};

declare_id!("MMkt111111111111111111111111111111111111111");

/// Engine backed by the in-memory token ledger and the oracle account.
pub type InMemoryEngine = LendingEngine<oracle_framework::OracleState, TokenLedger>;
