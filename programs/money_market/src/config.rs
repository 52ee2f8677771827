use std::str::FromStr;

use anchor_lang::prelude::*;
use oracle_framework::OracleState;
use serde::{Deserialize, Serialize};

use crate::engine::LendingEngine;
use crate::error::MarketError;
use crate::interest_rate_model::{JumpRateModel, RateModel, WhitePaperModel};
use crate::math::Exp;
use crate::token::TokenCustody;

/// Deployment description. Ratios and prices are decimal strings ("0.5",
/// "1.08") so they convert to mantissas exactly. Keys are base58.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub admin: String,
    /// Price operator; defaults to the admin.
    #[serde(default)]
    pub oracle_authority: Option<String>,
    #[serde(default = "default_close_factor")]
    pub close_factor: String,
    #[serde(default = "default_liquidation_incentive")]
    pub liquidation_incentive: String,
    #[serde(default)]
    pub protocol_seize_share: Option<String>,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub underlying: String,
    #[serde(default = "default_zero")]
    pub collateral_factor: String,
    #[serde(default = "default_zero")]
    pub reserve_factor: String,
    #[serde(default = "default_one")]
    pub initial_exchange_rate: String,
    /// Underlying price in the quote unit; required for a nonzero collateral factor.
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub interest_rate_model: RateModelConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelConfig {
    WhitePaper {
        base_rate_per_year: String,
        multiplier_per_year: String,
    },
    JumpRate {
        base_rate_per_year: String,
        multiplier_per_year: String,
        jump_multiplier_per_year: String,
        kink: String,
    },
}

impl Default for RateModelConfig {
    fn default() -> Self {
        RateModelConfig::WhitePaper {
            base_rate_per_year: default_zero(),
            multiplier_per_year: default_zero(),
        }
    }
}

fn default_close_factor() -> String {
    "0.5".to_string()
}

fn default_liquidation_incentive() -> String {
    "1.08".to_string()
}

fn default_zero() -> String {
    "0".to_string()
}

fn default_one() -> String {
    "1".to_string()
}

fn parse_exp(field: &str, value: &str) -> Result<Exp> {
    Exp::from_decimal_str(value).ok_or_else(|| {
        msg!("config: {} is not a decimal: {:?}", field, value);
        error!(MarketError::InvalidConfig)
    })
}

fn parse_key(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).map_err(|_| {
        msg!("config: {} is not a base58 key: {:?}", field, value);
        error!(MarketError::InvalidConfig)
    })
}

impl ProtocolConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| {
            msg!("config: {}", err);
            error!(MarketError::InvalidConfig)
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            msg!("config: {}", err);
            error!(MarketError::InvalidConfig)
        })
    }
}

impl RateModelConfig {
    pub fn to_rate_model(&self) -> Result<RateModel> {
        Ok(match self {
            RateModelConfig::WhitePaper {
                base_rate_per_year,
                multiplier_per_year,
            } => RateModel::WhitePaper(WhitePaperModel::from_annual(
                parse_exp("base_rate_per_year", base_rate_per_year)?,
                parse_exp("multiplier_per_year", multiplier_per_year)?,
            )),
            RateModelConfig::JumpRate {
                base_rate_per_year,
                multiplier_per_year,
                jump_multiplier_per_year,
                kink,
            } => RateModel::JumpRate(JumpRateModel::from_annual(
                parse_exp("base_rate_per_year", base_rate_per_year)?,
                parse_exp("multiplier_per_year", multiplier_per_year)?,
                parse_exp("jump_multiplier_per_year", jump_multiplier_per_year)?,
                parse_exp("kink", kink)?,
            )),
        })
    }
}

impl<T: TokenCustody> LendingEngine<OracleState, T> {
    /// Builds an engine with every configured market listed, priced and
    /// parameterized. The oracle account address is derived from its seed.
    pub fn from_config(config: &ProtocolConfig, tokens: T) -> Result<Self> {
        let admin = parse_key("admin", &config.admin)?;
        let oracle_authority = match &config.oracle_authority {
            Some(key) => parse_key("oracle_authority", key)?,
            None => admin,
        };
        let oracle_address = Pubkey::find_program_address(&[b"oracle"], &oracle_framework::ID).0;

        let mut engine = LendingEngine::new(
            admin,
            oracle_address,
            OracleState::new(oracle_authority, admin),
            tokens,
        );
        engine.set_block(config.start_block);
        engine.set_close_factor(admin, parse_exp("close_factor", &config.close_factor)?)?;
        engine.set_liquidation_incentive(
            admin,
            parse_exp("liquidation_incentive", &config.liquidation_incentive)?,
        )?;
        if let Some(share) = &config.protocol_seize_share {
            engine.set_protocol_seize_share(admin, parse_exp("protocol_seize_share", share)?)?;
        }

        for market in &config.markets {
            let underlying = parse_key("underlying", &market.underlying)?;
            let id = engine.support_market(
                admin,
                underlying,
                market.interest_rate_model.to_rate_model()?,
                parse_exp("initial_exchange_rate", &market.initial_exchange_rate)?,
                parse_exp("reserve_factor", &market.reserve_factor)?,
            )?;
            if let Some(price) = &market.price {
                let price = parse_exp("price", price)?;
                let block = engine.current_block();
                engine
                    .oracle_mut()
                    .set_underlying_price(oracle_authority, id, price.mantissa, block)?;
            }
            engine.set_collateral_factor(
                admin,
                id,
                parse_exp("collateral_factor", &market.collateral_factor)?,
            )?;
        }

        msg!("✅ Protocol configured with {} markets", config.markets.len());
        Ok(engine)
    }
}
