use anchor_lang::prelude::*;

declare_id!("Arcf111111111111111111111111111111111111111");

/// Read side of the oracle as seen by the risk engine.
pub trait PriceFeed {
    /// Price of one base unit of the market's underlying, as an 18-decimal mantissa.
    /// A missing or zero price is reported as `StalePrice`.
    fn underlying_price(&self, market: &Pubkey) -> Result<u128>;
}

#[program]
pub mod oracle_framework {
    use super::*;

    /// Initialize the global price oracle. The signer becomes the price operator.
    pub fn initialize_oracle(ctx: Context<InitializeOracle>, protocol_admin: Pubkey) -> Result<()> {
        let oracle = &mut ctx.accounts.oracle;
        **oracle = OracleState::new(ctx.accounts.authority.key(), protocol_admin);
        msg!("✅ Price oracle initialized with protocol admin: {}", protocol_admin);

        let clock = Clock::get()?;
        emit!(OracleInitialized {
            authority: ctx.accounts.authority.key(),
            protocol_admin,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    pub fn set_underlying_price(ctx: Context<OracleCtx>, market: Pubkey, price_mantissa: u128) -> Result<()> {
        let clock = Clock::get()?;
        let oracle = &mut ctx.accounts.oracle;
        let previous = oracle.set_underlying_price(
            ctx.accounts.authority.key(),
            market,
            price_mantissa,
            clock.slot,
        )?;

        emit!(PriceUpdated {
            market,
            previous_mantissa: previous,
            price_mantissa,
            slot: clock.slot,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    /// Rotate the price operator (protocol admin only).
    pub fn set_oracle_authority(ctx: Context<AdminOracleAction>, new_authority: Pubkey) -> Result<()> {
        let oracle = &mut ctx.accounts.oracle;
        let previous = oracle.authority;
        oracle.set_authority(ctx.accounts.protocol_admin.key(), new_authority)?;

        let clock = Clock::get()?;
        emit!(OracleAuthorityChanged {
            previous,
            new_authority,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }
}

#[derive(Accounts)]
pub struct InitializeOracle<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + OracleState::LEN,
        seeds = [b"oracle"],
        bump
    )]
    pub oracle: Account<'info, OracleState>,
    #[account(mut)]
    pub authority: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct OracleCtx<'info> {
    #[account(
        mut,
        seeds = [b"oracle"],
        bump
    )]
    pub oracle: Account<'info, OracleState>,
    pub authority: Signer<'info>,
}

#[derive(Accounts)]
pub struct AdminOracleAction<'info> {
    #[account(
        mut,
        seeds = [b"oracle"],
        bump
    )]
    pub oracle: Account<'info, OracleState>,

    /// Protocol admin (must match oracle.protocol_admin)
    pub protocol_admin: Signer<'info>,
}

#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct OracleState {
    pub authority: Pubkey,
    pub protocol_admin: Pubkey,
    pub prices: Vec<PriceEntry>,
    pub last_update_slot: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceEntry {
    pub market: Pubkey,
    pub price_mantissa: u128,
    pub updated_slot: u64,
}

impl PriceEntry {
    pub const LEN: usize = 32 + 16 + 8;
}

impl OracleState {
    pub const MAX_PRICES: usize = 32;
    pub const LEN: usize = 32 + 32 + 4 + Self::MAX_PRICES * PriceEntry::LEN + 8;

    pub fn new(authority: Pubkey, protocol_admin: Pubkey) -> Self {
        Self {
            authority,
            protocol_admin,
            prices: Vec::new(),
            last_update_slot: 0,
        }
    }

    pub fn price_entry(&self, market: &Pubkey) -> Option<&PriceEntry> {
        self.prices.iter().find(|entry| entry.market == *market)
    }

    /// Operator-only price write. Returns the previous mantissa (zero when unset).
    pub fn set_underlying_price(
        &mut self,
        signer: Pubkey,
        market: Pubkey,
        price_mantissa: u128,
        slot: u64,
    ) -> Result<u128> {
        require_keys_eq!(self.authority, signer, OracleError::Unauthorized);
        require!(price_mantissa > 0, OracleError::InvalidPrice);

        let previous = match self.prices.iter_mut().find(|entry| entry.market == market) {
            Some(entry) => {
                let previous = entry.price_mantissa;
                entry.price_mantissa = price_mantissa;
                entry.updated_slot = slot;
                previous
            }
            None => {
                require!(self.prices.len() < Self::MAX_PRICES, OracleError::TooManyPrices);
                self.prices.push(PriceEntry {
                    market,
                    price_mantissa,
                    updated_slot: slot,
                });
                0
            }
        };
        self.last_update_slot = slot;
        msg!("✅ Price for {} set to {} (was {})", market, price_mantissa, previous);

        Ok(previous)
    }

    pub fn set_authority(&mut self, signer: Pubkey, new_authority: Pubkey) -> Result<()> {
        require_keys_eq!(self.protocol_admin, signer, OracleError::Unauthorized);
        require!(new_authority != Pubkey::default(), OracleError::InvalidAuthority);
        self.authority = new_authority;
        msg!("✅ Oracle authority rotated to {}", new_authority);
        Ok(())
    }
}

impl PriceFeed for OracleState {
    fn underlying_price(&self, market: &Pubkey) -> Result<u128> {
        self.price_entry(market)
            .map(|entry| entry.price_mantissa)
            .filter(|price| *price > 0)
            .ok_or_else(|| error!(OracleError::StalePrice))
    }
}

#[event]
pub struct OracleInitialized {
    pub authority: Pubkey,
    pub protocol_admin: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct PriceUpdated {
    pub market: Pubkey,
    pub previous_mantissa: u128,
    pub price_mantissa: u128,
    pub slot: u64,
    pub timestamp: i64,
}

#[event]
pub struct OracleAuthorityChanged {
    pub previous: Pubkey,
    pub new_authority: Pubkey,
    pub timestamp: i64,
}

#[error_code(offset = 6500)]
pub enum OracleError {
    #[msg("Unauthorized oracle update")]
    Unauthorized,
    #[msg("Invalid price value")]
    InvalidPrice,
    #[msg("Oracle price is missing or stale")]
    StalePrice,
    #[msg("Oracle price table is full")]
    TooManyPrices,
    #[msg("Oracle authority cannot be the default address")]
    InvalidAuthority,
}
