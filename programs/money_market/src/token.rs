use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use thiserror::Error;

use crate::error::MarketError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance: {holder} holds {available} of {asset}, needs {required}")]
    InsufficientBalance {
        asset: Pubkey,
        holder: Pubkey,
        available: u128,
        required: u128,
    },
    #[error("insufficient allowance: {spender} may move {available} of {owner}'s {asset}, needs {required}")]
    InsufficientAllowance {
        asset: Pubkey,
        owner: Pubkey,
        spender: Pubkey,
        available: u128,
        required: u128,
    },
    #[error("balance overflow for {holder}")]
    Overflow { holder: Pubkey },
}

impl From<TokenError> for anchor_lang::error::Error {
    fn from(err: TokenError) -> Self {
        msg!("token custody: {}", err);
        error!(MarketError::InsufficientAllowanceOrBalance)
    }
}

/// Custody of underlying assets. Markets hold their cash under their own id.
pub trait TokenCustody {
    fn balance_of(&self, asset: &Pubkey, holder: &Pubkey) -> u128;

    fn allowance(&self, asset: &Pubkey, owner: &Pubkey, spender: &Pubkey) -> u128;

    fn approve(&mut self, asset: &Pubkey, owner: &Pubkey, spender: &Pubkey, amount: u128);

    fn transfer(&mut self, asset: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u128) -> std::result::Result<(), TokenError>;

    /// Moves `amount` from `from` to `to` on `spender`'s allowance. A holder
    /// spending its own balance needs no allowance.
    fn transfer_from(
        &mut self,
        asset: &Pubkey,
        spender: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> std::result::Result<(), TokenError>;
}

/// In-memory balances and allowances for every asset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenLedger {
    balances: BTreeMap<(Pubkey, Pubkey), u128>,
    allowances: BTreeMap<(Pubkey, Pubkey, Pubkey), u128>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits fresh units to `holder`.
    pub fn mint_to(&mut self, asset: &Pubkey, holder: &Pubkey, amount: u128) -> std::result::Result<(), TokenError> {
        let balance = self.balances.entry((*asset, *holder)).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(TokenError::Overflow { holder: *holder })?;
        Ok(())
    }
}

impl TokenCustody for TokenLedger {
    fn balance_of(&self, asset: &Pubkey, holder: &Pubkey) -> u128 {
        self.balances.get(&(*asset, *holder)).copied().unwrap_or(0)
    }

    fn allowance(&self, asset: &Pubkey, owner: &Pubkey, spender: &Pubkey) -> u128 {
        self.allowances
            .get(&(*asset, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&mut self, asset: &Pubkey, owner: &Pubkey, spender: &Pubkey, amount: u128) {
        self.allowances.insert((*asset, *owner, *spender), amount);
    }

    fn transfer(&mut self, asset: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u128) -> std::result::Result<(), TokenError> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                asset: *asset,
                holder: *from,
                available,
                required: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow { holder: *to })?;
        self.balances.insert((*asset, *from), available - amount);
        self.balances.insert((*asset, *to), credited);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        asset: &Pubkey,
        spender: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> std::result::Result<(), TokenError> {
        if spender == from {
            return self.transfer(asset, from, to, amount);
        }
        let allowed = self.allowance(asset, from, spender);
        if allowed < amount {
            return Err(TokenError::InsufficientAllowance {
                asset: *asset,
                owner: *from,
                spender: *spender,
                available: allowed,
                required: amount,
            });
        }
        self.transfer(asset, from, to, amount)?;
        // u128::MAX is an unlimited approval
        if allowed != u128::MAX {
            self.allowances.insert((*asset, *from, *spender), allowed - amount);
        }
        Ok(())
    }
}
