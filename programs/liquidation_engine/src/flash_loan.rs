use anchor_lang::prelude::*;
use money_market::math::{mul_div, Rounding};
use money_market::{LendingEngine, TokenCustody};
use oracle_framework::PriceFeed;

use crate::{FlashLoan, LiquidationError};

/// 0.09% premium on every flash loan.
pub const FLASH_LOAN_PREMIUM_BPS: u16 = 9;

const BPS_DENOMINATOR: u128 = 10_000;

/// Callback side of a flash loan. Invoked once, after the loaned amounts
/// have been credited to `address()`; must leave `amount + premium` of each
/// asset approved for `provider` to pull back.
pub trait FlashLoanReceiver<O, T> {
    fn address(&self) -> Pubkey;

    #[allow(clippy::too_many_arguments)]
    fn execute_operation(
        &mut self,
        engine: &mut LendingEngine<O, T>,
        provider: Pubkey,
        assets: &[Pubkey],
        amounts: &[u128],
        premiums: &[u128],
        initiator: Pubkey,
        params: &[u8],
    ) -> Result<()>;
}

/// Lends assets for the duration of one receiver callback. A provider must
/// revert every ledger effect of the callback if the loan is not repaid.
/// Each asset appears at most once per loan.
pub trait FlashLoanProvider<O, T> {
    fn flash_loan<R: FlashLoanReceiver<O, T>>(
        &mut self,
        engine: &mut LendingEngine<O, T>,
        receiver: &mut R,
        initiator: Pubkey,
        assets: &[Pubkey],
        amounts: &[u128],
        params: &[u8],
    ) -> Result<()>;
}

/// Reference provider lending out of a pool account in the engine's token ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashLender {
    pub pool: Pubkey,
    pub premium_bps: u16,
}

impl FlashLender {
    pub fn new(pool: Pubkey) -> Self {
        Self {
            pool,
            premium_bps: FLASH_LOAN_PREMIUM_BPS,
        }
    }

    pub fn premium(&self, amount: u128) -> Result<u128> {
        mul_div(amount, self.premium_bps as u128, BPS_DENOMINATOR, Rounding::Up)
            .ok_or_else(|| error!(LiquidationError::MathOverflow))
    }

    fn lend_and_collect<O, T, R>(
        &self,
        engine: &mut LendingEngine<O, T>,
        receiver: &mut R,
        initiator: Pubkey,
        assets: &[Pubkey],
        amounts: &[u128],
        params: &[u8],
    ) -> Result<()>
    where
        O: PriceFeed,
        T: TokenCustody,
        R: FlashLoanReceiver<O, T>,
    {
        let receiver_address = receiver.address();
        let mut premiums = Vec::with_capacity(assets.len());
        let mut pool_before = Vec::with_capacity(assets.len());

        for (asset, amount) in assets.iter().zip(amounts) {
            require!(*amount > 0, LiquidationError::InvalidFlashLoan);
            let available = engine.tokens().balance_of(asset, &self.pool);
            require!(
                available >= *amount,
                LiquidationError::FlashLiquidityUnavailable
            );
            premiums.push(self.premium(*amount)?);
            pool_before.push(available);
            engine
                .tokens_mut()
                .transfer(asset, &self.pool, &receiver_address, *amount)?;
        }

        receiver.execute_operation(
            engine,
            self.pool,
            assets,
            amounts,
            &premiums,
            initiator,
            params,
        )?;

        for (index, asset) in assets.iter().enumerate() {
            let owed = amounts[index]
                .checked_add(premiums[index])
                .ok_or(LiquidationError::MathOverflow)?;
            engine
                .tokens_mut()
                .transfer_from(asset, &self.pool, &receiver_address, &self.pool, owed)
                .map_err(|err| {
                    msg!("⚠️ flash loan repayment failed: {}", err);
                    error!(LiquidationError::FlashLoanNotRepaid)
                })?;

            let expected = pool_before[index]
                .checked_add(premiums[index])
                .ok_or(LiquidationError::MathOverflow)?;
            require!(
                engine.tokens().balance_of(asset, &self.pool) >= expected,
                LiquidationError::FlashLoanNotRepaid
            );

            emit!(FlashLoan {
                provider: self.pool,
                receiver: receiver_address,
                initiator,
                asset: *asset,
                amount: amounts[index],
                premium: premiums[index],
            });
        }

        Ok(())
    }
}

impl<O, T> FlashLoanProvider<O, T> for FlashLender
where
    O: PriceFeed + Clone,
    T: TokenCustody + Clone,
{
    fn flash_loan<R: FlashLoanReceiver<O, T>>(
        &mut self,
        engine: &mut LendingEngine<O, T>,
        receiver: &mut R,
        initiator: Pubkey,
        assets: &[Pubkey],
        amounts: &[u128],
        params: &[u8],
    ) -> Result<()> {
        require!(
            !assets.is_empty() && assets.len() == amounts.len(),
            LiquidationError::InvalidFlashLoan
        );
        for (index, asset) in assets.iter().enumerate() {
            require!(
                !assets[..index].contains(asset),
                LiquidationError::InvalidFlashLoan
            );
        }

        let checkpoint = engine.clone();
        let outcome = self.lend_and_collect(engine, receiver, initiator, assets, amounts, params);
        if outcome.is_err() {
            *engine = checkpoint;
            msg!("⚠️ Flash loan reverted; ledger restored");
        }
        outcome
    }
}
