use anchor_lang::prelude::*;
use money_market::{LendingEngine, TokenCustody};
use oracle_framework::PriceFeed;

use crate::flash_loan::{FlashLoanProvider, FlashLoanReceiver};
use crate::venue::SwapVenue;
use crate::{FlashLiquidationExecuted, LiquidationAuthority, LiquidationError};

/// Payload carried through the flash loan to the callback.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiquidationParams {
    pub borrower: Pubkey,
    pub debt_market: Pubkey,
    pub collateral_market: Pubkey,
    pub collateral_asset: Pubkey,
}

impl LiquidationParams {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.serialize(&mut data)
            .map_err(|_| error!(LiquidationError::InvalidParams))?;
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::try_from_slice(data).map_err(|_| error!(LiquidationError::InvalidParams))
    }
}

/// Liquidates with borrowed funds: the flash loan pays the debt, the seized
/// collateral is redeemed and sold back into the debt asset, and the loan
/// plus premium is repaid out of the proceeds. Anything left is profit.
#[derive(Clone, Debug)]
pub struct FlashLiquidator<V> {
    pub authority: LiquidationAuthority,
    pub venue: V,
}

impl<V: SwapVenue> FlashLiquidator<V> {
    pub fn new(owner: Pubkey, receiver: Pubkey, venue: V) -> Self {
        Self {
            authority: LiquidationAuthority::new(owner, receiver),
            venue,
        }
    }

    /// Requests a flash loan of `repay_amount` of the debt market's underlying
    /// and liquidates inside the callback. Returns the profit kept.
    pub fn liquidate<O, T, P>(
        &mut self,
        lender: &mut P,
        engine: &mut LendingEngine<O, T>,
        caller: Pubkey,
        params: LiquidationParams,
        repay_amount: u128,
    ) -> Result<u128>
    where
        O: PriceFeed,
        T: TokenCustody,
        P: FlashLoanProvider<O, T>,
    {
        require_keys_eq!(caller, self.authority.owner, LiquidationError::Unauthorized);
        require!(
            self.authority.can_liquidate(),
            LiquidationError::LiquidationInProgress
        );
        let debt_asset = engine.market(&params.debt_market)?.underlying;
        let data = params.encode()?;

        let checkpoint = self.authority.clone();
        self.authority.pending = true;
        self.authority.last_profit = 0;
        self.authority.last_repay_amount = 0;
        let outcome = lender.flash_loan(engine, self, caller, &[debt_asset], &[repay_amount], &data);
        if let Err(err) = outcome {
            self.authority = checkpoint;
            return Err(err);
        }
        // A provider that never called back leaves the flag set.
        if self.authority.pending {
            self.authority = checkpoint;
            msg!("⚠️ Flash loan returned without invoking the liquidation callback");
            return err!(LiquidationError::UnexpectedCallback);
        }

        self.authority.executed_count = self.authority.executed_count.saturating_add(1);
        self.authority.total_profit = self
            .authority
            .total_profit
            .checked_add(self.authority.last_profit)
            .ok_or(LiquidationError::MathOverflow)?;
        msg!(
            "✅ Flash liquidation of {} complete, profit {}",
            params.borrower,
            self.authority.last_profit
        );

        Ok(self.authority.last_profit)
    }
}

impl<O, T, V> FlashLoanReceiver<O, T> for FlashLiquidator<V>
where
    O: PriceFeed,
    T: TokenCustody,
    V: SwapVenue,
{
    fn address(&self) -> Pubkey {
        self.authority.receiver
    }

    fn execute_operation(
        &mut self,
        engine: &mut LendingEngine<O, T>,
        provider: Pubkey,
        assets: &[Pubkey],
        amounts: &[u128],
        premiums: &[u128],
        initiator: Pubkey,
        params: &[u8],
    ) -> Result<()> {
        // Consume the pending flag first so a repeated callback cannot run twice.
        require!(self.authority.pending, LiquidationError::UnexpectedCallback);
        self.authority.pending = false;
        require_keys_eq!(initiator, self.authority.owner, LiquidationError::Unauthorized);
        require!(
            assets.len() == 1 && amounts.len() == 1 && premiums.len() == 1,
            LiquidationError::InvalidFlashLoan
        );

        let params = LiquidationParams::decode(params)?;
        let (debt_asset, repay_amount, premium) = (assets[0], amounts[0], premiums[0]);
        require_keys_eq!(
            engine.market(&params.debt_market)?.underlying,
            debt_asset,
            LiquidationError::AssetMismatch
        );
        require_keys_eq!(
            engine.market(&params.collateral_market)?.underlying,
            params.collateral_asset,
            LiquidationError::AssetMismatch
        );

        let receiver = self.authority.receiver;
        let held_before_loan = engine
            .tokens()
            .balance_of(&debt_asset, &receiver)
            .saturating_sub(repay_amount);

        engine
            .tokens_mut()
            .approve(&debt_asset, &receiver, &params.debt_market, repay_amount);
        let seized = engine.liquidate_borrow(
            receiver,
            params.borrower,
            params.debt_market,
            repay_amount,
            params.collateral_market,
        )?;
        let redeemed = if seized.liquidator_tokens > 0 {
            engine.redeem(receiver, params.collateral_market, seized.liquidator_tokens)?
        } else {
            0
        };

        let owed = repay_amount
            .checked_add(premium)
            .ok_or(LiquidationError::MathOverflow)?;
        if params.collateral_asset != debt_asset && redeemed > 0 {
            let on_hand = engine.tokens().balance_of(&debt_asset, &receiver);
            let min_amount_out = owed.saturating_sub(on_hand);
            self.venue.swap_exact_input(
                engine.tokens_mut(),
                &receiver,
                &params.collateral_asset,
                &debt_asset,
                redeemed,
                min_amount_out,
            )?;
        }

        let balance = engine.tokens().balance_of(&debt_asset, &receiver);
        require!(balance >= owed, LiquidationError::Unprofitable);
        engine
            .tokens_mut()
            .approve(&debt_asset, &receiver, &provider, owed);

        let profit = balance
            .saturating_sub(owed)
            .saturating_sub(held_before_loan);
        self.authority.last_repay_amount = repay_amount;
        self.authority.last_profit = profit;

        emit!(FlashLiquidationExecuted {
            owner: self.authority.owner,
            borrower: params.borrower,
            debt_market: params.debt_market,
            collateral_market: params.collateral_market,
            repay_amount,
            seize_tokens: seized.seize_tokens,
            profit,
        });

        Ok(())
    }
}
