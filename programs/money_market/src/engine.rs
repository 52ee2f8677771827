//! The protocol as a single serialized state machine.
//!
//! Every state-changing call follows the same shape: copy the markets and
//! positions it touches, accrue the copies, run every risk check against
//! them, perform the one fallible token movement, then commit. Any error
//! returns before the commit, so failed calls leave the ledger unchanged.

use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use oracle_framework::PriceFeed;

use crate::error::MarketError;
use crate::events::{self, RiskParameter};
use crate::interest_rate_model::RateModel;
use crate::liquidation::{self, SeizeSplit};
use crate::math::{Exp, Rounding};
use crate::risk::{self, AccountLiquidity, AccountSnapshot, LedgerView, LiquidityDelta};
use crate::state::{
    AccountMembership, AccountPosition, Accrual, BorrowSnapshot, Comptroller, Market, MarketListing,
};
use crate::token::TokenCustody;

/// Passed as a repay amount to repay the whole outstanding borrow.
pub const REPAY_MAX: u128 = u128::MAX;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LendingEngine<O, T> {
    comptroller: Comptroller,
    oracle: O,
    tokens: T,
    markets: BTreeMap<Pubkey, Market>,
    positions: BTreeMap<(Pubkey, Pubkey), AccountPosition>,
    memberships: BTreeMap<Pubkey, AccountMembership>,
    current_block: u64,
}

/// An accrued copy of a market awaiting commit.
struct StagedMarket {
    market: Market,
    accrual: Option<Accrual>,
}

enum RedeemRequest {
    Tokens(u128),
    Underlying(u128),
}

/// Stored state with some markets replaced by staged copies.
struct StagedLedger<'a> {
    markets: &'a BTreeMap<Pubkey, Market>,
    positions: &'a BTreeMap<(Pubkey, Pubkey), AccountPosition>,
    staged: Vec<&'a Market>,
}

impl LedgerView for StagedLedger<'_> {
    fn account_snapshot(&self, market: &Pubkey, account: &Pubkey) -> Result<AccountSnapshot> {
        let ledger = self
            .staged
            .iter()
            .copied()
            .find(|staged| staged.id == *market)
            .or_else(|| self.markets.get(market))
            .ok_or(MarketError::MarketNotListed)?;
        ledger.account_snapshot(self.positions.get(&(*market, *account)))
    }
}

impl<O, T> LedgerView for LendingEngine<O, T> {
    fn account_snapshot(&self, market: &Pubkey, account: &Pubkey) -> Result<AccountSnapshot> {
        let ledger = self.markets.get(market).ok_or(MarketError::MarketNotListed)?;
        ledger.account_snapshot(self.positions.get(&(*market, *account)))
    }
}

impl<O, T> LendingEngine<O, T>
where
    O: PriceFeed,
    T: TokenCustody,
{
    pub fn new(admin: Pubkey, oracle_address: Pubkey, oracle: O, tokens: T) -> Self {
        Self {
            comptroller: Comptroller::new(admin, oracle_address),
            oracle,
            tokens,
            markets: BTreeMap::new(),
            positions: BTreeMap::new(),
            memberships: BTreeMap::new(),
            current_block: 0,
        }
    }

    pub fn comptroller(&self) -> &Comptroller {
        &self.comptroller
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    pub fn set_block(&mut self, block: u64) {
        self.current_block = block;
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.current_block = self.current_block.saturating_add(blocks);
    }

    pub fn market(&self, id: &Pubkey) -> Result<&Market> {
        self.markets
            .get(id)
            .ok_or_else(|| error!(MarketError::MarketNotListed))
    }

    pub fn market_ids(&self) -> Vec<Pubkey> {
        self.markets.keys().copied().collect()
    }

    pub fn position(&self, market: &Pubkey, owner: &Pubkey) -> Option<&AccountPosition> {
        self.positions.get(&(*market, *owner))
    }

    pub fn receipt_balance(&self, market: &Pubkey, owner: &Pubkey) -> u128 {
        self.position(market, owner)
            .map(|position| position.receipt_balance)
            .unwrap_or(0)
    }

    pub fn membership(&self, owner: &Pubkey) -> Option<&AccountMembership> {
        self.memberships.get(owner)
    }

    /// Account-serialized bytes of every ledger account, in key order.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.comptroller.try_serialize(&mut bytes)?;
        for market in self.markets.values() {
            market.try_serialize(&mut bytes)?;
        }
        for position in self.positions.values() {
            position.try_serialize(&mut bytes)?;
        }
        for membership in self.memberships.values() {
            membership.try_serialize(&mut bytes)?;
        }
        bytes.extend_from_slice(&self.current_block.to_le_bytes());
        Ok(bytes)
    }

    fn view<'a>(&'a self, staged: Vec<&'a Market>) -> StagedLedger<'a> {
        StagedLedger {
            markets: &self.markets,
            positions: &self.positions,
            staged,
        }
    }

    fn stage_market(&self, id: &Pubkey) -> Result<StagedMarket> {
        let mut market = self.market(id)?.clone();
        let accrual = market.accrue_interest(self.current_block)?;
        Ok(StagedMarket { market, accrual })
    }

    fn commit_market(&mut self, staged: StagedMarket) {
        let StagedMarket { market, accrual } = staged;
        if let Some(accrual) = accrual {
            emit!(events::AccrueInterest {
                market: market.id,
                cash_prior: accrual.cash_prior,
                interest_accumulated: accrual.interest_accumulated,
                borrow_index: market.borrow_index.mantissa,
                total_borrows: market.total_borrows,
                block: self.current_block,
            });
        }
        self.markets.insert(market.id, market);
    }

    fn position_or_new(&self, market: &Pubkey, owner: &Pubkey) -> AccountPosition {
        self.position(market, owner)
            .cloned()
            .unwrap_or_else(|| AccountPosition::new(*market, *owner))
    }

    fn membership_or_new(&self, owner: &Pubkey) -> AccountMembership {
        self.membership(owner)
            .cloned()
            .unwrap_or_else(|| AccountMembership::new(*owner))
    }

    // ---------------------------------------------------------------------
    // Market ledger
    // ---------------------------------------------------------------------

    pub fn accrue_interest(&mut self, market_id: &Pubkey) -> Result<()> {
        let staged = self.stage_market(market_id)?;
        self.commit_market(staged);
        Ok(())
    }

    /// Supplies `mint_amount` underlying and returns the receipt tokens minted.
    pub fn mint(&mut self, minter: Pubkey, market_id: Pubkey, mint_amount: u128) -> Result<u128> {
        require!(mint_amount > 0, MarketError::InvalidAmount);
        self.comptroller.mint_allowed(&market_id)?;

        let mut staged = self.stage_market(&market_id)?;
        let exchange_rate = staged.market.exchange_rate_stored()?;
        let mint_tokens = exchange_rate
            .div_into(mint_amount, Rounding::Down)
            .ok_or(MarketError::MathOverflow)?;
        require!(mint_tokens > 0, MarketError::InvalidAmount);

        let mut position = self.position_or_new(&market_id, &minter);
        position.receipt_balance = position
            .receipt_balance
            .checked_add(mint_tokens)
            .ok_or(MarketError::MathOverflow)?;
        let market = &mut staged.market;
        market.total_supply = market
            .total_supply
            .checked_add(mint_tokens)
            .ok_or(MarketError::MathOverflow)?;
        market.cash = market
            .cash
            .checked_add(mint_amount)
            .ok_or(MarketError::MathOverflow)?;
        let underlying = market.underlying;

        self.tokens
            .transfer_from(&underlying, &market_id, &minter, &market_id, mint_amount)?;

        self.positions.insert((market_id, minter), position);
        self.commit_market(staged);
        msg!("✅ Mint: {} supplied {} for {} receipt tokens", minter, mint_amount, mint_tokens);
        emit!(events::Mint {
            market: market_id,
            minter,
            mint_amount,
            mint_tokens,
            block: self.current_block,
        });

        Ok(mint_tokens)
    }

    /// Burns `redeem_tokens` and returns the underlying paid out.
    pub fn redeem(&mut self, redeemer: Pubkey, market_id: Pubkey, redeem_tokens: u128) -> Result<u128> {
        let (_, redeem_amount) =
            self.redeem_fresh(redeemer, market_id, RedeemRequest::Tokens(redeem_tokens))?;
        Ok(redeem_amount)
    }

    /// Withdraws exactly `redeem_amount` underlying and returns the receipt tokens burned.
    pub fn redeem_underlying(&mut self, redeemer: Pubkey, market_id: Pubkey, redeem_amount: u128) -> Result<u128> {
        let (redeem_tokens, _) =
            self.redeem_fresh(redeemer, market_id, RedeemRequest::Underlying(redeem_amount))?;
        Ok(redeem_tokens)
    }

    fn redeem_fresh(&mut self, redeemer: Pubkey, market_id: Pubkey, request: RedeemRequest) -> Result<(u128, u128)> {
        let requested = match request {
            RedeemRequest::Tokens(value) | RedeemRequest::Underlying(value) => value,
        };
        require!(requested > 0, MarketError::InvalidAmount);
        self.comptroller.require_listed(&market_id)?;

        let mut staged = self.stage_market(&market_id)?;
        let exchange_rate = staged.market.exchange_rate_stored()?;
        let (redeem_tokens, redeem_amount) = match request {
            RedeemRequest::Tokens(tokens) => (
                tokens,
                exchange_rate
                    .mul_scalar(tokens, Rounding::Down)
                    .ok_or(MarketError::MathOverflow)?,
            ),
            RedeemRequest::Underlying(amount) => (
                exchange_rate
                    .div_into(amount, Rounding::Up)
                    .ok_or(MarketError::MathOverflow)?,
                amount,
            ),
        };

        let mut position = self.position_or_new(&market_id, &redeemer);
        require!(
            position.receipt_balance >= redeem_tokens,
            MarketError::InsufficientBalance
        );
        require!(staged.market.cash >= redeem_amount, MarketError::InsufficientCash);

        let membership = self.membership_or_new(&redeemer);
        self.comptroller.redeem_allowed(
            &market_id,
            &redeemer,
            redeem_tokens,
            &membership,
            &self.view(vec![&staged.market]),
            &self.oracle,
        )?;

        position.receipt_balance -= redeem_tokens;
        let market = &mut staged.market;
        market.total_supply = market
            .total_supply
            .checked_sub(redeem_tokens)
            .ok_or(MarketError::MathOverflow)?;
        market.cash -= redeem_amount;
        let underlying = market.underlying;

        self.tokens
            .transfer(&underlying, &market_id, &redeemer, redeem_amount)?;

        self.positions.insert((market_id, redeemer), position);
        self.commit_market(staged);
        msg!("✅ Redeem: {} burned {} receipt tokens for {}", redeemer, redeem_tokens, redeem_amount);
        emit!(events::Redeem {
            market: market_id,
            redeemer,
            redeem_amount,
            redeem_tokens,
            block: self.current_block,
        });

        Ok((redeem_tokens, redeem_amount))
    }

    /// Borrowing enters the market for the borrower if it has not already.
    pub fn borrow(&mut self, borrower: Pubkey, market_id: Pubkey, borrow_amount: u128) -> Result<()> {
        require!(borrow_amount > 0, MarketError::InvalidAmount);
        self.comptroller.require_listed(&market_id)?;

        let mut staged = self.stage_market(&market_id)?;
        let mut membership = self.membership_or_new(&borrower);
        let newly_entered = membership.enter(market_id)?;

        require!(staged.market.cash >= borrow_amount, MarketError::InsufficientCash);
        self.comptroller.borrow_allowed(
            &market_id,
            &borrower,
            borrow_amount,
            &membership,
            &self.view(vec![&staged.market]),
            &self.oracle,
        )?;

        let mut position = self.position_or_new(&market_id, &borrower);
        let market = &mut staged.market;
        let account_borrows = market
            .borrow_balance(&position.borrow)?
            .checked_add(borrow_amount)
            .ok_or(MarketError::MathOverflow)?;
        position.borrow = BorrowSnapshot {
            principal: account_borrows,
            interest_index: market.borrow_index,
        };
        market.total_borrows = market
            .total_borrows
            .checked_add(borrow_amount)
            .ok_or(MarketError::MathOverflow)?;
        market.cash -= borrow_amount;
        let total_borrows = market.total_borrows;
        let underlying = market.underlying;

        self.tokens
            .transfer(&underlying, &market_id, &borrower, borrow_amount)?;

        self.positions.insert((market_id, borrower), position);
        self.memberships.insert(borrower, membership);
        self.commit_market(staged);
        if newly_entered {
            emit!(events::MarketEntered {
                market: market_id,
                account: borrower,
            });
        }
        msg!("✅ Borrow: {} borrowed {} (account debt {})", borrower, borrow_amount, account_borrows);
        emit!(events::Borrow {
            market: market_id,
            borrower,
            borrow_amount,
            account_borrows,
            total_borrows,
            block: self.current_block,
        });

        Ok(())
    }

    /// `payer` repays on behalf of `borrower`. Returns the amount actually repaid.
    pub fn repay_borrow(&mut self, payer: Pubkey, borrower: Pubkey, market_id: Pubkey, repay_amount: u128) -> Result<u128> {
        require!(repay_amount > 0, MarketError::InvalidAmount);
        self.comptroller.repay_borrow_allowed(&market_id)?;

        let mut staged = self.stage_market(&market_id)?;
        let mut position = self.position_or_new(&market_id, &borrower);
        let repaid = Self::apply_repay(&mut staged.market, &mut position, repay_amount)?;
        let underlying = staged.market.underlying;
        let account_borrows = position.borrow.principal;
        let total_borrows = staged.market.total_borrows;

        self.tokens
            .transfer_from(&underlying, &market_id, &payer, &market_id, repaid)?;

        self.positions.insert((market_id, borrower), position);
        self.commit_market(staged);
        msg!("✅ Repay: {} repaid {} for {}", payer, repaid, borrower);
        emit!(events::RepayBorrow {
            market: market_id,
            payer,
            borrower,
            repay_amount: repaid,
            account_borrows,
            total_borrows,
            block: self.current_block,
        });

        Ok(repaid)
    }

    fn apply_repay(market: &mut Market, position: &mut AccountPosition, repay_amount: u128) -> Result<u128> {
        let owed = market.borrow_balance(&position.borrow)?;
        let repaid = if repay_amount == REPAY_MAX {
            owed
        } else {
            require!(repay_amount <= owed, MarketError::RepayAmountExceedsDebt);
            repay_amount
        };
        position.borrow = BorrowSnapshot {
            principal: owed - repaid,
            interest_index: market.borrow_index,
        };
        // Individual debts round up, so their sum can exceed the aggregate by a unit.
        market.total_borrows = market.total_borrows.saturating_sub(repaid);
        market.cash = market
            .cash
            .checked_add(repaid)
            .ok_or(MarketError::MathOverflow)?;
        Ok(repaid)
    }

    /// Repays part of `borrower`'s debt in `borrowed_market` and seizes
    /// incentive-scaled collateral receipt tokens from `collateral_market`.
    pub fn liquidate_borrow(
        &mut self,
        liquidator: Pubkey,
        borrower: Pubkey,
        borrowed_market: Pubkey,
        repay_amount: u128,
        collateral_market: Pubkey,
    ) -> Result<SeizeSplit> {
        require_keys_neq!(liquidator, borrower, MarketError::LiquidatorIsBorrower);
        require!(
            repay_amount > 0 && repay_amount != REPAY_MAX,
            MarketError::InvalidAmount
        );
        self.comptroller.require_listed(&borrowed_market)?;
        self.comptroller.require_listed(&collateral_market)?;

        let same_market = borrowed_market == collateral_market;
        let mut borrowed = self.stage_market(&borrowed_market)?;
        let mut collateral = if same_market {
            None
        } else {
            Some(self.stage_market(&collateral_market)?)
        };

        let membership = self.membership_or_new(&borrower);
        let mut staged_view = vec![&borrowed.market];
        if let Some(collateral) = &collateral {
            staged_view.push(&collateral.market);
        }
        self.comptroller.liquidate_borrow_allowed(
            &borrowed_market,
            &collateral_market,
            &borrower,
            repay_amount,
            &membership,
            &self.view(staged_view),
            &self.oracle,
        )?;

        let repay_asset = borrowed.market.underlying;
        let mut borrower_debt = self.position_or_new(&borrowed_market, &borrower);
        let repaid = Self::apply_repay(&mut borrowed.market, &mut borrower_debt, repay_amount)?;

        let collateral_ledger = match collateral.as_mut() {
            Some(staged) => &mut staged.market,
            None => &mut borrowed.market,
        };
        let exchange_rate = collateral_ledger.exchange_rate_stored()?;
        let seize_tokens = self.comptroller.liquidate_calculate_seize_tokens(
            &borrowed_market,
            &collateral_market,
            repaid,
            exchange_rate,
            &self.oracle,
        )?;
        self.comptroller
            .seize_allowed(&collateral_market, &borrowed_market, &liquidator, &borrower)?;

        let mut borrower_collateral = if same_market {
            None
        } else {
            Some(self.position_or_new(&collateral_market, &borrower))
        };
        let seized_from = borrower_collateral.as_mut().unwrap_or(&mut borrower_debt);
        require!(
            seized_from.receipt_balance >= seize_tokens,
            MarketError::TooMuchRepay
        );
        let split = liquidation::split_seized(
            seize_tokens,
            self.comptroller.protocol_seize_share,
            exchange_rate,
        )?;
        seized_from.receipt_balance -= seize_tokens;

        let mut liquidator_position = self.position_or_new(&collateral_market, &liquidator);
        liquidator_position.receipt_balance = liquidator_position
            .receipt_balance
            .checked_add(split.liquidator_tokens)
            .ok_or(MarketError::MathOverflow)?;
        collateral_ledger.total_supply = collateral_ledger
            .total_supply
            .checked_sub(split.protocol_tokens)
            .ok_or(MarketError::MathOverflow)?;
        collateral_ledger.total_reserves = collateral_ledger
            .total_reserves
            .checked_add(split.protocol_amount)
            .ok_or(MarketError::MathOverflow)?;

        self.tokens.transfer_from(
            &repay_asset,
            &borrowed_market,
            &liquidator,
            &borrowed_market,
            repaid,
        )?;

        self.positions.insert((borrowed_market, borrower), borrower_debt);
        if let Some(position) = borrower_collateral {
            self.positions.insert((collateral_market, borrower), position);
        }
        self.positions
            .insert((collateral_market, liquidator), liquidator_position);
        self.commit_market(borrowed);
        if let Some(staged) = collateral {
            self.commit_market(staged);
        }

        msg!(
            "✅ Liquidation: {} repaid {} for {}, seized {} ({} to reserves)",
            liquidator,
            repaid,
            borrower,
            split.seize_tokens,
            split.protocol_tokens
        );
        emit!(events::LiquidateBorrow {
            liquidator,
            borrower,
            repay_amount: repaid,
            borrowed_market,
            collateral_market,
            seize_tokens: split.seize_tokens,
            protocol_tokens: split.protocol_tokens,
            block: self.current_block,
        });

        Ok(split)
    }

    /// Moves receipt tokens between accounts, subject to the sender staying solvent.
    pub fn transfer(&mut self, market_id: Pubkey, src: Pubkey, dst: Pubkey, tokens: u128) -> Result<()> {
        require!(tokens > 0, MarketError::InvalidAmount);
        require_keys_neq!(src, dst, MarketError::InvalidAmount);

        let mut src_position = self.position_or_new(&market_id, &src);
        require!(
            src_position.receipt_balance >= tokens,
            MarketError::InsufficientBalance
        );
        let membership = self.membership_or_new(&src);
        self.comptroller.transfer_allowed(
            &market_id,
            &src,
            tokens,
            &membership,
            &self.view(Vec::new()),
            &self.oracle,
        )?;

        let mut dst_position = self.position_or_new(&market_id, &dst);
        dst_position.receipt_balance = dst_position
            .receipt_balance
            .checked_add(tokens)
            .ok_or(MarketError::MathOverflow)?;
        src_position.receipt_balance -= tokens;

        self.positions.insert((market_id, src), src_position);
        self.positions.insert((market_id, dst), dst_position);
        emit!(events::ReceiptTransfer {
            market: market_id,
            from: src,
            to: dst,
            tokens,
        });

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Market views
    // ---------------------------------------------------------------------

    pub fn get_cash(&self, market_id: &Pubkey) -> Result<u128> {
        Ok(self.market(market_id)?.cash)
    }

    pub fn exchange_rate_stored(&self, market_id: &Pubkey) -> Result<Exp> {
        self.market(market_id)?.exchange_rate_stored()
    }

    pub fn exchange_rate_current(&mut self, market_id: &Pubkey) -> Result<Exp> {
        self.accrue_interest(market_id)?;
        self.exchange_rate_stored(market_id)
    }

    pub fn borrow_balance_stored(&self, market_id: &Pubkey, account: &Pubkey) -> Result<u128> {
        Ok(self.account_snapshot(market_id, account)?.borrow_balance)
    }

    pub fn borrow_balance_current(&mut self, market_id: &Pubkey, account: &Pubkey) -> Result<u128> {
        self.accrue_interest(market_id)?;
        self.borrow_balance_stored(market_id, account)
    }

    pub fn balance_of_underlying(&mut self, market_id: &Pubkey, owner: &Pubkey) -> Result<u128> {
        let exchange_rate = self.exchange_rate_current(market_id)?;
        exchange_rate
            .mul_scalar(self.receipt_balance(market_id, owner), Rounding::Down)
            .ok_or_else(|| error!(MarketError::MathOverflow))
    }

    pub fn borrow_rate_per_block(&self, market_id: &Pubkey) -> Result<Exp> {
        self.market(market_id)?.borrow_rate_per_block()
    }

    pub fn supply_rate_per_block(&self, market_id: &Pubkey) -> Result<Exp> {
        self.market(market_id)?.supply_rate_per_block()
    }

    pub fn get_account_snapshot(&self, market_id: &Pubkey, account: &Pubkey) -> Result<AccountSnapshot> {
        self.account_snapshot(market_id, account)
    }

    // ---------------------------------------------------------------------
    // Risk controller
    // ---------------------------------------------------------------------

    pub fn enter_markets(&mut self, account: Pubkey, markets: &[Pubkey]) -> Result<()> {
        let mut membership = self.membership_or_new(&account);
        let mut entered = Vec::new();
        for market in markets {
            self.comptroller.require_listed(market)?;
            if membership.enter(*market)? {
                entered.push(*market);
            }
        }

        self.memberships.insert(account, membership);
        for market in entered {
            msg!("✅ {} entered market {}", account, market);
            emit!(events::MarketEntered { market, account });
        }
        Ok(())
    }

    /// No-op for a market the account never entered.
    pub fn exit_market(&mut self, account: Pubkey, market_id: Pubkey) -> Result<()> {
        let mut membership = self.membership_or_new(&account);
        if !membership.contains(&market_id) {
            return Ok(());
        }

        let snapshot = self.account_snapshot(&market_id, &account)?;
        require!(snapshot.borrow_balance == 0, MarketError::NonzeroBorrowBalance);
        self.comptroller.redeem_allowed(
            &market_id,
            &account,
            snapshot.receipt_balance,
            &membership,
            &self.view(Vec::new()),
            &self.oracle,
        )?;

        membership.exit(&market_id);
        self.memberships.insert(account, membership);
        msg!("✅ {} exited market {}", account, market_id);
        emit!(events::MarketExited {
            market: market_id,
            account,
        });
        Ok(())
    }

    pub fn get_assets_in(&self, account: &Pubkey) -> Vec<Pubkey> {
        self.membership(account)
            .map(|membership| membership.markets.clone())
            .unwrap_or_default()
    }

    pub fn check_membership(&self, account: &Pubkey, market_id: &Pubkey) -> bool {
        self.membership(account)
            .map(|membership| membership.contains(market_id))
            .unwrap_or(false)
    }

    /// Liquidity against stored market state.
    pub fn get_account_liquidity(&self, account: &Pubkey) -> Result<AccountLiquidity> {
        self.get_hypothetical_account_liquidity(account, LiquidityDelta::None)
    }

    pub fn get_hypothetical_account_liquidity(&self, account: &Pubkey, delta: LiquidityDelta) -> Result<AccountLiquidity> {
        let membership = self.membership_or_new(account);
        self.comptroller.hypothetical_account_liquidity(
            account,
            &membership,
            &self.view(Vec::new()),
            &self.oracle,
            delta,
        )
    }

    /// Collateral tokens a liquidation repaying `repay_amount` would seize, at stored rates.
    pub fn liquidate_calculate_seize_tokens(
        &self,
        borrowed_market: &Pubkey,
        collateral_market: &Pubkey,
        repay_amount: u128,
    ) -> Result<u128> {
        self.comptroller.require_listed(borrowed_market)?;
        self.comptroller.require_listed(collateral_market)?;
        let exchange_rate = self.exchange_rate_stored(collateral_market)?;
        self.comptroller.liquidate_calculate_seize_tokens(
            borrowed_market,
            collateral_market,
            repay_amount,
            exchange_rate,
            &self.oracle,
        )
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    /// Lists a market for `underlying` with a zero collateral factor and
    /// returns its id.
    pub fn support_market(
        &mut self,
        admin: Pubkey,
        underlying: Pubkey,
        rate_model: RateModel,
        initial_exchange_rate: Exp,
        reserve_factor: Exp,
    ) -> Result<Pubkey> {
        self.comptroller.require_admin(&admin)?;
        let id = Market::address(&underlying);
        require!(
            !self.comptroller.is_listed(&id),
            MarketError::MarketAlreadyListed
        );
        require!(!initial_exchange_rate.is_zero(), MarketError::InvalidConfig);
        require!(reserve_factor <= Exp::ONE, MarketError::InvalidReserveFactor);
        require!(
            self.comptroller.markets.len() < Comptroller::MAX_MARKETS,
            MarketError::TooManyMarkets
        );

        self.comptroller.markets.push(MarketListing {
            market: id,
            collateral_factor: Exp::ZERO,
            is_listed: true,
        });
        self.markets.insert(
            id,
            Market::new(
                underlying,
                rate_model,
                initial_exchange_rate,
                reserve_factor,
                self.current_block,
            ),
        );
        msg!("✅ Market {} listed for underlying {}", id, underlying);
        emit!(events::MarketListed {
            market: id,
            underlying,
        });

        Ok(id)
    }

    /// A nonzero factor needs a live oracle price for the market.
    pub fn set_collateral_factor(&mut self, admin: Pubkey, market_id: Pubkey, collateral_factor: Exp) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        self.comptroller.require_listed(&market_id)?;
        require!(
            collateral_factor <= Exp::ONE,
            MarketError::InvalidCollateralFactor
        );
        if !collateral_factor.is_zero() {
            risk::price_of(&self.oracle, &market_id)?;
        }

        let listing = self.comptroller.listing_mut(&market_id)?;
        let old = listing.collateral_factor;
        listing.collateral_factor = collateral_factor;
        self.log_parameter_change(RiskParameter::CollateralFactor, market_id, old, collateral_factor);
        Ok(())
    }

    pub fn set_close_factor(&mut self, admin: Pubkey, close_factor: Exp) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        require!(
            !close_factor.is_zero() && close_factor <= Exp::ONE,
            MarketError::InvalidCloseFactor
        );
        let old = self.comptroller.close_factor;
        self.comptroller.close_factor = close_factor;
        self.log_parameter_change(RiskParameter::CloseFactor, Pubkey::default(), old, close_factor);
        Ok(())
    }

    pub fn set_liquidation_incentive(&mut self, admin: Pubkey, incentive: Exp) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        require!(
            incentive >= Exp::ONE,
            MarketError::InvalidLiquidationIncentive
        );
        let old = self.comptroller.liquidation_incentive;
        self.comptroller.liquidation_incentive = incentive;
        self.log_parameter_change(RiskParameter::LiquidationIncentive, Pubkey::default(), old, incentive);
        Ok(())
    }

    pub fn set_protocol_seize_share(&mut self, admin: Pubkey, share: Exp) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        require!(share <= Exp::ONE, MarketError::InvalidSeizeShare);
        let old = self.comptroller.protocol_seize_share;
        self.comptroller.protocol_seize_share = share;
        self.log_parameter_change(RiskParameter::ProtocolSeizeShare, Pubkey::default(), old, share);
        Ok(())
    }

    /// Replaces the price source. Returns the previous one.
    pub fn set_price_oracle(&mut self, admin: Pubkey, oracle_address: Pubkey, oracle: O) -> Result<O> {
        self.comptroller.require_admin(&admin)?;
        let old_oracle = self.comptroller.oracle;
        self.comptroller.oracle = oracle_address;
        let previous = std::mem::replace(&mut self.oracle, oracle);
        msg!("✅ Price oracle changed from {} to {}", old_oracle, oracle_address);
        emit!(events::NewPriceOracle {
            old_oracle,
            new_oracle: oracle_address,
        });
        Ok(previous)
    }

    pub fn set_reserve_factor(&mut self, admin: Pubkey, market_id: Pubkey, reserve_factor: Exp) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        require!(reserve_factor <= Exp::ONE, MarketError::InvalidReserveFactor);

        let mut staged = self.stage_market(&market_id)?;
        let old = staged.market.reserve_factor;
        staged.market.reserve_factor = reserve_factor;
        self.commit_market(staged);
        self.log_parameter_change(RiskParameter::ReserveFactor, market_id, old, reserve_factor);
        Ok(())
    }

    /// Interest up to the current block accrues under the old model.
    pub fn set_interest_rate_model(&mut self, admin: Pubkey, market_id: Pubkey, model: RateModel) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        let mut staged = self.stage_market(&market_id)?;
        staged.market.rate_model = model;
        self.commit_market(staged);
        msg!("✅ Interest rate model updated for {}", market_id);
        emit!(events::NewRateModel {
            market: market_id,
            model,
        });
        Ok(())
    }

    /// Pays `amount` of reserves out to the admin.
    pub fn reduce_reserves(&mut self, admin: Pubkey, market_id: Pubkey, amount: u128) -> Result<()> {
        self.comptroller.require_admin(&admin)?;
        require!(amount > 0, MarketError::InvalidAmount);

        let mut staged = self.stage_market(&market_id)?;
        let market = &mut staged.market;
        require!(market.cash >= amount, MarketError::InsufficientCash);
        require!(
            market.total_reserves >= amount,
            MarketError::InsufficientReserves
        );
        market.total_reserves -= amount;
        market.cash -= amount;
        let total_reserves = market.total_reserves;
        let underlying = market.underlying;

        self.tokens.transfer(&underlying, &market_id, &admin, amount)?;

        self.commit_market(staged);
        msg!("✅ Reserves reduced by {} in {}", amount, market_id);
        emit!(events::ReservesChanged {
            market: market_id,
            account: admin,
            added: 0,
            reduced: amount,
            total_reserves,
            block: self.current_block,
        });
        Ok(())
    }

    pub fn add_reserves(&mut self, payer: Pubkey, market_id: Pubkey, amount: u128) -> Result<()> {
        require!(amount > 0, MarketError::InvalidAmount);
        self.comptroller.require_listed(&market_id)?;

        let mut staged = self.stage_market(&market_id)?;
        let market = &mut staged.market;
        market.total_reserves = market
            .total_reserves
            .checked_add(amount)
            .ok_or(MarketError::MathOverflow)?;
        market.cash = market
            .cash
            .checked_add(amount)
            .ok_or(MarketError::MathOverflow)?;
        let total_reserves = market.total_reserves;
        let underlying = market.underlying;

        self.tokens
            .transfer_from(&underlying, &market_id, &payer, &market_id, amount)?;

        self.commit_market(staged);
        emit!(events::ReservesChanged {
            market: market_id,
            account: payer,
            added: amount,
            reduced: 0,
            total_reserves,
            block: self.current_block,
        });
        Ok(())
    }

    fn log_parameter_change(&self, parameter: RiskParameter, market: Pubkey, old: Exp, new: Exp) {
        msg!("✅ {:?} changed from {} to {}", parameter, old, new);
        emit!(events::RiskParameterChanged {
            parameter,
            market,
            old_mantissa: old.mantissa,
            new_mantissa: new.mantissa,
        });
    }
}
