//! Settlement
//!
//! Converts decimal deltas into external integer token amounts and moves
//! them through a [`TokenLedger`]. Every amount is `ceil(Δ · 10^decimals)`:
//! callers round up what they owe and round down what they receive.
//!
//! Payouts are made first. Pay-ins are either pulled directly from the
//! caller or sourced by a [`SettlementCallback`], in which case the pool's
//! balance increase must match the expected amount exactly.

use crate::error::{EngineError, Result};
use crate::pool::Pool;
use crate::types::{AccountId, Deltas, Token};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tidal_config::TOKENS;
use tracing::debug;

/// Custody collaborator: balances per account and token
pub trait TokenLedger {
    fn balance(&self, account: AccountId, token: Token) -> i128;

    fn transfer(&mut self, from: AccountId, to: AccountId, token: Token, amount: i128) -> Result<()>;
}

/// External payer invoked during callback settlement
pub trait SettlementCallback {
    /// Asked to deliver `owed` (integer amounts, positive = due to the pool)
    /// into `pool`'s balance
    fn on_settle(
        &mut self,
        ledger: &mut dyn TokenLedger,
        pool: AccountId,
        owed: [i128; TOKENS],
        data: &[u8],
    ) -> Result<()>;
}

/// How the caller pays what it owes
pub enum Payment<'a> {
    /// Pull from the caller's own balance
    Direct,
    /// Let `payer` source the funds, then verify the balance change
    Callback {
        payer: &'a mut dyn SettlementCallback,
        data: Vec<u8>,
    },
}

/// In-memory [`TokenLedger`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryLedger {
    balances: HashMap<(AccountId, Token), i128>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air
    pub fn mint(&mut self, account: AccountId, token: Token, amount: i128) {
        *self.balances.entry((account, token)).or_default() += amount;
    }
}

impl TokenLedger for MemoryLedger {
    fn balance(&self, account: AccountId, token: Token) -> i128 {
        self.balances.get(&(account, token)).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: AccountId, to: AccountId, token: Token, amount: i128) -> Result<()> {
        if amount <= 0 {
            return Ok(());
        }
        let available = self.balance(from, token);
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                token,
                needed: amount,
                available,
            });
        }
        *self.balances.entry((from, token)).or_default() -= amount;
        *self.balances.entry((to, token)).or_default() += amount;
        Ok(())
    }
}

/// `ceil(delta · 10^decimals)`
pub fn to_amount(delta: Decimal, decimals: u8) -> Result<i128> {
    let scale = 10i128
        .checked_pow(decimals as u32)
        .and_then(|scale| Decimal::try_from_i128_with_scale(scale, 0).ok())
        .ok_or(EngineError::Overflow { context: "settlement scale" })?;
    delta
        .checked_mul(scale)
        .ok_or(EngineError::Overflow { context: "settlement amount" })?
        .ceil()
        .to_i128()
        .ok_or(EngineError::Overflow { context: "settlement amount" })
}

/// Integer amounts for both tokens
pub fn to_amounts(deltas: Deltas, decimals: [u8; TOKENS]) -> Result<[i128; TOKENS]> {
    Ok([
        to_amount(deltas.token0, decimals[0])?,
        to_amount(deltas.token1, decimals[1])?,
    ])
}

/// Moves settled amounts between a caller and a pool account
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub pool_account: AccountId,
    pub decimals: [u8; TOKENS],
}

impl Settlement {
    pub fn new(pool_account: AccountId, decimals: [u8; TOKENS]) -> Self {
        Self {
            pool_account,
            decimals,
        }
    }

    /// Settle `deltas` for `caller`; the ledger is untouched on failure
    pub fn settle<L: TokenLedger + Clone>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        deltas: Deltas,
        payment: Payment<'_>,
    ) -> Result<[i128; TOKENS]> {
        let backup = ledger.clone();
        let result = self.settle_inner(ledger, caller, deltas, payment);
        if result.is_err() {
            *ledger = backup;
        }
        result
    }

    fn settle_inner<L: TokenLedger>(
        &self,
        ledger: &mut L,
        caller: AccountId,
        deltas: Deltas,
        payment: Payment<'_>,
    ) -> Result<[i128; TOKENS]> {
        let amounts = to_amounts(deltas, self.decimals)?;
        debug!(caller = %caller, ?amounts, "Settling");

        for token in Token::BOTH {
            let amount = amounts[token.index()];
            if amount < 0 {
                ledger.transfer(self.pool_account, caller, token, -amount)?;
            }
        }

        let owed = amounts.map(|amount| amount.max(0));
        if owed.iter().all(|amount| *amount == 0) {
            return Ok(amounts);
        }

        match payment {
            Payment::Direct => {
                for token in Token::BOTH {
                    ledger.transfer(caller, self.pool_account, token, owed[token.index()])?;
                }
            }
            Payment::Callback { payer, data } => {
                let before = Token::BOTH.map(|token| ledger.balance(self.pool_account, token));
                payer.on_settle(ledger, self.pool_account, owed, &data)?;
                for token in Token::BOTH {
                    let received = ledger.balance(self.pool_account, token) - before[token.index()];
                    if received != owed[token.index()] {
                        return Err(EngineError::PaymentMismatch {
                            token,
                            expected: owed[token.index()],
                            received,
                        });
                    }
                }
            }
        }
        Ok(amounts)
    }
}

impl Pool {
    /// Run an operation and settle its deltas as one unit: if settlement
    /// fails the pool state is restored as well
    pub fn settled<L, T>(
        &mut self,
        settlement: &Settlement,
        ledger: &mut L,
        caller: AccountId,
        payment: Payment<'_>,
        op: impl FnOnce(&mut Pool) -> Result<(T, Deltas)>,
    ) -> Result<(T, [i128; TOKENS])>
    where
        L: TokenLedger + Clone,
    {
        self.transact(|pool| {
            let (value, deltas) = op(pool)?;
            let amounts = settlement.settle(ledger, caller, deltas, payment)?;
            Ok((value, amounts))
        })
    }

    /// Settlement bound to this pool's decimals
    pub fn settlement(&self, pool_account: AccountId) -> Settlement {
        Settlement::new(pool_account, self.params.decimals)
    }
}
