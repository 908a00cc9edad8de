//! Swapper positions
//!
//! A Swapper borrows liquidity over a contiguous bin range on one side of
//! the price and posts backing for it. Per-bin `owed`, `lent` and the
//! `owe_limit` are inflated units fixed at origination; `minted` is the
//! capacity high-water mark each bin has shown while the position was
//! borrowing and is never rolled back.
//!
//! - [`origination`]: pricing and creating a position (`new_loan`).
//! - [`lifecycle`]: backing, validation, the borrow/flow bookkeeping and
//!   `reflow`, `reset`, `unwind`.

pub mod lifecycle;
pub mod origination;

pub use lifecycle::SwapperView;
pub use origination::LoanRequest;

use crate::math::{sqrt, Bin, PriceGrid};
use crate::types::{AccountId, Era, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tidal_config::TOKENS;

/// Expiry sentinel of an unwound position, permanently in the past
pub const UNWOUND: Era = Era::MIN;

/// Transitional period during which `token_mix` is a fixed amount of `token`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Twap {
    pub until: Era,
    pub token: Token,
}

/// Entry scheduled by `flow(enable)`, kept for exact reversal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) enum FlowEntry {
    /// Inflated capacity expiring at the deadline
    Expire {
        token: Token,
        amount: Decimal,
        deadline: Option<Era>,
    },
    /// Present-value lump due at an era
    Lump { token: Token, era: Era, amount: Decimal },
    /// Per-day rate over `[from, until)`
    Rate {
        lend: Token,
        token: Token,
        from: Era,
        until: Era,
        rate: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapperPosition {
    pub owner: AccountId,
    pub start_bin: Bin,
    pub strike_bin: Bin,
    pub lend_token: Token,
    /// Token1 share of exposure, or the fixed `twap.token` amount while a
    /// TWAP is active
    pub token_mix: Decimal,
    pub twap: Option<Twap>,
    pub unlock_era: Era,
    pub dead_era: Option<Era>,
    pub owe_limit: Decimal,
    pub lent_capacity: [Decimal; TOKENS],
    pub owed: Vec<Decimal>,
    pub lent: Vec<Decimal>,
    pub minted: Vec<Decimal>,
    /// Lend-fee growth checkpoint, `Σ lent_i · growth_i`
    pub fee_past: [Decimal; TOKENS],
    /// Lend fees realized but not yet paid out
    pub fees_due: [Decimal; TOKENS],
    pub(crate) flows: Vec<FlowEntry>,
}

impl SwapperPosition {
    pub fn stop_bin(&self) -> Bin {
        self.start_bin + self.owed.len() as Bin
    }

    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        (0..self.owed.len()).map(move |i| self.start_bin + i as Bin)
    }

    pub fn is_unwound(&self) -> bool {
        self.dead_era == Some(UNWOUND)
    }

    pub fn is_expired(&self, era: Era) -> bool {
        matches!(self.dead_era, Some(dead) if dead <= era)
    }

    /// Active TWAP as of `era`
    pub fn twap_active(&self, era: Era) -> Option<Twap> {
        self.twap.filter(|twap| era < twap.until)
    }

    /// `sqrt(Σ owed_i/√K_i · Σ owed_i·√K_i)`
    pub fn derive_owe_limit(grid: &PriceGrid, start_bin: Bin, owed: &[Decimal]) -> Decimal {
        let mut over = Decimal::ZERO;
        let mut under = Decimal::ZERO;
        for (i, owed) in owed.iter().enumerate() {
            let root = grid.sqrt_strike(start_bin + i as Bin);
            over += *owed / root;
            under += *owed * root;
        }
        sqrt(over * under)
    }

    /// Multiply every inflated store by `factor`
    pub(crate) fn rescale(&mut self, grid: &PriceGrid, factor: Decimal) {
        for value in self.owed.iter_mut().chain(self.lent.iter_mut()) {
            *value *= factor;
        }
        for capacity in self.lent_capacity.iter_mut() {
            *capacity *= factor;
        }
        self.owe_limit = Self::derive_owe_limit(grid, self.start_bin, &self.owed);
        for entry in self.flows.iter_mut() {
            if let FlowEntry::Expire { amount, .. } = entry {
                *amount *= factor;
            }
        }
    }
}
