//! Batched actions
//!
//! A batch runs several entry points for one caller as a single unit: either
//! every action succeeds and the caller settles the netted deltas once, or
//! the pool is left exactly as it was.

use crate::error::Result;
use crate::pool::Pool;
use crate::quantity::Quantity;
use crate::swapper::{LoanRequest, Twap};
use crate::types::{AccountId, Deltas, Era, LpId, SwapperId, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One entry point call inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Pour {
        start_tub: i64,
        stop_tub: i64,
        liquidity: Decimal,
    },
    Drain {
        lp: LpId,
    },
    Collect {
        lp: LpId,
    },
    Tap {
        lp: LpId,
    },
    NewLoan(LoanRequest),
    Swap {
        token: Token,
        shove: Quantity,
        #[serde(default)]
        limit_price: Option<Decimal>,
    },
    Reflow {
        swapper: SwapperId,
        token_mix: Quantity,
        #[serde(default)]
        twap: Option<Twap>,
    },
    Reset {
        swapper: SwapperId,
        dead_era: Option<Era>,
        unlock_era: Era,
    },
    Unwind {
        swapper: SwapperId,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Pour { .. } => "pour",
            Action::Drain { .. } => "drain",
            Action::Collect { .. } => "collect",
            Action::Tap { .. } => "tap",
            Action::NewLoan(_) => "new_loan",
            Action::Swap { .. } => "swap",
            Action::Reflow { .. } => "reflow",
            Action::Reset { .. } => "reset",
            Action::Unwind { .. } => "unwind",
        }
    }
}

/// Result of one action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Poured { lp: LpId, deltas: Deltas },
    Loaned { swapper: SwapperId, deltas: Deltas },
    Settled { deltas: Deltas },
}

impl Outcome {
    pub fn deltas(&self) -> Deltas {
        match self {
            Outcome::Poured { deltas, .. }
            | Outcome::Loaned { deltas, .. }
            | Outcome::Settled { deltas } => *deltas,
        }
    }
}

/// Per-action outcomes and their sum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub outcomes: Vec<Outcome>,
    pub deltas: Deltas,
}

impl Pool {
    /// Run one action
    pub fn apply(&mut self, caller: AccountId, action: &Action) -> Result<Outcome> {
        let outcome = match action {
            Action::Pour {
                start_tub,
                stop_tub,
                liquidity,
            } => {
                let (lp, deltas) = self.pour(caller, *start_tub, *stop_tub, *liquidity)?;
                Outcome::Poured { lp, deltas }
            }
            Action::Drain { lp } => Outcome::Settled {
                deltas: self.drain(caller, *lp)?,
            },
            Action::Collect { lp } => Outcome::Settled {
                deltas: self.collect(caller, *lp)?,
            },
            Action::Tap { lp } => {
                self.tap(*lp)?;
                Outcome::Settled { deltas: Deltas::ZERO }
            }
            Action::NewLoan(request) => {
                let (swapper, deltas) = self.new_loan(caller, request.clone())?;
                Outcome::Loaned { swapper, deltas }
            }
            Action::Swap {
                token,
                shove,
                limit_price,
            } => Outcome::Settled {
                deltas: self.swap(caller, *token, *shove, *limit_price)?,
            },
            Action::Reflow {
                swapper,
                token_mix,
                twap,
            } => Outcome::Settled {
                deltas: self.reflow(caller, *swapper, *token_mix, *twap)?,
            },
            Action::Reset {
                swapper,
                dead_era,
                unlock_era,
            } => Outcome::Settled {
                deltas: self.reset(caller, *swapper, *dead_era, *unlock_era)?,
            },
            Action::Unwind { swapper } => Outcome::Settled {
                deltas: self.unwind(caller, *swapper)?,
            },
        };
        Ok(outcome)
    }

    /// Run `actions` in order, all or nothing
    pub fn batch(&mut self, caller: AccountId, actions: &[Action]) -> Result<BatchOutcome> {
        self.transact(|pool| {
            let mut outcomes = Vec::with_capacity(actions.len());
            let mut deltas = Deltas::ZERO;
            for action in actions {
                let outcome = pool.apply(caller, action)?;
                deltas += outcome.deltas();
                outcomes.push(outcome);
            }
            info!(caller = %caller, actions = actions.len(), ?deltas, "Batch applied");
            Ok(BatchOutcome { outcomes, deltas })
        })
    }
}
