//! Structured pool events
//!
//! Every state-mutating entry point appends one event to the pool log and
//! mirrors it to `tracing`. An external indexer drains the log with
//! [`crate::Pool::take_events`].

use crate::liquidity::Stage;
use crate::quantity::Quantity;
use crate::types::{AccountId, Deltas, Era, LpId, SwapperId, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    Poured {
        lp: LpId,
        owner: AccountId,
        start_tub: i64,
        stop_tub: i64,
        liquidity: Decimal,
        stage: Stage,
        deltas: Deltas,
    },
    Drained {
        lp: LpId,
        deltas: Deltas,
    },
    Collected {
        lp: LpId,
        deltas: Deltas,
    },
    Tapped {
        lp: LpId,
    },
    Swapped {
        caller: AccountId,
        token: Token,
        shove: Quantity,
        tick_bin: i64,
        bin_frac: Decimal,
        deltas: Deltas,
    },
    LoanCreated {
        swapper: SwapperId,
        owner: AccountId,
        lend_token: Token,
        start_bin: i64,
        strike_bin: i64,
        deltas: Deltas,
    },
    Reflowed {
        swapper: SwapperId,
        deltas: Deltas,
    },
    Reset {
        swapper: SwapperId,
        deltas: Deltas,
    },
    Unwound {
        swapper: SwapperId,
        deltas: Deltas,
    },
    SwapperCreationEnabled,
    Advanced {
        era: Era,
        deflator: Decimal,
    },
    Rebased {
        factor: Decimal,
    },
}

impl PoolEvent {
    /// Net caller deltas carried by the event, zero for bookkeeping events
    pub fn deltas(&self) -> Deltas {
        match self {
            PoolEvent::Poured { deltas, .. }
            | PoolEvent::Drained { deltas, .. }
            | PoolEvent::Collected { deltas, .. }
            | PoolEvent::Swapped { deltas, .. }
            | PoolEvent::LoanCreated { deltas, .. }
            | PoolEvent::Reflowed { deltas, .. }
            | PoolEvent::Reset { deltas, .. }
            | PoolEvent::Unwound { deltas, .. } => *deltas,
            _ => Deltas::ZERO,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Poured { .. } => "poured",
            PoolEvent::Drained { .. } => "drained",
            PoolEvent::Collected { .. } => "collected",
            PoolEvent::Tapped { .. } => "tapped",
            PoolEvent::Swapped { .. } => "swapped",
            PoolEvent::LoanCreated { .. } => "loan_created",
            PoolEvent::Reflowed { .. } => "reflowed",
            PoolEvent::Reset { .. } => "reset",
            PoolEvent::Unwound { .. } => "unwound",
            PoolEvent::SwapperCreationEnabled => "swapper_creation_enabled",
            PoolEvent::Advanced { .. } => "advanced",
            PoolEvent::Rebased { .. } => "rebased",
        }
    }
}
