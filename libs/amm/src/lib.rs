//! # Tidal AMM - Concentrated Liquidity with Time-Decaying Loans
//!
//! ## Purpose
//!
//! Single-pair concentrated-liquidity market maker whose liquidity can be
//! borrowed. Liquidity Providers deposit over price ranges and earn spot
//! fees plus a share of lending fees; Swappers borrow liquidity over a range
//! of bins for a time horizon, backed by a token mix that may be scheduled to
//! change through a TWAP.
//!
//! ## Integration Points
//!
//! - **Input Sources**: entry point calls from a host (simulator, indexer, router)
//! - **Output Destinations**: signed [`Deltas`] settled through [`settlement`],
//!   and a [`PoolEvent`] log drained by [`Pool::take_events`]
//! - **Configuration**: [`tidal_config::PoolSettings`] per pool
//! - **Precision**: `rust_decimal` throughout, ceiling-rounded at settlement
//!
//! ## Architecture Role
//!
//! Every entry point is a method on [`Pool`] and runs all-or-nothing. Lending
//! state lives in inflated units against a pool-wide deflator so that decay is
//! a single multiplication; see [`math::time`].
//!
//! See [`architecture_diagram()`] for visual representation of the data flow.
//!
//! ## Usage
//!
//! ```rust
//! use tidal_amm::{dec, AccountId, Pool};
//! use tidal_config::PoolSettings;
//!
//! let mut pool = Pool::new(&PoolSettings::default()).unwrap();
//! let (_lp, deltas) = pool.pour(AccountId(1), 2040, 2056, dec!(100)).unwrap();
//! assert!(deltas.token0 > dec!(0) && deltas.token1 > dec!(0));
//! ```

pub mod accumulators;
pub mod batch;
pub mod error;
pub mod events;
pub mod liquidity;
pub mod math;
pub mod pool;
pub mod quantity;
pub mod registry;
pub mod settlement;
pub mod spot;
pub mod swapper;
pub mod types;

pub use batch::{Action, BatchOutcome, Outcome};
pub use error::{EngineError, ErrorKind, Result};
pub use events::PoolEvent;
pub use liquidity::{LpPosition, PourQuote, Stage};
pub use math::{Bin, Clock, PriceGrid};
pub use pool::{BinLiquidity, Pool, PriceInfo};
pub use quantity::Quantity;
pub use registry::{PairKey, PoolRegistry};
pub use settlement::{MemoryLedger, Payment, Settlement, SettlementCallback, TokenLedger};
pub use swapper::{LoanRequest, SwapperPosition, SwapperView, Twap};
pub use types::{AccountId, Deltas, Era, LpId, SwapperId, Token};

/// Common types for pool calculations
pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

/// Architecture diagram showing how entry points reach the pool state
#[cfg_attr(doc, aquamarine::aquamarine)]
/// ```mermaid
/// graph LR
///     subgraph Entry["Entry Points"]
///         LP[pour / drain / collect / tap]
///         SW[new_loan / reflow / reset / unwind]
///         SP[swap]
///         CL[advance]
///     end
///
///     subgraph State["Pool State"]
///         RT[Range trees]
///         DT[Deadline trees]
///         FS[Flow schedules]
///         CK[Clock + deflator]
///     end
///
///     subgraph Out["Host"]
///         DE[Deltas]
///         ST[Settlement]
///         EV[Event log]
///     end
///
///     LP --> RT
///     SW --> DT
///     SW --> FS
///     SP --> RT
///     CL --> CK
///     CK --> DT
///
///     LP --> DE
///     SW --> DE
///     SP --> DE
///     DE --> ST
///     State --> EV
///
///     style Entry fill:#e1f5fe
///     style State fill:#fff3e0
///     style Out fill:#e8f5e9
/// ```
pub fn architecture_diagram() {
    // Rendered by aquamarine in rustdoc
}
