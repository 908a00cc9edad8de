//! Range and deadline accumulators
//!
//! Every pool total that varies by bin or by time is one of these:
//!
//! - [`RangeTree`]: range-additive per-bin values with point and range-sum
//!   queries (`minted`, fee growth, staged and draining liquidity).
//! - [`DeadlineTree`]: a `RangeTree` whose entries reverse themselves at a
//!   deadline era (`lent`, `used`, `owed`).
//! - [`DeadlineLedger`]: the scalar counterpart (`expire`).
//! - [`FlowSchedule`] / [`RateSchedule`]: future token lumps and rates that
//!   mature as the clock advances (`flow_hat`, `flow_dot`).
//!
//! Deadline entries are settled lazily. Queries reflect every deadline at or
//! before the queried era whether or not it has been flushed.

mod deadline;
mod range_tree;
mod schedule;

pub use deadline::{DeadlineLedger, DeadlineTree};
pub use range_tree::RangeTree;
pub use schedule::{FlowSchedule, RateSchedule};

use crate::math::Bin;
use crate::types::Era;
use rust_decimal::Decimal;

/// Per-bin totals added over contiguous ranges
pub trait RangeAccumulator {
    /// Add `delta` to every bin in `[start, stop)`
    fn add_range(&mut self, start: Bin, stop: Bin, delta: Decimal);

    /// Value at one bin ("fluid at")
    fn at(&self, bin: Bin) -> Decimal;

    /// Sum of values over `[start, stop)`
    fn sum(&self, start: Bin, stop: Bin) -> Decimal;
}

/// Per-bin totals whose entries expire at a deadline
pub trait DeadlineAccumulator {
    /// Add `delta` over `[start, stop)` now, reversing at `deadline`.
    /// `None` never expires; a deadline at or before `now` adds nothing.
    fn create_one(&mut self, now: Era, start: Bin, stop: Bin, delta: Decimal, deadline: Option<Era>);

    /// Value at `bin` as of `era`
    fn now_at(&self, era: Era, bin: Bin) -> Decimal;

    /// Sum over `[start, stop)` as of `era`
    fn sum_at(&self, era: Era, start: Bin, stop: Bin) -> Decimal;

    /// Materialize every reversal due at or before `era`
    fn flush(&mut self, era: Era);
}

/// Stores holding inflated units, rescaled when the deflator rebases
pub trait Rescale {
    fn rescale(&mut self, factor: Decimal);
}
