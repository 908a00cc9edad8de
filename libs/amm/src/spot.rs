//! Spot swap engine
//!
//! Walks bins from the current price. Within a bin the available liquidity
//! `k = (capacity − lent)·ε` moves the sqrt price `s` as
//!
//! - up, token1 in:    `s' = s + Δ1/k`
//! - up, token0 out:   `1/s' = 1/s − Δ0/k`
//! - down, token0 in:  `1/s' = 1/s + Δ0/k`
//! - down, token1 out: `s' = s − Δ1/k`
//!
//! The spot fee is charged on top of the input and split by utilization
//! between earning LPs and lenders.

use crate::accumulators::{DeadlineAccumulator, RangeAccumulator};
use crate::error::{EngineError, Result};
use crate::events::PoolEvent;
use crate::math::{sqrt, Bin};
use crate::pool::Pool;
use crate::quantity::Quantity;
use crate::types::{AccountId, Deltas, Token};
use rust_decimal::Decimal;
use tracing::debug;

/// Outcome of one in-bin step
#[derive(Debug, Clone, Copy)]
struct Step {
    sqrt_price: Decimal,
    input: Decimal,
    output: Decimal,
    reached_bound: bool,
}

impl Pool {
    /// Trade against the curve.
    ///
    /// `shove > 0`: the caller pays exactly that much of `token`.
    /// `shove < 0`: the caller receives exactly that much of `token`.
    /// Unbounded shoves run until `limit_price` or the edge of the grid.
    pub fn swap(
        &mut self,
        caller: AccountId,
        token: Token,
        shove: Quantity,
        limit_price: Option<Decimal>,
    ) -> Result<Deltas> {
        self.transact(|pool| {
            let shove = shove.defined("shove")?;
            if let Some(price) = limit_price {
                if price <= Decimal::ZERO {
                    return Err(EngineError::InvalidLimitPrice { price });
                }
            }
            let deltas = if shove.is_zero() {
                Deltas::ZERO
            } else {
                pool.walk(token, shove, limit_price.map(sqrt))
            };
            pool.emit(PoolEvent::Swapped {
                caller,
                token,
                shove,
                tick_bin: pool.tick_bin,
                bin_frac: pool.bin_frac,
                deltas,
            });
            Ok(deltas)
        })
    }

    fn walk(&mut self, token: Token, shove: Quantity, limit_sqrt: Option<Decimal>) -> Deltas {
        let exact_in = shove.is_positive();
        let up = match token {
            Token::Zero => !exact_in,
            Token::One => exact_in,
        };
        let (token_in, token_out) = if up {
            (Token::One, Token::Zero)
        } else {
            (Token::Zero, Token::One)
        };
        let mut remaining = shove.magnitude();
        let fee_rate = self.params.spot_fee;
        let era = self.clock.era();
        self.flush(era);

        let mut deltas = Deltas::ZERO;
        let max_steps = 2 * self.grid.bins() + 8;
        for _ in 0..max_steps {
            if remaining.is_some_and(|r| r <= Decimal::ZERO) {
                break;
            }
            let s = self.sqrt_price();
            let edge = if up {
                self.grid.upper_sqrt(self.tick_bin)
            } else {
                self.grid.lower_sqrt(self.tick_bin)
            };

            // cross into the neighbouring bin once the edge is reached
            let at_edge = if up {
                self.bin_frac >= Decimal::ONE || s >= edge
            } else {
                self.bin_frac <= Decimal::ZERO || s <= edge
            };
            if at_edge {
                if !self.cross(up) {
                    break;
                }
                continue;
            }

            let bound = match limit_sqrt {
                Some(limit) if up => edge.min(limit),
                Some(limit) => edge.max(limit),
                None => edge,
            };
            if (up && s >= bound) || (!up && s <= bound) {
                break;
            }

            let k = self.available(self.tick_bin) * self.params.epsilon;
            let step = Self::step(s, bound, k, up, exact_in, remaining, fee_rate);
            let fee = step.input * fee_rate;

            if let Some(rem) = remaining.as_mut() {
                if exact_in {
                    *rem -= step.input + fee;
                } else {
                    *rem -= step.output;
                }
                if !step.reached_bound {
                    *rem = Decimal::ZERO;
                }
            }
            deltas += Deltas::of(token_in, step.input + fee);
            deltas += Deltas::of(token_out, -step.output);

            if fee > Decimal::ZERO {
                self.accrue_spot_fee(self.tick_bin, token_in, fee);
            }

            let old_frac = self.bin_frac;
            self.bin_frac = if step.reached_bound && step.sqrt_price == edge {
                if up {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                }
            } else {
                self.grid.frac_of(self.tick_bin, step.sqrt_price)
            };
            let moved = (self.bin_frac - old_frac) * self.grid.log_bin();
            self.variance += moved * moved;

            debug!(
                bin = self.tick_bin,
                frac = %self.bin_frac,
                input = %step.input,
                output = %step.output,
                "Swap step"
            );

            if step.reached_bound && step.sqrt_price != edge {
                break;
            }
            if step.sqrt_price == s && !step.reached_bound {
                break;
            }
        }
        deltas
    }

    /// Move to the neighbouring bin; false at the edge of the grid.
    /// Staged Join liquidity is not promoted here: it earns only once
    /// [`Pool::tap`] moves it out of `join_staged`.
    fn cross(&mut self, up: bool) -> bool {
        if up {
            if self.tick_bin + 1 >= self.grid.bins() {
                self.bin_frac = Decimal::ONE;
                return false;
            }
            self.tick_bin += 1;
            self.bin_frac = Decimal::ZERO;
        } else {
            if self.tick_bin == 0 {
                self.bin_frac = Decimal::ZERO;
                return false;
            }
            self.tick_bin -= 1;
            self.bin_frac = Decimal::ONE;
        }
        debug!(bin = self.tick_bin, "Crossed bin");
        true
    }

    /// Largest move inside one bin towards `bound`
    fn step(
        s: Decimal,
        bound: Decimal,
        k: Decimal,
        up: bool,
        exact_in: bool,
        remaining: Option<Decimal>,
        fee_rate: Decimal,
    ) -> Step {
        let to_bound = |sqrt_price: Decimal| {
            let (input, output) = Self::amounts(s, sqrt_price, k, up);
            Step {
                sqrt_price,
                input,
                output,
                reached_bound: true,
            }
        };
        if k <= Decimal::ZERO {
            return to_bound(bound);
        }
        let Some(rem) = remaining else {
            return to_bound(bound);
        };
        let (full_in, full_out) = Self::amounts(s, bound, k, up);

        let target = match (up, exact_in) {
            (true, true) => {
                let net = rem / (Decimal::ONE + fee_rate);
                if net >= full_in {
                    return to_bound(bound);
                }
                s + net / k
            }
            (true, false) => {
                if rem >= full_out {
                    return to_bound(bound);
                }
                Decimal::ONE / (Decimal::ONE / s - rem / k)
            }
            (false, true) => {
                let net = rem / (Decimal::ONE + fee_rate);
                if net >= full_in {
                    return to_bound(bound);
                }
                Decimal::ONE / (Decimal::ONE / s + net / k)
            }
            (false, false) => {
                if rem >= full_out {
                    return to_bound(bound);
                }
                s - rem / k
            }
        };
        let (input, output) = Self::amounts(s, target, k, up);
        Step {
            sqrt_price: target,
            input,
            output,
            reached_bound: false,
        }
    }

    /// `(input, output)` moving from `s` to `target`
    fn amounts(s: Decimal, target: Decimal, k: Decimal, up: bool) -> (Decimal, Decimal) {
        if up {
            (k * (target - s), k * (Decimal::ONE / s - Decimal::ONE / target))
        } else {
            (k * (Decimal::ONE / target - Decimal::ONE / s), k * (s - target))
        }
    }

    /// Split a spot fee: `1 − u` to earning liquidity, `u` to lenders
    fn accrue_spot_fee(&mut self, bin: Bin, token: Token, fee: Decimal) {
        let t = token.index();
        let utilization = self.utilization(bin);
        let lp_share = fee * (Decimal::ONE - utilization);
        let lend_share = fee - lp_share;

        let earning = self.earning(bin);
        if earning > Decimal::ZERO {
            self.fees[t].add_range(bin, bin + 1, lp_share / earning);
        } else {
            self.protocol_fees[t] += lp_share;
        }

        if lend_share > Decimal::ZERO {
            let lent = self.lent.now_at(self.clock.era(), bin);
            if lent > Decimal::ZERO {
                self.lend_fees[t].add_range(bin, bin + 1, lend_share / lent);
            } else {
                self.protocol_fees[t] += lend_share;
            }
        }
    }
}
