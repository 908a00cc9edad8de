//! LP engine: pour, drain, collect, tap
//!
//! LP ranges are expressed in tubs and stored in bins. Liquidity is uniform
//! across the range, so fee accrual is `liquidity × Δ(Σ growth)` over the
//! range and per-unit reserves telescope to closed forms at the range edges.
//!
//! Stages:
//!
//! - `Join`: staged until the next earn horizon; counted in capacity but not
//!   in the fee denominator.
//! - `Earn`: accrues spot fees.
//! - `Exit`: liquidity removed. The share that was lent out at drain time is
//!   held back as draining liquidity and shed as the loans decay.

use crate::accumulators::{DeadlineAccumulator, RangeAccumulator};
use crate::error::{EngineError, Result};
use crate::events::PoolEvent;
use crate::math::time::{decay, tail_era};
use crate::math::Bin;
use crate::pool::Pool;
use crate::types::{AccountId, Deltas, Era, LpId, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tidal_config::{TOKENS, TUBS};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Join,
    Earn,
    Exit,
}

/// Cached at drain time to settle the locked share later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainRecord {
    /// Tokens the locked share was worth at drain time
    pub locked: [Decimal; TOKENS],
    /// Tokens already shed through `collect`
    pub shed: [Decimal; TOKENS],
    pub drain_deflator: Decimal,
    pub drain_era: Era,
    pub drain_date: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpPosition {
    pub owner: AccountId,
    pub start_tub: i64,
    pub stop_tub: i64,
    pub liquidity: Decimal,
    pub stage: Stage,
    pub earn_era: Era,
    pub grow_past: [Decimal; TOKENS],
    pub drain: Option<DrainRecord>,
}

/// What a pour would cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PourQuote {
    pub stage: Stage,
    pub earn_era: Era,
    /// Tokens the liquidity holds at the current price
    pub reserves: Deltas,
    /// Anticipated yield charged on top of the reserves
    pub yield_charge: Deltas,
}

impl PourQuote {
    pub fn total(&self) -> Deltas {
        self.reserves + self.yield_charge
    }
}

impl Pool {
    /// Tokens one unit of liquidity holds over bins `[start, stop)` at the
    /// current price
    pub(crate) fn unit_reserves(&self, start: Bin, stop: Bin) -> [Decimal; TOKENS] {
        let eps = self.params.epsilon;
        let low = self.grid.lower_sqrt(start);
        let high = self.grid.lower_sqrt(stop);
        if self.tick_bin < start {
            [eps * (Decimal::ONE / low - Decimal::ONE / high), Decimal::ZERO]
        } else if self.tick_bin >= stop {
            [Decimal::ZERO, eps * (high - low)]
        } else {
            let s = self.sqrt_price();
            [eps * (Decimal::ONE / s - Decimal::ONE / high), eps * (s - low)]
        }
    }

    fn check_tubs(start_tub: i64, stop_tub: i64) -> Result<()> {
        if start_tub < 0 || start_tub >= stop_tub || stop_tub > TUBS {
            return Err(EngineError::InvalidRange {
                start: start_tub,
                stop: stop_tub,
                limit: TUBS,
            });
        }
        Ok(())
    }

    fn lp_bins(&self, lp: &LpPosition) -> (Bin, Bin) {
        (self.grid.tub_to_bin(lp.start_tub), self.grid.tub_to_bin(lp.stop_tub))
    }

    /// Fee growth summed over a bin range
    fn growth(&self, start: Bin, stop: Bin) -> [Decimal; TOKENS] {
        [self.fees[0].sum(start, stop), self.fees[1].sum(start, stop)]
    }

    /// Earning liquidity summed over a bin range
    fn earning_sum(&self, start: Bin, stop: Bin) -> Decimal {
        (self.minted.sum(start, stop) - self.join_staged.sum(start, stop)).max(Decimal::ZERO)
    }

    /// Yield fraction a joiner pays for over `[era, earn_era)`: owed value
    /// expected to decay in the range relative to the range's capacity value
    fn join_yield(&self, start: Bin, stop: Bin, earn_era: Era) -> Decimal {
        let era = self.clock.era();
        let deflator = self.clock.deflator();
        let owed = self.owed_value(start, stop);
        let capacity = self.minted.sum(start, stop) + self.draining.sum(start, stop) * deflator;
        let value = capacity * self.params.epsilon * self.grid.bin_value(start);
        if value <= Decimal::ZERO || owed <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        owed * (Decimal::ONE - decay(earn_era - era)) / value
    }

    fn owed_value(&self, start: Bin, stop: Bin) -> Decimal {
        self.owed.sum_at(self.clock.era(), start, stop) * self.clock.deflator()
    }

    /// Price a pour without mutating the pool
    pub fn get_pour_quantities(&self, start_tub: i64, stop_tub: i64, liquidity: Decimal) -> Result<PourQuote> {
        Self::check_tubs(start_tub, stop_tub)?;
        if liquidity <= Decimal::ZERO {
            return Err(EngineError::NonPositive {
                field: "liquidity",
                value: liquidity,
            });
        }
        let (start, stop) = (self.grid.tub_to_bin(start_tub), self.grid.tub_to_bin(stop_tub));
        let unit = self.unit_reserves(start, stop);
        let reserves = Deltas::from_array([unit[0] * liquidity, unit[1] * liquidity]);
        let era = self.clock.era();

        if !self.swapper_ever {
            return Ok(PourQuote {
                stage: Stage::Earn,
                earn_era: era,
                reserves,
                yield_charge: Deltas::ZERO,
            });
        }

        let earn_era = tail_era(era);
        let rate = self.join_yield(start, stop, earn_era) * decay(earn_era - era);
        Ok(PourQuote {
            stage: Stage::Join,
            earn_era,
            reserves,
            yield_charge: Deltas::from_array([reserves.token0 * rate, reserves.token1 * rate]),
        })
    }

    /// Add liquidity over tubs `[start_tub, stop_tub)`
    pub fn pour(&mut self, caller: AccountId, start_tub: i64, stop_tub: i64, liquidity: Decimal) -> Result<(LpId, Deltas)> {
        self.transact(|pool| {
            let quote = pool.get_pour_quantities(start_tub, stop_tub, liquidity)?;
            let (start, stop) = (pool.grid.tub_to_bin(start_tub), pool.grid.tub_to_bin(stop_tub));

            // the yield charge goes to the range's earning liquidity
            let earning = pool.earning_sum(start, stop);
            for token in Token::BOTH {
                let charge = quote.yield_charge.get(token);
                if charge.is_zero() {
                    continue;
                }
                if earning > Decimal::ZERO {
                    pool.fees[token.index()].add_range(start, stop, charge / earning);
                } else {
                    pool.protocol_fees[token.index()] += charge;
                }
            }

            pool.minted.add_range(start, stop, liquidity);
            let grow_past = match quote.stage {
                Stage::Join => {
                    pool.join_staged.add_range(start, stop, liquidity);
                    [Decimal::ZERO; TOKENS]
                }
                _ => pool.growth(start, stop),
            };

            let id = LpId(pool.lps.len());
            pool.lps.push(LpPosition {
                owner: caller,
                start_tub,
                stop_tub,
                liquidity,
                stage: quote.stage,
                earn_era: quote.earn_era,
                grow_past,
                drain: None,
            });

            let deltas = quote.total();
            pool.emit(PoolEvent::Poured {
                lp: id,
                owner: caller,
                start_tub,
                stop_tub,
                liquidity,
                stage: quote.stage,
                deltas,
            });
            Ok((id, deltas))
        })
    }

    fn owned_lp(&self, caller: AccountId, id: LpId) -> Result<&LpPosition> {
        let lp = self.lp(id)?;
        if lp.owner != caller {
            return Err(EngineError::NotOwner {
                caller: caller.0,
                owner: lp.owner.0,
            });
        }
        Ok(lp)
    }

    /// Join → Earn, checkpointing fee growth
    fn promote(&mut self, id: LpId) -> Result<()> {
        let lp = self.lp(id)?.clone();
        if lp.stage != Stage::Join {
            return Err(EngineError::NotJoining);
        }
        if self.clock.era() < lp.earn_era {
            return Err(EngineError::StillJoining {
                earn_era: lp.earn_era,
                era: self.clock.era(),
            });
        }
        let (start, stop) = self.lp_bins(&lp);
        self.join_staged.add_range(start, stop, -lp.liquidity);
        let grow_past = self.growth(start, stop);
        let slot = &mut self.lps[id.0];
        slot.stage = Stage::Earn;
        slot.grow_past = grow_past;
        Ok(())
    }

    /// Promote a joining position once its earn era has arrived
    pub fn tap(&mut self, id: LpId) -> Result<()> {
        self.transact(|pool| {
            pool.promote(id)?;
            pool.emit(PoolEvent::Tapped { lp: id });
            Ok(())
        })
    }

    fn accrued_fees(&self, lp: &LpPosition) -> [Decimal; TOKENS] {
        if lp.stage != Stage::Earn {
            return [Decimal::ZERO; TOKENS];
        }
        let (start, stop) = self.lp_bins(lp);
        let now = self.growth(start, stop);
        [
            lp.liquidity * (now[0] - lp.grow_past[0]),
            lp.liquidity * (now[1] - lp.grow_past[1]),
        ]
    }

    /// Remove the position's liquidity; the lent-out share stays behind as
    /// draining liquidity
    pub fn drain(&mut self, caller: AccountId, id: LpId) -> Result<Deltas> {
        self.transact(|pool| {
            let lp = pool.owned_lp(caller, id)?.clone();
            match lp.stage {
                Stage::Exit => return Err(EngineError::AlreadyDraining),
                Stage::Join => pool.promote(id)?,
                Stage::Earn => {}
            }
            let lp = pool.lps[id.0].clone();
            let era = pool.clock.era();
            pool.flush(era);

            let (start, stop) = pool.lp_bins(&lp);
            let fees = pool.accrued_fees(&lp);
            let inflator = pool.clock.inflator()?;

            let mut locked = [Decimal::ZERO; TOKENS];
            for (seg_start, seg_stop, _) in pool.lent.segments(start, stop) {
                for bin in seg_start..seg_stop {
                    let share = lp.liquidity * pool.utilization(bin);
                    if share.is_zero() {
                        continue;
                    }
                    let unit = pool.unit_reserves(bin, bin + 1);
                    locked[0] += share * unit[0];
                    locked[1] += share * unit[1];
                    pool.draining.add_range(bin, bin + 1, share * inflator);
                }
            }
            pool.minted.add_range(start, stop, -lp.liquidity);

            let unit = pool.unit_reserves(start, stop);
            let mut payout = [Decimal::ZERO; TOKENS];
            for t in 0..TOKENS {
                let free = (lp.liquidity * unit[t] - locked[t]).max(Decimal::ZERO);
                payout[t] = free + fees[t];
            }
            debug!(lp = id.0, ?locked, ?payout, "LP drained");

            let slot = &mut pool.lps[id.0];
            slot.stage = Stage::Exit;
            slot.drain = Some(DrainRecord {
                locked,
                shed: [Decimal::ZERO; TOKENS],
                drain_deflator: pool.clock.deflator(),
                drain_era: era,
                drain_date: pool.clock.date(),
            });

            let deltas = -Deltas::from_array(payout);
            pool.emit(PoolEvent::Drained { lp: id, deltas });
            Ok(deltas)
        })
    }

    /// Pay out fees (Earn) or shed locked value (Exit); nothing while joining
    pub fn collect(&mut self, caller: AccountId, id: LpId) -> Result<Deltas> {
        self.transact(|pool| {
            let lp = pool.owned_lp(caller, id)?.clone();
            let payout = match lp.stage {
                Stage::Join => [Decimal::ZERO; TOKENS],
                Stage::Earn => {
                    let fees = pool.accrued_fees(&lp);
                    let (start, stop) = pool.lp_bins(&lp);
                    pool.lps[id.0].grow_past = pool.growth(start, stop);
                    fees
                }
                Stage::Exit => {
                    let deflator = pool.clock.deflator();
                    match pool.lps[id.0].drain.as_mut() {
                        Some(drain) => {
                            let released = (Decimal::ONE - deflator / drain.drain_deflator)
                                .max(Decimal::ZERO)
                                .min(Decimal::ONE);
                            let mut pay = [Decimal::ZERO; TOKENS];
                            for t in 0..TOKENS {
                                let target = drain.locked[t] * released;
                                pay[t] = (target - drain.shed[t]).max(Decimal::ZERO);
                                drain.shed[t] += pay[t];
                            }
                            pay
                        }
                        None => [Decimal::ZERO; TOKENS],
                    }
                }
            };
            let deltas = -Deltas::from_array(payout);
            pool.emit(PoolEvent::Collected { lp: id, deltas });
            Ok(deltas)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tidal_config::PoolSettings;

    fn pool() -> Pool {
        Pool::new(&PoolSettings::default()).unwrap()
    }

    #[test]
    fn test_pour_validates_range_and_amount() {
        let mut pool = pool();
        let owner = AccountId(1);
        assert!(matches!(
            pool.pour(owner, 5, 5, Decimal::ONE),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            pool.pour(owner, 0, TUBS + 1, Decimal::ONE),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            pool.pour(owner, 0, 1, Decimal::ZERO),
            Err(EngineError::NonPositive { field: "liquidity", .. })
        ));
        assert_eq!(pool.lp_count(), 0);
    }

    #[test]
    fn test_bootstrap_pour_earns_immediately() {
        let mut pool = pool();
        let (id, deltas) = pool.pour(AccountId(1), 2040, 2056, dec!(10)).unwrap();
        let lp = pool.lp(id).unwrap();
        assert_eq!(lp.stage, Stage::Earn);
        // straddles price 1: both tokens required
        assert!(deltas.token0 > Decimal::ZERO);
        assert!(deltas.token1 > Decimal::ZERO);
        assert_eq!(pool.minted.sum(2040, 2056), dec!(160));
    }

    #[test]
    fn test_reserves_one_sided_outside_price() {
        let pool = pool();
        let above = pool.get_pour_quantities(2100, 2101, Decimal::ONE).unwrap();
        assert!(above.reserves.token0 > Decimal::ZERO);
        assert_eq!(above.reserves.token1, Decimal::ZERO);
        let below = pool.get_pour_quantities(2000, 2001, Decimal::ONE).unwrap();
        assert_eq!(below.reserves.token0, Decimal::ZERO);
        assert!(below.reserves.token1 > Decimal::ZERO);
    }

    #[test]
    fn test_drain_requires_owner_and_single_exit() {
        let mut pool = pool();
        let (id, _) = pool.pour(AccountId(1), 2040, 2050, dec!(3)).unwrap();
        assert_eq!(
            pool.drain(AccountId(2), id),
            Err(EngineError::NotOwner { caller: 2, owner: 1 })
        );
        let paid = pool.drain(AccountId(1), id).unwrap();
        assert!(paid.token0 <= Decimal::ZERO && paid.token1 < Decimal::ZERO);
        assert_eq!(pool.lp(id).unwrap().stage, Stage::Exit);
        assert_eq!(pool.drain(AccountId(1), id), Err(EngineError::AlreadyDraining));
        assert_eq!(pool.minted.sum(0, pool.grid.bins()), Decimal::ZERO);
    }

    #[test]
    fn test_tap_rejects_non_joining() {
        let mut pool = pool();
        let (id, _) = pool.pour(AccountId(1), 1, 2, Decimal::ONE).unwrap();
        assert_eq!(pool.tap(id), Err(EngineError::NotJoining));
        assert_eq!(pool.tap(LpId(9)), Err(EngineError::UnknownLp(9)));
    }

    #[test]
    fn test_collect_on_fresh_earn_is_zero() {
        let mut pool = pool();
        let (id, _) = pool.pour(AccountId(1), 1, 2, Decimal::ONE).unwrap();
        assert_eq!(pool.collect(AccountId(1), id).unwrap(), Deltas::ZERO);
    }
}
