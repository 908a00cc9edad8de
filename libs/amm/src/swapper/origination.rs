//! Swapper origination ("new loan")
//!
//! For each bin with owed value `o` the solver raises utilization from `u0`
//! to
//!
//! ```text
//! u1 = 1 − (1 − u0)·exp(−o / (ρ·V))
//! ρ  = max(min_rate, σ·exp(−d_eff/σ))
//! ```
//!
//! where `V` is the bin's capacity value in sqrt-price-neutral units, `σ`
//! the daily volatility and `d_eff` the log distance from the market,
//! shortened by `sin(π/2·H)` when the position unlocks within `H < 1` days.
//!
//! Utilization is lent liquidity over bin capacity, so the bin lends
//! `(u1 − u0)·C` more liquidity, with `C` the capacity, and lands exactly on
//! `u1`.

use super::{SwapperPosition, Twap};
use crate::error::{EngineError, Result};
use crate::events::PoolEvent;
use crate::math::time::days_between;
use crate::math::{exp, quarter_wave, sqrt, Bin};
use crate::pool::Pool;
use crate::quantity::Quantity;
use crate::types::{AccountId, Deltas, Era, SwapperId, Token};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tidal_config::TOKENS;
use tracing::debug;

/// Bisection steps for the tilt bracket
const TILT_STEPS: usize = 110;

/// Largest tilt exponent; beyond it weights leave decimal range
const TILT_LIMIT: Decimal = dec!(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub start_bin: Bin,
    pub strike_bin: Bin,
    /// Owed value per bin from `start_bin`, present units
    pub owed_potential: Vec<Decimal>,
    pub token_mix: Quantity,
    pub unlock_era: Era,
    pub dead_era: Option<Era>,
    pub twap: Option<Twap>,
}

/// Per-bin solution of the utilization update
#[derive(Debug, Clone, Copy, PartialEq)]
struct BinLoan {
    rate: Decimal,
    from: Decimal,
    to: Decimal,
    lent: Decimal,
}

impl Pool {
    /// Price and create a Swapper position.
    ///
    /// Returns the new id and the net payment: backing minus the lent
    /// capacity handed to the caller, both at present value.
    pub fn new_loan(&mut self, caller: AccountId, request: LoanRequest) -> Result<(SwapperId, Deltas)> {
        self.transact(|pool| {
            if !pool.swapper_enabled {
                return Err(EngineError::SwapperCreationDisabled);
            }
            check_owed(&request.owed_potential)?;
            request.token_mix.defined("token_mix")?;

            let start = request.start_bin;
            let stop = start + request.owed_potential.len() as Bin;
            pool.check_bins(start, stop)?;

            let lend_token = if start > pool.tick_bin {
                Token::Zero
            } else if stop <= pool.tick_bin {
                Token::One
            } else {
                return Err(EngineError::PriceInRange {
                    start,
                    stop,
                    tick_bin: pool.tick_bin,
                });
            };

            let strike = request.strike_bin;
            let owed = if request.owed_potential.len() == 1 {
                if strike != start {
                    return Err(EngineError::UnalignedStrike { start, strike });
                }
                if strike == 0 {
                    return Err(EngineError::StrikeAtZero);
                }
                request.owed_potential.clone()
            } else {
                if strike < start || strike >= stop {
                    return Err(EngineError::StrikeOutsideRange { start, strike, stop });
                }
                tilt(&request.owed_potential, start, strike)?
            };

            if let Some(dead) = request.dead_era {
                pool.require_future(dead)?;
            }
            if let Some(twap) = request.twap {
                pool.require_future(twap.until)?;
            }

            let era = pool.clock.era();
            pool.flush(era);
            let inflator = pool.clock.inflator()?;

            let mut lent = Vec::with_capacity(owed.len());
            for (i, owed) in owed.iter().enumerate() {
                let bin = start + i as Bin;
                let loan = pool.solve_bin(bin, *owed, request.unlock_era)?;
                debug!(bin, rate = %loan.rate, from = %loan.from, to = %loan.to, "Bin utilization solved");
                lent.push(loan.lent * inflator);
            }

            let owed: Vec<Decimal> = owed.iter().map(|o| *o * inflator).collect();
            let owe_limit = SwapperPosition::derive_owe_limit(&pool.grid, start, &owed);
            let lent_capacity = pool.lent_capacity(start, &lent);

            let mut pos = SwapperPosition {
                owner: caller,
                start_bin: start,
                strike_bin: strike,
                lend_token,
                token_mix: Decimal::ZERO,
                twap: request.twap,
                unlock_era: request.unlock_era,
                dead_era: request.dead_era,
                owe_limit,
                lent_capacity,
                minted: vec![Decimal::ZERO; owed.len()],
                owed,
                lent,
                fee_past: [Decimal::ZERO; TOKENS],
                fees_due: [Decimal::ZERO; TOKENS],
                flows: Vec::new(),
            };
            pos.token_mix = pool.validate(&pos, request.token_mix)?;

            let id = SwapperId(pool.swappers.len());
            pool.swappers.push(pos);
            pool.borrow(id, true)?;
            pool.flow(id, true)?;
            pool.swapper_ever = true;

            let pos = &pool.swappers[id.0];
            let backing = [pool.backing(pos, Token::Zero)?, pool.backing(pos, Token::One)?];
            let handed = Deltas::of(lend_token, pos.lent_capacity[lend_token.index()] * pool.clock.deflator());
            let deltas = Deltas::from_array(backing) - handed;

            pool.emit(PoolEvent::LoanCreated {
                swapper: id,
                owner: caller,
                lend_token,
                start_bin: start,
                strike_bin: strike,
                deltas,
            });
            Ok((id, deltas))
        })
    }

    /// Origination rate for `bin`
    fn origination_rate(&self, bin: Bin, unlock_era: Era) -> Decimal {
        let sigma = sqrt(self.variance);
        if sigma.is_zero() {
            return self.params.min_rate;
        }
        let market = self.grid.log_price(self.tick_bin, self.bin_frac);
        let distance = (self.grid.log_price(bin, dec!(0.5)) - market).abs();
        let horizon = days_between(self.clock.era(), unlock_era);
        let distance = if horizon < Decimal::ONE {
            distance * quarter_wave(horizon)
        } else {
            distance
        };
        (sigma * exp(-distance / sigma)).max(self.params.min_rate)
    }

    /// Lent liquidity (present units) needed to cover `owed` in `bin`
    fn solve_bin(&self, bin: Bin, owed: Decimal, unlock_era: Era) -> Result<BinLoan> {
        let from = self.utilization(bin);
        let rate = self.origination_rate(bin, unlock_era);
        if owed.is_zero() {
            return Ok(BinLoan {
                rate,
                from,
                to: from,
                lent: Decimal::ZERO,
            });
        }
        let capacity = self.capacity(bin);
        let value = capacity * self.params.epsilon * self.grid.bin_value(bin);
        if value <= Decimal::ZERO {
            return Err(EngineError::NoLiquidity { bin });
        }
        let to = Decimal::ONE - (Decimal::ONE - from) * exp(-owed / (rate * value));
        if to > self.params.utilization_cap {
            return Err(EngineError::UtilizationBreach {
                bin,
                utilization: to,
                cap: self.params.utilization_cap,
            });
        }
        Ok(BinLoan {
            rate,
            from,
            to,
            lent: (to - from) * capacity,
        })
    }

    /// Token value of inflated lent liquidity across a bin range
    fn lent_capacity(&self, start: Bin, lent: &[Decimal]) -> [Decimal; TOKENS] {
        let eps = self.params.epsilon;
        let mut capacity = [Decimal::ZERO; TOKENS];
        for (i, lent) in lent.iter().enumerate() {
            let bin = start + i as Bin;
            let low = self.grid.lower_sqrt(bin);
            let high = self.grid.upper_sqrt(bin);
            capacity[0] += *lent * eps * (Decimal::ONE / low - Decimal::ONE / high);
            capacity[1] += *lent * eps * (high - low);
        }
        capacity
    }
}

fn check_owed(owed: &[Decimal]) -> Result<()> {
    if owed.is_empty() {
        return Err(EngineError::EmptyOwedPotential);
    }
    if let Some((index, value)) = owed.iter().enumerate().find(|(_, v)| v.is_sign_negative() && !v.is_zero()) {
        return Err(EngineError::NegativeOwedPotential { index, value: *value });
    }
    if owed.iter().all(|v| v.is_zero()) {
        return Err(EngineError::ZeroOwedPotential);
    }
    Ok(())
}

/// Exponentially tilt `owed` around `strike` so the owed-weighted offset is
/// zero, preserving the total
pub(crate) fn tilt(owed: &[Decimal], start: Bin, strike: Bin) -> Result<Vec<Decimal>> {
    let span = Decimal::from((owed.len() as Bin - 1).max(1));
    let offsets: Vec<Decimal> = (0..owed.len())
        .map(|i| Decimal::from(start + i as Bin - strike) / span)
        .collect();
    let moment = |theta: Decimal| -> Decimal {
        owed.iter()
            .zip(offsets.iter())
            .map(|(o, x)| *o * *x * exp(theta * *x))
            .sum()
    };

    let balanced = moment(Decimal::ZERO);
    if balanced.is_zero() {
        return Ok(owed.to_vec());
    }
    let above = owed.iter().zip(offsets.iter()).any(|(o, x)| !o.is_zero() && x.is_sign_positive() && !x.is_zero());
    let below = owed.iter().zip(offsets.iter()).any(|(o, x)| !o.is_zero() && x.is_sign_negative() && !x.is_zero());
    if !(above && below) {
        return Err(EngineError::TiltInfeasible { strike });
    }

    // moment is increasing in theta
    let (mut lo, mut hi) = if balanced > Decimal::ZERO {
        (-TILT_LIMIT, Decimal::ZERO)
    } else {
        (Decimal::ZERO, TILT_LIMIT)
    };
    if moment(lo) > Decimal::ZERO || moment(hi) < Decimal::ZERO {
        return Err(EngineError::TiltInfeasible { strike });
    }
    for _ in 0..TILT_STEPS {
        let mid = (lo + hi) / Decimal::TWO;
        let m = moment(mid);
        if m.is_zero() {
            lo = mid;
            hi = mid;
            break;
        }
        if m > Decimal::ZERO {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let theta = (lo + hi) / Decimal::TWO;

    let weights: Vec<Decimal> = owed
        .iter()
        .zip(offsets.iter())
        .map(|(o, x)| *o * exp(theta * *x))
        .collect();
    let total: Decimal = owed.iter().copied().sum();
    let tilted: Decimal = weights.iter().copied().sum();
    Ok(weights.into_iter().map(|w| w * total / tilted).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_owed() {
        assert_eq!(check_owed(&[]), Err(EngineError::EmptyOwedPotential));
        assert_eq!(
            check_owed(&[dec!(1), dec!(-2)]),
            Err(EngineError::NegativeOwedPotential { index: 1, value: dec!(-2) })
        );
        assert_eq!(check_owed(&[dec!(0), dec!(0)]), Err(EngineError::ZeroOwedPotential));
        assert!(check_owed(&[dec!(0), dec!(3)]).is_ok());
    }

    #[test]
    fn test_tilt_balances_offsets() {
        let owed = [dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)];
        let tilted = tilt(&owed, 100, 101).unwrap();
        let total: Decimal = tilted.iter().copied().sum();
        assert!((total - dec!(5)).abs() < dec!(1e-20));
        let moment: Decimal = tilted
            .iter()
            .enumerate()
            .map(|(i, w)| *w * Decimal::from(i as i64 - 1))
            .sum();
        assert!(moment.abs() < dec!(1e-18), "moment {}", moment);
        // weight shifts towards the strike side that was light
        assert!(tilted[0] > tilted[4]);
    }

    fn below_price(pool: &Pool) -> LoanRequest {
        LoanRequest {
            start_bin: 2030,
            strike_bin: 2030,
            owed_potential: vec![dec!(0.0002)],
            token_mix: Quantity::Value(dec!(0.25)),
            unlock_era: pool.era(),
            dead_era: Some(pool.era() + 10 * tidal_config::protocol::clock::ERAS_PER_DAY),
            twap: None,
        }
    }

    #[test]
    fn test_lent_grows_by_utilization_step_times_capacity() {
        let mut pool = Pool::new(&tidal_config::PoolSettings::default()).unwrap();
        pool.pour(AccountId(1), 2000, 2100, dec!(1000)).unwrap();
        pool.enable_swapper_creation().unwrap();
        pool.new_loan(AccountId(2), below_price(&pool)).unwrap();

        let u0 = pool.utilization(2030);
        assert!(u0 > Decimal::ZERO);
        let capacity = pool.capacity(2030);
        let lent_before = pool.lent_present(2030);

        let loan = pool.solve_bin(2030, dec!(0.0002), pool.era()).unwrap();
        assert_eq!(loan.from, u0);
        assert!(loan.to > u0);
        assert_eq!(loan.lent, (loan.to - u0) * capacity);

        pool.new_loan(AccountId(2), below_price(&pool)).unwrap();
        let added = pool.lent_present(2030) - lent_before;
        assert!((added - loan.lent).abs() < dec!(1e-20), "added {added} vs {}", loan.lent);
        assert!((pool.utilization(2030) - loan.to).abs() < dec!(1e-20));
    }

    #[test]
    fn test_tilt_keeps_balanced_input() {
        let owed = [dec!(2), dec!(5), dec!(2)];
        assert_eq!(tilt(&owed, 10, 11).unwrap(), owed.to_vec());
    }

    #[test]
    fn test_tilt_rejects_one_sided_weight() {
        let owed = [dec!(0), dec!(3), dec!(4)];
        assert_eq!(tilt(&owed, 10, 10), Err(EngineError::TiltInfeasible { strike: 10 }));
    }
}
