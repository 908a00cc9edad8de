//! Swapper valuation and lifecycle
//!
//! Backing is the present value a position must hold, per token:
//!
//! - no TWAP (or elapsed): `D·(base_t·w + cap_t·(1 − w))` with
//!   `base_0 = owe_limit·(1 − m)/√K`, `base_1 = owe_limit·m·√K` and the
//!   expiry blend `w = 1 − 2^(−days to expiry)` (`w = 1` without expiry);
//! - TWAP active, fixed token: `amount·(1 + spread·days left)`;
//! - TWAP active, other token: `v·full + (1 − v)·end` with
//!   `v = 1 − 2^(−days left)`.
//!
//! The end-of-TWAP mix is chosen so the no-TWAP backing of the fixed token
//! at the TWAP end equals the fixed amount, which makes all three regimes
//! meet at the boundary. The fixed amount is therefore bounded on both
//! sides: at most the backing with full exposure, at least the lent capacity
//! the expiry blend keeps in that token.
//!
//! `borrow` and `flow` apply signed deltas; disabling with the same stored
//! values cancels an earlier enable exactly, except for flows that already
//! came due. A TWAP delivers its fixed token as a rate over the window. The
//! `minted` high-water mark only ever rises.

use super::{FlowEntry, SwapperPosition, Twap, UNWOUND};
use crate::accumulators::{DeadlineAccumulator, RangeAccumulator};
use crate::error::{EngineError, Result};
use crate::events::PoolEvent;
use crate::math::time::{days_between, decay, growth};
use crate::math::Bin;
use crate::pool::Pool;
use crate::quantity::Quantity;
use crate::types::{AccountId, Deltas, Era, SwapperId, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tidal_config::TOKENS;
use tracing::debug;

/// Read-only valuation of a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapperView {
    pub backing: [Decimal; TOKENS],
    pub lent_capacity: [Decimal; TOKENS],
    pub owed: Decimal,
    pub pending_fees: [Decimal; TOKENS],
    /// Token1 share of exposure once any TWAP has concluded
    pub effective_mix: Decimal,
    pub twap_active: bool,
    pub expired: bool,
    pub unwound: bool,
}

impl Pool {
    /// Deflator at any era, projecting forward or unwinding past decay
    pub(crate) fn deflator_at(&self, era: Era) -> Result<Decimal> {
        let now = self.clock.era();
        if era >= now {
            Ok(self.clock.deflator_at(era))
        } else {
            Ok(self.clock.deflator() * growth(now - era)?)
        }
    }

    /// Inflated exposure when fully in `token`
    fn base_full(&self, pos: &SwapperPosition, token: Token) -> Decimal {
        let root = self.grid.sqrt_strike(pos.strike_bin);
        match token {
            Token::Zero => pos.owe_limit / root,
            Token::One => pos.owe_limit * root,
        }
    }

    /// Expiry blend `w` as of `era`
    fn expiry_weight(pos: &SwapperPosition, era: Era) -> Decimal {
        match pos.dead_era {
            Some(dead) => Decimal::ONE - decay(dead - era),
            None => Decimal::ONE,
        }
    }

    /// No-TWAP backing of `token` at `era` for token1 share `mix`
    fn closed_backing(&self, pos: &SwapperPosition, token: Token, mix: Decimal, era: Era, deflator: Decimal) -> Decimal {
        let share = match token {
            Token::Zero => Decimal::ONE - mix,
            Token::One => mix,
        };
        let w = Self::expiry_weight(pos, era);
        deflator * (self.base_full(pos, token) * share * w + pos.lent_capacity[token.index()] * (Decimal::ONE - w))
    }

    /// Largest fixed amount a TWAP may hold: the amount whose end mix is 1
    pub(crate) fn twap_capacity(&self, pos: &SwapperPosition, twap: Twap) -> Result<Decimal> {
        let deflator = self.deflator_at(twap.until)?;
        let full = match twap.token {
            Token::Zero => Decimal::ZERO,
            Token::One => Decimal::ONE,
        };
        Ok(self.closed_backing(pos, twap.token, full, twap.until, deflator))
    }

    /// Smallest fixed amount a TWAP may hold: the expiry-blended lent capacity
    /// the position backs at the TWAP end even with no exposure to the token
    pub(crate) fn twap_floor(&self, pos: &SwapperPosition, twap: Twap) -> Result<Decimal> {
        let deflator = self.deflator_at(twap.until)?;
        let empty = match twap.token {
            Token::Zero => Decimal::ONE,
            Token::One => Decimal::ZERO,
        };
        Ok(self.closed_backing(pos, twap.token, empty, twap.until, deflator))
    }

    /// Token1 share the position holds once `twap` concludes
    pub(crate) fn end_token_mix(&self, pos: &SwapperPosition, twap: Twap) -> Result<Decimal> {
        let deflator = self.deflator_at(twap.until)?;
        Ok(self.end_mix_with(pos, twap, deflator))
    }

    pub(crate) fn end_mix_with(&self, pos: &SwapperPosition, twap: Twap, deflator: Decimal) -> Decimal {
        let w = Self::expiry_weight(pos, twap.until);
        let base = self.base_full(pos, twap.token) * w;
        let exposure = if base.is_zero() || deflator.is_zero() {
            Decimal::ZERO
        } else {
            let floor = pos.lent_capacity[twap.token.index()] * (Decimal::ONE - w);
            ((pos.token_mix / deflator - floor) / base)
                .max(Decimal::ZERO)
                .min(Decimal::ONE)
        };
        match twap.token {
            Token::One => exposure,
            Token::Zero => Decimal::ONE - exposure,
        }
    }

    /// Backing of `token` at a future era
    pub fn backing_at(&self, pos: &SwapperPosition, token: Token, era: Era) -> Result<Decimal> {
        let deflator = self.deflator_at(era)?;
        match pos.twap {
            Some(twap) if era < twap.until => {
                if token == twap.token {
                    let days = days_between(era, twap.until);
                    return Ok(pos.token_mix * (Decimal::ONE + self.params.twap_spread * days));
                }
                let v = Decimal::ONE - decay(twap.until - era);
                let full_mix = match token {
                    Token::Zero => Decimal::ZERO,
                    Token::One => Decimal::ONE,
                };
                let full = self.closed_backing(pos, token, full_mix, era, deflator);
                let end_mix = self.end_token_mix(pos, twap)?;
                let end = self.closed_backing(pos, token, end_mix, era, deflator);
                Ok(v * full + (Decimal::ONE - v) * end)
            }
            Some(twap) => {
                let end_mix = self.end_token_mix(pos, twap)?;
                Ok(self.closed_backing(pos, token, end_mix, era, deflator))
            }
            None => Ok(self.closed_backing(pos, token, pos.token_mix, era, deflator)),
        }
    }

    /// Present backing of `token`
    pub fn backing(&self, pos: &SwapperPosition, token: Token) -> Result<Decimal> {
        self.backing_at(pos, token, self.clock.era())
    }

    fn backings(&self, pos: &SwapperPosition) -> Result<[Decimal; TOKENS]> {
        Ok([self.backing(pos, Token::Zero)?, self.backing(pos, Token::One)?])
    }

    /// Check eras and resolve the requested mix against the position.
    /// An unbounded TWAP amount resolves to exactly the TWAP capacity.
    pub(crate) fn validate(&self, pos: &SwapperPosition, mix: Quantity) -> Result<Decimal> {
        let mix = mix.defined("token_mix")?;
        if let Some(dead) = pos.dead_era {
            if dead < pos.unlock_era {
                return Err(EngineError::ExpiryBeforeUnlock {
                    dead_era: dead,
                    unlock_era: pos.unlock_era,
                });
            }
            if let Some(twap) = pos.twap {
                if twap.until >= dead {
                    return Err(EngineError::TwapBeyondExpiry {
                        twap_until: twap.until,
                        dead_era: dead,
                    });
                }
            }
        }
        let value = match mix {
            Quantity::NegInf => return Err(EngineError::TokenMixOutOfRange { mix: Decimal::MIN }),
            Quantity::Value(value) if value < Decimal::ZERO => {
                return Err(EngineError::TokenMixOutOfRange { mix: value })
            }
            other => other,
        };
        match pos.twap {
            None => match value {
                Quantity::Value(value) if value <= Decimal::ONE => Ok(value),
                Quantity::Value(value) => Err(EngineError::TokenMixOutOfRange { mix: value }),
                _ => Err(EngineError::TokenMixOutOfRange { mix: Decimal::MAX }),
            },
            Some(twap) => {
                let capacity = self.twap_capacity(pos, twap)?;
                let floor = self.twap_floor(pos, twap)?;
                match value {
                    Quantity::Value(amount) if amount > capacity => Err(EngineError::TwapAmountExceedsCapacity {
                        token: twap.token,
                        amount,
                        capacity,
                    }),
                    Quantity::Value(amount) if amount < floor => Err(EngineError::TwapAmountBelowFloor {
                        token: twap.token,
                        amount,
                        floor,
                    }),
                    Quantity::Value(amount) => Ok(amount),
                    _ => Ok(capacity),
                }
            }
        }
    }

    /// `Σ lent_i · lend growth_i` per token
    fn lend_growth(&self, pos: &SwapperPosition) -> [Decimal; TOKENS] {
        let mut total = [Decimal::ZERO; TOKENS];
        for (bin, lent) in pos.bins().zip(pos.lent.iter()) {
            for t in 0..TOKENS {
                total[t] += *lent * self.lend_fees[t].at(bin);
            }
        }
        total
    }

    /// Apply (or cancel) the position's lent/used/owed entries
    pub(crate) fn borrow(&mut self, id: SwapperId, enable: bool) -> Result<()> {
        let mut pos = self.swapper(id)?.clone();
        let era = self.clock.era();
        let sign = if enable { Decimal::ONE } else { Decimal::NEGATIVE_ONE };

        if enable {
            for i in 0..pos.minted.len() {
                let bin = pos.start_bin + i as Bin;
                pos.minted[i] = pos.minted[i].max(self.capacity(bin));
            }
        }
        for (i, bin) in pos.bins().enumerate() {
            let lent = pos.lent[i];
            self.lent.create_one(era, bin, bin + 1, sign * lent, pos.dead_era);
            if pos.minted[i] > Decimal::ZERO {
                self.used
                    .create_one(era, bin, bin + 1, sign * lent / pos.minted[i], pos.dead_era);
            }
            self.owed
                .create_one(era, bin, bin + 1, sign * pos.owed[i], pos.dead_era);
        }

        let growth = self.lend_growth(&pos);
        if !enable {
            for t in 0..TOKENS {
                pos.fees_due[t] += (growth[t] - pos.fee_past[t]).max(Decimal::ZERO);
            }
        }
        pos.fee_past = growth;
        self.swappers[id.0] = pos;
        Ok(())
    }

    /// Apply one scheduled flow. Lumps already due stay where they are: they
    /// either matured earlier or mature with the current clock step.
    fn apply_flow(&mut self, entry: FlowEntry, sign: Decimal) {
        let era = self.clock.era();
        match entry {
            FlowEntry::Lump { era: due, .. } if due <= era => {}
            FlowEntry::Expire { token, amount, deadline } => {
                self.expire[token.index()].create(era, sign * amount, deadline);
            }
            FlowEntry::Lump { token, era: due, amount } => {
                let matured = self.flow_hat[token.index()].schedule(era, due, sign * amount);
                self.matured[token.index()] += matured;
            }
            FlowEntry::Rate {
                lend,
                token,
                from,
                until,
                rate,
            } => {
                self.flow_dot[lend.index()][token.index()].add(era, from, until, sign * rate);
            }
        }
    }

    /// Schedule (or cancel) the position's future flows
    pub(crate) fn flow(&mut self, id: SwapperId, enable: bool) -> Result<()> {
        let pos = self.swapper(id)?.clone();
        if !enable {
            for entry in pos.flows.iter() {
                self.apply_flow(*entry, Decimal::NEGATIVE_ONE);
            }
            self.swappers[id.0].flows.clear();
            return Ok(());
        }

        let era = self.clock.era();
        let lend = pos.lend_token;
        let capacity = pos.lent_capacity[lend.index()];
        let mut entries = vec![FlowEntry::Expire {
            token: lend,
            amount: capacity,
            deadline: pos.dead_era,
        }];
        if let Some(dead) = pos.dead_era {
            entries.push(FlowEntry::Lump {
                token: lend,
                era: dead,
                amount: capacity * self.deflator_at(dead)?,
            });
        }
        if let Some(twap) = pos.twap_active(era) {
            let days = days_between(era, twap.until);
            if days > Decimal::ZERO {
                entries.push(FlowEntry::Rate {
                    lend,
                    token: twap.token,
                    from: era,
                    until: twap.until,
                    rate: pos.token_mix / days,
                });
            }
        }
        for entry in entries.iter() {
            self.apply_flow(*entry, Decimal::ONE);
        }
        self.swappers[id.0].flows = entries;
        Ok(())
    }

    /// Realize pending lend fees and hand back everything due
    fn take_lend_fees(&mut self, id: SwapperId) -> Result<[Decimal; TOKENS]> {
        let mut pos = self.swapper(id)?.clone();
        let growth = self.lend_growth(&pos);
        let mut due = pos.fees_due;
        for t in 0..TOKENS {
            due[t] += (growth[t] - pos.fee_past[t]).max(Decimal::ZERO);
        }
        pos.fee_past = growth;
        pos.fees_due = [Decimal::ZERO; TOKENS];
        self.swappers[id.0] = pos;
        Ok(due)
    }

    /// Convert a concluded TWAP into its end mix; `deflator` is the deflator
    /// at the TWAP end
    pub(crate) fn conclude_twap(&mut self, id: SwapperId, deflator: Decimal) -> Result<()> {
        let pos = self.swapper(id)?.clone();
        if let Some(twap) = pos.twap {
            let mix = self.end_mix_with(&pos, twap, deflator);
            self.flow(id, false)?;
            let slot = &mut self.swappers[id.0];
            slot.token_mix = mix;
            slot.twap = None;
            self.flow(id, true)?;
            debug!(swapper = id.0, mix = %mix, "TWAP concluded");
        }
        Ok(())
    }

    fn live_swapper(&self, caller: AccountId, id: SwapperId) -> Result<SwapperPosition> {
        let pos = self.swapper(id)?;
        if pos.owner != caller {
            return Err(EngineError::NotOwner {
                caller: caller.0,
                owner: pos.owner.0,
            });
        }
        if pos.is_unwound() {
            return Err(EngineError::SwapperUnwound);
        }
        Ok(pos.clone())
    }

    fn require_unexpired(&self, pos: &SwapperPosition) -> Result<()> {
        if let Some(dead) = pos.dead_era {
            if dead <= self.clock.era() {
                return Err(EngineError::SwapperExpired { dead_era: dead });
            }
        }
        Ok(())
    }

    pub(crate) fn require_future(&self, era: Era) -> Result<()> {
        if era <= self.clock.era() {
            return Err(EngineError::EraNotInFuture {
                era,
                now: self.clock.era(),
            });
        }
        Ok(())
    }

    /// Change the token mix or TWAP schedule
    pub fn reflow(
        &mut self,
        caller: AccountId,
        id: SwapperId,
        token_mix: Quantity,
        twap: Option<Twap>,
    ) -> Result<Deltas> {
        self.transact(|pool| {
            let pos = pool.live_swapper(caller, id)?;
            pool.require_unexpired(&pos)?;
            if let Some(twap) = twap {
                pool.require_future(twap.until)?;
            }
            let before = pool.backings(&pos)?;

            pool.flow(id, false)?;
            let mut updated = pool.swappers[id.0].clone();
            updated.twap = twap;
            updated.token_mix = pool.validate(&updated, token_mix)?;
            pool.swappers[id.0] = updated;
            pool.flow(id, true)?;

            let fees = pool.take_lend_fees(id)?;
            let after = pool.backings(&pool.swappers[id.0])?;
            let deltas = Deltas::from_array(after) - Deltas::from_array(before) - Deltas::from_array(fees);
            pool.emit(PoolEvent::Reflowed { swapper: id, deltas });
            Ok(deltas)
        })
    }

    /// Change the expiry and unlock eras
    pub fn reset(
        &mut self,
        caller: AccountId,
        id: SwapperId,
        dead_era: Option<Era>,
        unlock_era: Era,
    ) -> Result<Deltas> {
        self.transact(|pool| {
            let pos = pool.live_swapper(caller, id)?;
            pool.require_unexpired(&pos)?;
            if let Some(dead) = dead_era {
                pool.require_future(dead)?;
            }
            let before = pool.backings(&pos)?;

            pool.borrow(id, false)?;
            pool.flow(id, false)?;
            let mut updated = pool.swappers[id.0].clone();
            updated.dead_era = dead_era;
            updated.unlock_era = unlock_era;
            updated.token_mix = pool.validate(&updated, Quantity::Value(updated.token_mix))?;
            pool.swappers[id.0] = updated;
            pool.borrow(id, true)?;
            pool.flow(id, true)?;

            let fees = pool.take_lend_fees(id)?;
            let after = pool.backings(&pool.swappers[id.0])?;
            let deltas = Deltas::from_array(after) - Deltas::from_array(before) - Deltas::from_array(fees);
            pool.emit(PoolEvent::Reset { swapper: id, deltas });
            Ok(deltas)
        })
    }

    /// Close the position: return the still-lent liquidity, release backing
    pub fn unwind(&mut self, caller: AccountId, id: SwapperId) -> Result<Deltas> {
        self.transact(|pool| {
            let pos = pool.live_swapper(caller, id)?;
            let era = pool.clock.era();
            if era < pos.unlock_era {
                return Err(EngineError::SwapperLocked {
                    unlock_era: pos.unlock_era,
                    era,
                });
            }
            if pos.dead_era.is_none() {
                return Err(EngineError::NoExpiry);
            }
            pool.require_unexpired(&pos)?;

            let backing = pool.backings(&pos)?;
            pool.borrow(id, false)?;
            pool.flow(id, false)?;
            let fees = pool.take_lend_fees(id)?;

            let lend = pos.lend_token;
            let returned = Deltas::of(lend, pos.lent_capacity[lend.index()] * pool.clock.deflator());
            let deltas = returned - Deltas::from_array(backing) - Deltas::from_array(fees);
            pool.swappers[id.0].dead_era = Some(UNWOUND);

            pool.emit(PoolEvent::Unwound { swapper: id, deltas });
            Ok(deltas)
        })
    }

    /// Present valuation of a position
    pub fn peek(&self, id: SwapperId) -> Result<SwapperView> {
        let pos = self.swapper(id)?;
        let era = self.clock.era();
        let deflator = self.clock.deflator();
        let growth = self.lend_growth(pos);
        let live = !pos.is_unwound() && !pos.is_expired(era);
        let backing = if live {
            self.backings(pos)?
        } else {
            [Decimal::ZERO; TOKENS]
        };
        let effective_mix = match pos.twap {
            Some(twap) => self.end_token_mix(pos, twap)?,
            None => pos.token_mix,
        };
        let mut pending_fees = pos.fees_due;
        if live {
            for t in 0..TOKENS {
                pending_fees[t] += (growth[t] - pos.fee_past[t]).max(Decimal::ZERO);
            }
        }
        Ok(SwapperView {
            backing,
            lent_capacity: [pos.lent_capacity[0] * deflator, pos.lent_capacity[1] * deflator],
            owed: pos.owed.iter().copied().sum::<Decimal>() * deflator,
            pending_fees,
            effective_mix,
            twap_active: pos.twap_active(era).is_some(),
            expired: pos.is_expired(era),
            unwound: pos.is_unwound(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swapper::LoanRequest;
    use crate::types::LpId;
    use rust_decimal_macros::dec;
    use tidal_config::protocol::clock::ERAS_PER_DAY;
    use tidal_config::PoolSettings;

    fn pool_with_loan() -> (Pool, SwapperId) {
        let mut pool = Pool::new(&PoolSettings::default()).unwrap();
        pool.pour(AccountId(1), 2000, 2100, dec!(1000)).unwrap();
        pool.enable_swapper_creation().unwrap();
        let request = LoanRequest {
            start_bin: 2060,
            strike_bin: 2061,
            owed_potential: vec![dec!(0.0001); 4],
            token_mix: Quantity::Value(dec!(0.5)),
            unlock_era: 0,
            dead_era: Some(30 * ERAS_PER_DAY),
            twap: None,
        };
        let (id, _) = pool.new_loan(AccountId(2), request).unwrap();
        (pool, id)
    }

    #[test]
    fn test_borrow_tracks_minted_high_water() {
        let (mut pool, id) = pool_with_loan();
        let pos = pool.swapper(id).unwrap().clone();
        for (i, bin) in pos.bins().enumerate() {
            assert_eq!(pos.minted[i], pool.capacity(bin));
        }

        pool.pour(AccountId(3), 2060, 2064, dec!(500)).unwrap();
        pool.reset(AccountId(2), id, pos.dead_era, pos.unlock_era)
            .unwrap();
        let raised = pool.swapper(id).unwrap().minted.clone();
        assert_eq!(raised, vec![dec!(1500); 4]);

        // capacity falls after the drain, the mark does not
        pool.drain(AccountId(1), LpId(0)).unwrap();
        assert!(pool.capacity(2060) < dec!(1500));
        pool.reset(AccountId(2), id, pos.dead_era, pos.unlock_era)
            .unwrap();
        assert_eq!(pool.swapper(id).unwrap().minted, raised);
    }

    #[test]
    fn test_disabled_lumps_already_due_stay_matured() {
        let (mut pool, id) = pool_with_loan();
        let dead = pool.swapper(id).unwrap().dead_era.unwrap();
        let pending = pool.pending_flows()[0];
        assert!(pending > Decimal::ZERO);

        // cancelling and rescheduling from the same era is exact
        pool.flow(id, false).unwrap();
        assert_eq!(pool.pending_flows(), [Decimal::ZERO; 2]);
        pool.flow(id, true).unwrap();
        assert_eq!(pool.pending_flows()[0], pending);

        pool.advance(dead).unwrap();
        let matured = pool.matured_flows();
        assert_eq!(matured[0], pending);
        pool.flow(id, false).unwrap();
        assert_eq!(pool.matured_flows(), matured);
    }
}
