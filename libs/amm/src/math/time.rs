//! Era clock and stepped decay
//!
//! One day is `2^13` eras. The deflator halves every day; fractional days
//! go through a 13-entry table of `2^(-2^k / 8192)` factors, one per era bit,
//! so the same era step always produces the same product.

use super::{exp, LN_2};
use crate::error::{EngineError, Result};
use crate::types::Era;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tidal_config::protocol::clock::{ERAS_PER_DAY, ERA_BITS_PER_DAY, EARN_JUMP_ERAS, GENESIS_ERA};
use tidal_config::protocol::REBASE_BITS;

/// Whole days beyond which the decay factor is below decimal resolution
const MAX_HALVINGS: i64 = 95;

/// `DECAY_STEPS[k] = 2^(-2^k / ERAS_PER_DAY)`
static DECAY_STEPS: Lazy<[Decimal; ERA_BITS_PER_DAY as usize]> = Lazy::new(|| {
    let mut steps = [Decimal::ONE; ERA_BITS_PER_DAY as usize];
    for (k, step) in steps.iter_mut().enumerate() {
        let fraction = Decimal::from(1i64 << k) / Decimal::from(ERAS_PER_DAY);
        *step = exp(-*LN_2 * fraction);
    }
    steps
});

/// `2^-REBASE_BITS`
pub static REBASE_FLOOR: Lazy<Decimal> =
    Lazy::new(|| Decimal::ONE / Decimal::from(1i64 << REBASE_BITS));

/// `2^(-eras / ERAS_PER_DAY)`; non-positive spans decay by nothing
pub fn decay(eras: Era) -> Decimal {
    if eras <= 0 {
        return Decimal::ONE;
    }
    let days = eras >> ERA_BITS_PER_DAY;
    if days > MAX_HALVINGS {
        return Decimal::ZERO;
    }
    let low = eras & (ERAS_PER_DAY - 1);
    let mut factor = Decimal::ONE;
    for (k, step) in DECAY_STEPS.iter().enumerate() {
        if low & (1 << k) != 0 {
            factor *= *step;
        }
    }
    factor / Decimal::from_i128_with_scale(1i128 << days, 0)
}

/// Inverse of [`decay`], failing once the factor leaves decimal range
pub fn growth(eras: Era) -> Result<Decimal> {
    let factor = decay(eras);
    if factor.is_zero() {
        return Err(EngineError::Overflow { context: "growth factor" });
    }
    Decimal::ONE
        .checked_div(factor)
        .ok_or(EngineError::Overflow { context: "growth factor" })
}

/// Continuous day count of an era
pub fn date(era: Era) -> Decimal {
    Decimal::from(era) / Decimal::from(ERAS_PER_DAY)
}

/// Days from `from` to `to`, zero if `to` is not later
pub fn days_between(from: Era, to: Era) -> Decimal {
    if to <= from {
        return Decimal::ZERO;
    }
    date(to - from)
}

/// Next earn horizon strictly after `era`
pub fn tail_era(era: Era) -> Era {
    (era.div_euclid(EARN_JUMP_ERAS) + 1) * EARN_JUMP_ERAS
}

/// Pool clock: current era plus the cumulative deflator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    era: Era,
    deflator: Decimal,
}

impl Default for Clock {
    fn default() -> Self {
        Self::genesis()
    }
}

impl Clock {
    pub fn genesis() -> Self {
        Self {
            era: GENESIS_ERA,
            deflator: Decimal::ONE,
        }
    }

    pub fn era(&self) -> Era {
        self.era
    }

    pub fn date(&self) -> Decimal {
        date(self.era)
    }

    /// Present value of one inflated unit
    pub fn deflator(&self) -> Decimal {
        self.deflator
    }

    /// Inflated units per present unit
    pub fn inflator(&self) -> Result<Decimal> {
        Decimal::ONE
            .checked_div(self.deflator)
            .ok_or(EngineError::Overflow { context: "inflator" })
    }

    /// Deflator as it will be at `era` (for `era` at or after now)
    pub fn deflator_at(&self, era: Era) -> Decimal {
        self.deflator * decay(era - self.era)
    }

    /// Step forward; returns the decay factor applied
    pub fn advance(&mut self, eras: Era) -> Result<Decimal> {
        if eras <= 0 {
            return Err(EngineError::InvalidClockStep { eras });
        }
        let era = self
            .era
            .checked_add(eras)
            .ok_or(EngineError::Overflow { context: "era" })?;
        let factor = decay(eras);
        self.era = era;
        self.deflator *= factor;
        Ok(factor)
    }

    /// True once inflated stores must be rescaled
    pub fn needs_rebase(&self) -> bool {
        self.deflator < *REBASE_FLOOR
    }

    /// Reset the deflator to one; returns the factor every inflated store
    /// must be multiplied by
    pub fn rebase(&mut self) -> Decimal {
        let factor = self.deflator;
        self.deflator = Decimal::ONE;
        factor
    }
}
