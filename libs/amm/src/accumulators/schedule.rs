use crate::math::time::days_between;
use crate::types::Era;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Token lumps due at future eras
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSchedule {
    lumps: BTreeMap<Era, Decimal>,
}

impl FlowSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `amount` at `era`. A lump at or before `now` is due
    /// immediately and returned instead of stored.
    pub fn schedule(&mut self, now: Era, era: Era, amount: Decimal) -> Decimal {
        if era <= now {
            return amount;
        }
        let slot = self.lumps.entry(era).or_default();
        *slot += amount;
        if slot.is_zero() {
            self.lumps.remove(&era);
        }
        Decimal::ZERO
    }

    /// Remove and return every lump due at or before `era`
    pub fn mature(&mut self, era: Era) -> Decimal {
        let later = self.lumps.split_off(&(era + 1));
        std::mem::replace(&mut self.lumps, later).into_values().sum()
    }

    /// Total still scheduled
    pub fn pending(&self) -> Decimal {
        self.lumps.values().copied().sum()
    }

    pub fn next_due(&self) -> Option<Era> {
        self.lumps.keys().next().copied()
    }
}

/// Per-day flow rate that changes at scheduled eras
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateSchedule {
    rate: Decimal,
    changes: BTreeMap<Era, Decimal>,
}

impl RateSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current per-day rate
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Flow `rate` per day over `[from, until)`. Reapplying with the negated
    /// rate cancels whatever part of the window is still ahead of `now`.
    pub fn add(&mut self, now: Era, from: Era, until: Era, rate: Decimal) {
        if rate.is_zero() || until <= from {
            return;
        }
        self.change(now, from, rate);
        self.change(now, until, -rate);
    }

    fn change(&mut self, now: Era, era: Era, delta: Decimal) {
        if era <= now {
            self.rate += delta;
            return;
        }
        let slot = self.changes.entry(era).or_default();
        *slot += delta;
        if slot.is_zero() {
            self.changes.remove(&era);
        }
    }

    /// Integrate the rate from `from` to `to`, applying every change on the
    /// way; returns the accrued amount
    pub fn advance(&mut self, from: Era, to: Era) -> Decimal {
        let later = self.changes.split_off(&(to + 1));
        let due = std::mem::replace(&mut self.changes, later);
        let mut cursor = from;
        let mut accrued = Decimal::ZERO;
        for (era, delta) in due {
            accrued += self.rate * days_between(cursor, era);
            self.rate += delta;
            cursor = cursor.max(era);
        }
        accrued + self.rate * days_between(cursor, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tidal_config::protocol::clock::ERAS_PER_DAY;

    #[test]
    fn test_lumps_mature_in_order() {
        let mut flows = FlowSchedule::new();
        assert_eq!(flows.schedule(10, 5, dec!(3)), dec!(3));
        assert_eq!(flows.schedule(10, 20, dec!(1)), Decimal::ZERO);
        flows.schedule(10, 30, dec!(2));
        assert_eq!(flows.pending(), dec!(3));
        assert_eq!(flows.mature(25), dec!(1));
        assert_eq!(flows.next_due(), Some(30));
        flows.schedule(25, 30, dec!(-2));
        assert_eq!(flows.next_due(), None);
    }

    #[test]
    fn test_rate_integrates_across_changes() {
        let mut rates = RateSchedule::new();
        rates.add(0, 0, 2 * ERAS_PER_DAY, dec!(10));
        rates.add(0, ERAS_PER_DAY, 3 * ERAS_PER_DAY, dec!(4));
        assert_eq!(rates.rate(), dec!(10));
        let accrued = rates.advance(0, 4 * ERAS_PER_DAY);
        assert_eq!(accrued, dec!(28));
        assert_eq!(rates.rate(), Decimal::ZERO);
    }

    #[test]
    fn test_negated_rate_cancels_remaining_window() {
        let mut rates = RateSchedule::new();
        rates.add(0, 0, 4 * ERAS_PER_DAY, dec!(2));
        let first = rates.advance(0, ERAS_PER_DAY);
        assert_eq!(first, dec!(2));
        rates.add(ERAS_PER_DAY, 0, 4 * ERAS_PER_DAY, dec!(-2));
        assert_eq!(rates.rate(), Decimal::ZERO);
        assert_eq!(rates.advance(ERAS_PER_DAY, 8 * ERAS_PER_DAY), Decimal::ZERO);
    }
}
