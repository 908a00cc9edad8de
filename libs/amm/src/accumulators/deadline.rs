use super::{DeadlineAccumulator, RangeAccumulator, RangeTree, Rescale};
use crate::math::Bin;
use crate::types::Era;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: Bin,
    stop: Bin,
    delta: Decimal,
}

/// Range tree with scheduled reversals
///
/// `live` holds every entry that has not been flushed; `pending` is a jump
/// table of reversals keyed by deadline era. Queries subtract pending
/// reversals that are already due, so an unflushed tree answers exactly like
/// a flushed one.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineTree {
    live: RangeTree,
    pending: BTreeMap<Era, Vec<Span>>,
}

impl DeadlineTree {
    pub fn new(depth: u8) -> Self {
        Self {
            live: RangeTree::new(depth),
            pending: BTreeMap::new(),
        }
    }

    /// Next deadline still waiting to be flushed
    pub fn next_deadline(&self) -> Option<Era> {
        self.pending.keys().next().copied()
    }

    pub fn pending_deadlines(&self) -> usize {
        self.pending.len()
    }

    /// Non-zero pieces of the live (flushed) tree; callers flush first
    pub fn segments(&self, start: Bin, stop: Bin) -> Vec<(Bin, Bin, Decimal)> {
        self.live.segments(start, stop)
    }

    fn due(&self, era: Era) -> impl Iterator<Item = &Span> {
        self.pending.range(..=era).flat_map(|(_, spans)| spans.iter())
    }
}

impl DeadlineAccumulator for DeadlineTree {
    fn create_one(&mut self, now: Era, start: Bin, stop: Bin, delta: Decimal, deadline: Option<Era>) {
        if delta.is_zero() || start >= stop {
            return;
        }
        match deadline {
            None => self.live.add_range(start, stop, delta),
            Some(deadline) if deadline <= now => {}
            Some(deadline) => {
                self.live.add_range(start, stop, delta);
                self.pending
                    .entry(deadline)
                    .or_default()
                    .push(Span { start, stop, delta });
            }
        }
    }

    fn now_at(&self, era: Era, bin: Bin) -> Decimal {
        let expired: Decimal = self
            .due(era)
            .filter(|span| span.start <= bin && bin < span.stop)
            .map(|span| span.delta)
            .sum();
        self.live.at(bin) - expired
    }

    fn sum_at(&self, era: Era, start: Bin, stop: Bin) -> Decimal {
        let expired: Decimal = self
            .due(era)
            .map(|span| {
                let overlap = span.stop.min(stop) - span.start.max(start);
                if overlap > 0 {
                    span.delta * Decimal::from(overlap)
                } else {
                    Decimal::ZERO
                }
            })
            .sum();
        self.live.sum(start, stop) - expired
    }

    fn flush(&mut self, era: Era) {
        let later = self.pending.split_off(&(era + 1));
        let due = std::mem::replace(&mut self.pending, later);
        for span in due.into_values().flatten() {
            self.live.add_range(span.start, span.stop, -span.delta);
        }
    }
}

impl Rescale for DeadlineTree {
    fn rescale(&mut self, factor: Decimal) {
        self.live.rescale(factor);
        for span in self.pending.values_mut().flatten() {
            span.delta *= factor;
        }
    }
}

/// Scalar total with scheduled reversals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeadlineLedger {
    live: Decimal,
    pending: BTreeMap<Era, Decimal>,
}

impl DeadlineLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` now, reversing at `deadline`
    pub fn create(&mut self, now: Era, delta: Decimal, deadline: Option<Era>) {
        if delta.is_zero() {
            return;
        }
        match deadline {
            None => self.live += delta,
            Some(deadline) if deadline <= now => {}
            Some(deadline) => {
                self.live += delta;
                let slot = self.pending.entry(deadline).or_default();
                *slot += delta;
                if slot.is_zero() {
                    self.pending.remove(&deadline);
                }
            }
        }
    }

    pub fn now_at(&self, era: Era) -> Decimal {
        self.live - self.pending.range(..=era).map(|(_, v)| *v).sum::<Decimal>()
    }

    /// Amount scheduled to expire after `era`
    pub fn expiring_after(&self, era: Era) -> Decimal {
        self.pending.range(era + 1..).map(|(_, v)| *v).sum()
    }

    /// Apply every reversal due at or before `era`; returns the total expired
    pub fn expire(&mut self, era: Era) -> Decimal {
        let later = self.pending.split_off(&(era + 1));
        let due = std::mem::replace(&mut self.pending, later);
        let expired: Decimal = due.into_values().sum();
        self.live -= expired;
        expired
    }
}

impl Rescale for DeadlineLedger {
    fn rescale(&mut self, factor: Decimal) {
        self.live *= factor;
        for value in self.pending.values_mut() {
            *value *= factor;
        }
    }
}
