use super::{RangeAccumulator, Rescale};
use crate::math::Bin;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Node {
    /// Added uniformly to every bin under this node
    add: Decimal,
    /// Sum over the node's span of every add at or below this node
    sum: Decimal,
}

/// Sparse lazy segment tree over `[0, 2^depth)`
///
/// Nodes are heap-indexed (root `1`, children `2i` and `2i + 1`) and only
/// materialized once touched, so a fresh tree over a million bins is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTree {
    depth: u8,
    nodes: HashMap<u64, Node>,
}

impl RangeTree {
    pub fn new(depth: u8) -> Self {
        Self {
            depth,
            nodes: HashMap::new(),
        }
    }

    /// Number of bins covered
    pub fn width(&self) -> Bin {
        1 << self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.values().all(|node| node.sum.is_zero() && node.add.is_zero())
    }

    fn clamp(&self, start: Bin, stop: Bin) -> (Bin, Bin) {
        (start.max(0), stop.min(self.width()))
    }

    fn update(&mut self, id: u64, lo: Bin, hi: Bin, start: Bin, stop: Bin, delta: Decimal) {
        let overlap = stop.min(hi) - start.max(lo);
        if overlap <= 0 {
            return;
        }
        let node = self.nodes.entry(id).or_default();
        node.sum += delta * Decimal::from(overlap);
        if start <= lo && hi <= stop {
            node.add += delta;
            return;
        }
        let mid = lo + (hi - lo) / 2;
        self.update(2 * id, lo, mid, start, stop, delta);
        self.update(2 * id + 1, mid, hi, start, stop, delta);
    }

    fn query(&self, id: u64, lo: Bin, hi: Bin, start: Bin, stop: Bin, above: Decimal) -> Decimal {
        let overlap = stop.min(hi) - start.max(lo);
        if overlap <= 0 {
            return Decimal::ZERO;
        }
        let Some(node) = self.nodes.get(&id) else {
            return above * Decimal::from(overlap);
        };
        if start <= lo && hi <= stop {
            return node.sum + above * Decimal::from(hi - lo);
        }
        let mid = lo + (hi - lo) / 2;
        let above = above + node.add;
        self.query(2 * id, lo, mid, start, stop, above) + self.query(2 * id + 1, mid, hi, start, stop, above)
    }

    /// Piecewise-constant pieces of `[start, stop)` with a non-zero value,
    /// in ascending bin order
    pub fn segments(&self, start: Bin, stop: Bin) -> Vec<(Bin, Bin, Decimal)> {
        let (start, stop) = self.clamp(start, stop);
        let mut out: Vec<(Bin, Bin, Decimal)> = Vec::new();
        if start < stop {
            self.collect(1, 0, self.width(), start, stop, Decimal::ZERO, &mut out);
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn collect(
        &self,
        id: u64,
        lo: Bin,
        hi: Bin,
        start: Bin,
        stop: Bin,
        above: Decimal,
        out: &mut Vec<(Bin, Bin, Decimal)>,
    ) {
        if stop.min(hi) <= start.max(lo) {
            return;
        }
        let node = self.nodes.get(&id);
        let leaf = hi - lo == 1;
        if node.is_none() || leaf {
            let value = above + node.map(|n| n.add).unwrap_or_default();
            if value.is_zero() {
                return;
            }
            let piece = (start.max(lo), stop.min(hi), value);
            match out.last_mut() {
                Some(last) if last.1 == piece.0 && last.2 == value => last.1 = piece.1,
                _ => out.push(piece),
            }
            return;
        }
        let above = above + node.map(|n| n.add).unwrap_or_default();
        let mid = lo + (hi - lo) / 2;
        self.collect(2 * id, lo, mid, start, stop, above, out);
        self.collect(2 * id + 1, mid, hi, start, stop, above, out);
    }
}

impl RangeAccumulator for RangeTree {
    fn add_range(&mut self, start: Bin, stop: Bin, delta: Decimal) {
        let (start, stop) = self.clamp(start, stop);
        if start >= stop || delta.is_zero() {
            return;
        }
        self.update(1, 0, self.width(), start, stop, delta);
    }

    fn at(&self, bin: Bin) -> Decimal {
        if bin < 0 || bin >= self.width() {
            return Decimal::ZERO;
        }
        let (mut id, mut lo, mut hi) = (1u64, 0, self.width());
        let mut value = Decimal::ZERO;
        while let Some(node) = self.nodes.get(&id) {
            value += node.add;
            if hi - lo == 1 {
                break;
            }
            let mid = lo + (hi - lo) / 2;
            if bin < mid {
                id *= 2;
                hi = mid;
            } else {
                id = 2 * id + 1;
                lo = mid;
            }
        }
        value
    }

    fn sum(&self, start: Bin, stop: Bin) -> Decimal {
        let (start, stop) = self.clamp(start, stop);
        if start >= stop {
            return Decimal::ZERO;
        }
        self.query(1, 0, self.width(), start, stop, Decimal::ZERO)
    }
}

impl Rescale for RangeTree {
    fn rescale(&mut self, factor: Decimal) {
        for node in self.nodes.values_mut() {
            node.add *= factor;
            node.sum *= factor;
        }
    }
}
