//! Property tests for the accumulators and position valuation

mod common;

use common::*;
use proptest::prelude::*;
use tidal_amm::accumulators::{DeadlineAccumulator, DeadlineTree, RangeAccumulator, RangeTree};
use tidal_amm::math::{sqrt, PriceGrid};
use tidal_amm::{Decimal, SwapperPosition};

#[derive(Debug, Clone)]
struct Entry {
    start: i64,
    stop: i64,
    amount: Decimal,
    deadline: Option<i64>,
}

prop_compose! {
    fn entry()
        (start in 0i64..4000, width in 1i64..96, amount in -500i64..500, deadline in proptest::option::of(1i64..20_000)) -> Entry {
        Entry {
            start,
            stop: start + width,
            amount: Decimal::from(amount),
            deadline,
        }
    }
}

prop_compose! {
    fn owed_potential()
        (owed in proptest::collection::vec(0u32..10_000, 1..12)) -> Vec<Decimal> {
        owed.into_iter().map(|o| Decimal::new(o as i64 + 1, 6)).collect()
    }
}

fn naive_sum(entries: &[Entry], era: i64, start: i64, stop: i64) -> Decimal {
    entries
        .iter()
        .filter(|e| e.deadline.map_or(true, |d| d > era))
        .map(|e| {
            let overlap = (e.stop.min(stop) - e.start.max(start)).max(0);
            e.amount * Decimal::from(overlap)
        })
        .sum()
}

proptest! {
    /// Before a deadline an entry counts in full; at and after it, not at all
    #[test]
    fn deadline_tree_matches_naive_sum(
        entries in proptest::collection::vec(entry(), 1..24),
        era in 0i64..25_000,
        query_start in 0i64..4000,
        query_width in 1i64..96,
    ) {
        let mut tree = DeadlineTree::new(12);
        for e in entries.iter() {
            tree.create_one(0, e.start, e.stop, e.amount, e.deadline);
        }
        let stop = query_start + query_width;
        let expected = naive_sum(&entries, era, query_start, stop);
        prop_assert_eq!(tree.sum_at(era, query_start, stop), expected);

        // flushing changes nothing observable
        tree.flush(era);
        prop_assert_eq!(tree.sum_at(era, query_start, stop), expected);
        prop_assert_eq!(tree.now_at(era, query_start), naive_sum(&entries, era, query_start, query_start + 1));
    }

    /// Range sums agree with per-bin values
    #[test]
    fn range_tree_sum_is_sum_of_points(
        entries in proptest::collection::vec(entry(), 1..16),
        query_start in 0i64..4000,
        query_width in 1i64..64,
    ) {
        let mut tree = RangeTree::new(12);
        for e in entries.iter() {
            tree.add_range(e.start, e.stop, e.amount);
        }
        let stop = query_start + query_width;
        let points: Decimal = (query_start..stop).map(|bin| tree.at(bin)).sum();
        prop_assert_eq!(tree.sum(query_start, stop), points);
    }

    /// owe_limit is the geometric mean of the two strike-weighted sums
    #[test]
    fn owe_limit_matches_closed_form(start in 1i64..4000, owed in owed_potential()) {
        let grid = PriceGrid::new(12).unwrap();
        let limit = SwapperPosition::derive_owe_limit(&grid, start, &owed);
        let (mut over, mut under) = (Decimal::ZERO, Decimal::ZERO);
        for (i, o) in owed.iter().enumerate() {
            let root = grid.sqrt_strike(start + i as i64);
            over += *o / root;
            under += *o * root;
        }
        let expected = sqrt(over * under);
        prop_assert!((limit - expected).abs() <= expected * Decimal::new(1, 20));
        // never below the plain total
        let total: Decimal = owed.iter().copied().sum();
        prop_assert!(limit >= total * (Decimal::ONE - Decimal::new(1, 20)));
    }

    /// Draining an untouched position removes exactly its liquidity
    #[test]
    fn drain_removes_poured_liquidity(
        start in 1990i64..2090,
        width in 1i64..24,
        liquidity in 1u32..10_000,
    ) {
        let mut pool = empty_pool();
        let liquidity = Decimal::from(liquidity);
        let (lp, _) = pool.pour(PROVIDER, start, start + width, liquidity).unwrap();
        let minted = |pool: &tidal_amm::Pool| -> Decimal {
            pool.bin_liquidity(start, start + width).unwrap().iter().map(|b| b.minted).sum()
        };
        let before = minted(&pool);
        pool.drain(PROVIDER, lp).unwrap();
        prop_assert_eq!(before - minted(&pool), liquidity * Decimal::from(width));
    }
}
