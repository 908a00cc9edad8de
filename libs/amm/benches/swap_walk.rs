//! Benchmark for the spot swap walk
//!
//! Measures single-bin and multi-bin walks against a pool seeded with one
//! wide LP position, with and without an outstanding loan in the path.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tidal_amm::{dec, AccountId, LoanRequest, Pool, Quantity, Token};
use tidal_config::PoolSettings;

fn seeded_pool(with_loan: bool) -> Pool {
    let mut pool = Pool::new(&PoolSettings::default()).expect("default settings are valid");
    pool.pour(AccountId(1), 1900, 2200, dec!(1000))
        .expect("seed pour");
    if with_loan {
        pool.enable_swapper_creation().expect("enable");
        let request = LoanRequest {
            start_bin: 2000,
            strike_bin: 2010,
            owed_potential: vec![dec!(0.0001); 20],
            token_mix: Quantity::Value(dec!(0.5)),
            unlock_era: 0,
            dead_era: Some(30 * 8192),
            twap: None,
        };
        pool.new_loan(AccountId(2), request).expect("seed loan");
    }
    pool
}

fn bench_single_bin_swap(c: &mut Criterion) {
    let pool = seeded_pool(false);

    c.bench_function("swap_single_bin", |b| {
        b.iter_batched(
            || pool.clone(),
            |mut pool| {
                let deltas = pool
                    .swap(AccountId(3), Token::One, Quantity::Value(dec!(0.5)), None)
                    .expect("swap");
                criterion::black_box(deltas);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_multi_bin_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap_walk_bins");
    for with_loan in [false, true] {
        let pool = seeded_pool(with_loan);
        let label = if with_loan { "with_loan" } else { "plain" };
        group.bench_with_input(BenchmarkId::from_parameter(label), &pool, |b, pool| {
            b.iter_batched(
                || pool.clone(),
                |mut pool| {
                    // walks down roughly forty bins
                    let deltas = pool
                        .swap(AccountId(3), Token::Zero, Quantity::PosInf, Some(dec!(0.67)))
                        .expect("swap");
                    criterion::black_box(deltas);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_bin_swap, bench_multi_bin_swap);
criterion_main!(benches);
