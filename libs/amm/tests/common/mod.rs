//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use tidal_amm::{dec, AccountId, Decimal, LoanRequest, LpId, Pool, Quantity, SwapperId, Twap};
use tidal_config::protocol::clock::ERAS_PER_DAY;
use tidal_config::PoolSettings;

pub const PROVIDER: AccountId = AccountId(1);
pub const BORROWER: AccountId = AccountId(2);
pub const TRADER: AccountId = AccountId(3);
pub const STRANGER: AccountId = AccountId(4);

/// Seeded liquidity range, in tubs (price 1 sits at tub 2048)
pub const SEED_START: i64 = 2000;
pub const SEED_STOP: i64 = 2100;
pub const SEED_LIQUIDITY: Decimal = dec!(1000);

pub fn settings() -> PoolSettings {
    PoolSettings {
        symbols: ["USDC".to_string(), "WETH".to_string()],
        decimals: [6, 18],
        ..PoolSettings::default()
    }
}

/// Route engine logs through the test harness; `RUST_LOG=debug` shows walks
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn empty_pool() -> Pool {
    init_tracing();
    Pool::new(&settings()).unwrap()
}

/// Pool with one earning LP position around the price and Swapper creation
/// enabled
pub fn seeded_pool() -> (Pool, LpId) {
    let mut pool = empty_pool();
    let (lp, _) = pool.pour(PROVIDER, SEED_START, SEED_STOP, SEED_LIQUIDITY).unwrap();
    pool.enable_swapper_creation().unwrap();
    (pool, lp)
}

pub fn days(n: i64) -> i64 {
    n * ERAS_PER_DAY
}

/// Loan above the price, lending token0
pub fn loan_above(pool: &Pool) -> LoanRequest {
    LoanRequest {
        start_bin: 2060,
        strike_bin: 2061,
        owed_potential: vec![dec!(0.0001); 4],
        token_mix: Quantity::Value(dec!(0.5)),
        unlock_era: pool.era(),
        dead_era: Some(pool.era() + days(30)),
        twap: None,
    }
}

/// Single-bin loan below the price, lending token1
pub fn loan_below(pool: &Pool) -> LoanRequest {
    LoanRequest {
        start_bin: 2030,
        strike_bin: 2030,
        owed_potential: vec![dec!(0.0002)],
        token_mix: Quantity::Value(dec!(0.25)),
        unlock_era: pool.era(),
        dead_era: Some(pool.era() + days(10)),
        twap: None,
    }
}

pub fn open_loan(pool: &mut Pool, request: LoanRequest) -> SwapperId {
    pool.new_loan(BORROWER, request).unwrap().0
}

pub fn twap(pool: &Pool, token: tidal_amm::Token, eras: i64) -> Twap {
    Twap {
        until: pool.era() + eras,
        token,
    }
}

pub fn close(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}
