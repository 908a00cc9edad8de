mod common;

use common::*;
use tidal_amm::{
    dec, AccountId, Action, Decimal, EngineError, ErrorKind, MemoryLedger, Payment, Quantity, Result,
    SettlementCallback, Token, TokenLedger,
};

const POOL_ACCOUNT: AccountId = AccountId(100);

/// Pays from a treasury account, optionally short by one unit
struct Treasury {
    account: AccountId,
    short: bool,
}

impl SettlementCallback for Treasury {
    fn on_settle(&mut self, ledger: &mut dyn TokenLedger, pool: AccountId, owed: [i128; 2], data: &[u8]) -> Result<()> {
        assert_eq!(data, b"route-7");
        for token in Token::BOTH {
            let mut amount = owed[token.index()];
            if self.short && amount > 0 {
                amount -= 1;
            }
            ledger.transfer(self.account, pool, token, amount)?;
        }
        Ok(())
    }
}

fn funded_ledger() -> MemoryLedger {
    let mut ledger = MemoryLedger::new();
    for account in [PROVIDER, TRADER] {
        ledger.mint(account, Token::Zero, 1_000_000_000_000);
        ledger.mint(account, Token::One, 1_000_000_000_000_000_000_000_000);
    }
    ledger
}

#[test]
fn test_pour_then_swap_through_direct_settlement() {
    let mut pool = empty_pool();
    let mut ledger = funded_ledger();
    let settlement = pool.settlement(POOL_ACCOUNT);

    let (lp, amounts) = pool
        .settled(&settlement, &mut ledger, PROVIDER, Payment::Direct, |pool| {
            pool.pour(PROVIDER, 2040, 2056, dec!(100))
        })
        .unwrap();
    assert_eq!(lp.0, 0);
    assert!(amounts[0] > 0 && amounts[1] > 0);
    assert_eq!(ledger.balance(POOL_ACCOUNT, Token::Zero), amounts[0]);

    let (_, swapped) = pool
        .settled(&settlement, &mut ledger, TRADER, Payment::Direct, |pool| {
            let deltas = pool.swap(TRADER, Token::Zero, Quantity::Value(dec!(0.1)), None)?;
            Ok(((), deltas))
        })
        .unwrap();
    // 0.1 token0 at 6 decimals in (rounded up), token1 out
    assert!((100_000..=100_001).contains(&swapped[0]));
    assert!(swapped[1] < 0);
    assert_eq!(ledger.balance(POOL_ACCOUNT, Token::One), amounts[1] + swapped[1]);
}

#[test]
fn test_failed_payment_rolls_back_pool() {
    let mut pool = empty_pool();
    let mut ledger = MemoryLedger::new();
    let settlement = pool.settlement(POOL_ACCOUNT);

    let err = pool
        .settled(&settlement, &mut ledger, STRANGER, Payment::Direct, |pool| {
            pool.pour(STRANGER, 2040, 2056, dec!(100))
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    assert_eq!(pool.lp_count(), 0);
    assert!(pool.events().is_empty());
}

#[test]
fn test_callback_settlement_must_match_exactly() {
    let mut pool = empty_pool();
    let mut ledger = funded_ledger();
    let treasury = AccountId(50);
    ledger.mint(treasury, Token::Zero, 1_000_000_000_000);
    ledger.mint(treasury, Token::One, 1_000_000_000_000_000_000_000_000);
    let settlement = pool.settlement(POOL_ACCOUNT);

    let mut short = Treasury { account: treasury, short: true };
    let payment = Payment::Callback {
        payer: &mut short,
        data: b"route-7".to_vec(),
    };
    let err = pool
        .settled(&settlement, &mut ledger, PROVIDER, payment, |pool| {
            pool.pour(PROVIDER, 2040, 2056, dec!(100))
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Settlement);
    assert_eq!(pool.lp_count(), 0);
    assert_eq!(ledger.balance(POOL_ACCOUNT, Token::Zero), 0);

    let mut honest = Treasury { account: treasury, short: false };
    let payment = Payment::Callback {
        payer: &mut honest,
        data: b"route-7".to_vec(),
    };
    pool.settled(&settlement, &mut ledger, PROVIDER, payment, |pool| {
        pool.pour(PROVIDER, 2040, 2056, dec!(100))
    })
    .unwrap();
    assert_eq!(pool.lp_count(), 1);
}

#[test]
fn test_batch_settles_netted_deltas_once() {
    let (mut pool, _) = seeded_pool();
    let mut ledger = funded_ledger();
    // the seeded liquidity never went through the ledger
    ledger.mint(POOL_ACCOUNT, Token::Zero, 1_000_000_000_000);
    ledger.mint(POOL_ACCOUNT, Token::One, 1_000_000_000_000_000_000_000_000);
    let settlement = pool.settlement(POOL_ACCOUNT);
    let actions = vec![
        Action::Swap {
            token: Token::One,
            shove: Quantity::Value(dec!(2)),
            limit_price: None,
        },
        Action::Swap {
            token: Token::One,
            shove: Quantity::Value(dec!(-1)),
            limit_price: None,
        },
    ];

    let (outcome, amounts) = pool
        .settled(&settlement, &mut ledger, TRADER, Payment::Direct, |pool| {
            let outcome = pool.batch(TRADER, &actions)?;
            let deltas = outcome.deltas;
            Ok((outcome, deltas))
        })
        .unwrap();
    assert_eq!(outcome.outcomes.len(), 2);
    assert!(close(outcome.deltas.token1, dec!(1), dec!(1e-18)));
    assert!(outcome.deltas.token0 < Decimal::ZERO);
    assert!((amounts[1] - 1_000_000_000_000_000_000).abs() <= 1);
    assert!(amounts[0] < 0);
}
