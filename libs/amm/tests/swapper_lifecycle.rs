mod common;

use common::*;
use tidal_amm::{dec, Decimal, EngineError, ErrorKind, LoanRequest, Quantity, Token, Twap};

fn twap_loan(pool: &mut tidal_amm::Pool, until: i64) -> tidal_amm::SwapperId {
    let request = LoanRequest {
        token_mix: Quantity::PosInf,
        twap: Some(twap(pool, Token::One, until)),
        ..loan_above(pool)
    };
    open_loan(pool, request)
}

#[test]
fn test_backing_continuous_at_twap_end() {
    let (mut pool, _) = seeded_pool();
    let id = twap_loan(&mut pool, days(2));
    let pos = pool.swapper(id).unwrap().clone();
    let until = pos.twap.unwrap().until;

    let scale = pool.backing(&pos, Token::One).unwrap();
    assert!(scale > Decimal::ZERO);
    for token in Token::BOTH {
        let before = pool.backing_at(&pos, token, until - 1).unwrap();
        let at = pool.backing_at(&pos, token, until).unwrap();
        assert!(
            close(before, at, scale * dec!(0.001)),
            "{token}: {before} vs {at}"
        );
    }
}

#[test]
fn test_twap_amount_bounded_below_by_expiry_floor() {
    let (mut pool, _) = seeded_pool();
    // TWAP in the lent token, ending a day before expiry
    let request = LoanRequest {
        token_mix: Quantity::PosInf,
        twap: Some(twap(&pool, Token::One, days(9))),
        ..loan_below(&pool)
    };
    let id = open_loan(&mut pool, request);
    let pos = pool.swapper(id).unwrap().clone();
    let capacity = pos.token_mix;

    let err = pool
        .reflow(BORROWER, id, Quantity::Value(Decimal::ZERO), pos.twap)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    let floor = match err {
        EngineError::TwapAmountBelowFloor { token: Token::One, floor, .. } => floor,
        other => panic!("unexpected error: {other}"),
    };
    assert!(floor > Decimal::ZERO);
    assert!(floor < capacity);

    let amount = (floor + capacity) / dec!(2);
    pool.reflow(BORROWER, id, Quantity::Value(amount), pos.twap)
        .unwrap();
    let pos = pool.swapper(id).unwrap().clone();
    let until = pos.twap.unwrap().until;
    for token in Token::BOTH {
        let before = pool.backing_at(&pos, token, until - 1).unwrap();
        let at = pool.backing_at(&pos, token, until).unwrap();
        assert!(at > Decimal::ZERO);
        assert!(
            close(before, at, before.max(at) * dec!(0.001)),
            "{token}: {before} vs {at}"
        );
    }
}

#[test]
fn test_twap_flow_matures_once_and_stays_matured() {
    let (mut pool, _) = seeded_pool();
    let amount = dec!(0.00001);
    let request = LoanRequest {
        token_mix: Quantity::Value(amount),
        twap: Some(twap(&pool, Token::One, days(2))),
        ..loan_above(&pool)
    };
    let id = open_loan(&mut pool, request);
    // the fixed token streams as a rate, only the expiry lump is scheduled
    assert_eq!(pool.pending_flows()[1], Decimal::ZERO);
    assert!(pool.pending_flows()[0] > Decimal::ZERO);
    assert_eq!(pool.matured_flows(), [Decimal::ZERO; 2]);

    pool.advance(days(1)).unwrap();
    assert!(close(pool.matured_flows()[1], amount / dec!(2), dec!(1e-20)));

    pool.advance(days(2)).unwrap();
    assert!(pool.swapper(id).unwrap().twap.is_none());
    let matured = pool.matured_flows();
    assert!(close(matured[1], amount, dec!(1e-20)), "matured {}", matured[1]);
    assert_eq!(matured[0], Decimal::ZERO);

    pool.reflow(BORROWER, id, Quantity::Value(dec!(0.5)), None)
        .unwrap();
    assert_eq!(pool.matured_flows(), matured);
    pool.advance(days(1)).unwrap();
    assert_eq!(pool.matured_flows(), matured);
    assert!(pool.pending_flows()[0] > Decimal::ZERO);
}

#[test]
fn test_unbounded_twap_amount_resolves_to_capacity() {
    let (mut pool, _) = seeded_pool();
    let id = twap_loan(&mut pool, days(1));
    let view = pool.peek(id).unwrap();
    assert!(view.twap_active);
    assert!(close(view.effective_mix, Decimal::ONE, dec!(1e-20)));

    let pos = pool.swapper(id).unwrap().clone();
    let over = pos.token_mix * dec!(1.01);
    let err = pool
        .reflow(BORROWER, id, Quantity::Value(over), pos.twap)
        .unwrap_err();
    assert!(matches!(err, EngineError::TwapAmountExceedsCapacity { token: Token::One, .. }));
}

#[test]
fn test_advance_concludes_twap() {
    let (mut pool, _) = seeded_pool();
    let id = twap_loan(&mut pool, 2048);
    pool.advance(4096).unwrap();
    let pos = pool.swapper(id).unwrap();
    assert!(pos.twap.is_none());
    assert!(close(pos.token_mix, Decimal::ONE, dec!(1e-12)));
    assert!(!pool.peek(id).unwrap().twap_active);
}

#[test]
fn test_noop_reset_and_reflow_are_symmetric() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_above(&pool);
    let id = open_loan(&mut pool, loan);
    let before = pool.bin_liquidity(2060, 2064).unwrap();
    let pos = pool.swapper(id).unwrap().clone();

    let deltas = pool.reset(BORROWER, id, pos.dead_era, pos.unlock_era).unwrap();
    assert_eq!(deltas.token0, Decimal::ZERO);
    assert_eq!(deltas.token1, Decimal::ZERO);
    assert_eq!(pool.bin_liquidity(2060, 2064).unwrap(), before);

    let deltas = pool.reflow(BORROWER, id, Quantity::Value(pos.token_mix), None).unwrap();
    assert_eq!(deltas.token0, Decimal::ZERO);
    assert_eq!(deltas.token1, Decimal::ZERO);
    assert_eq!(pool.swapper(id).unwrap().owe_limit, pos.owe_limit);
}

#[test]
fn test_reflow_moves_backing_between_tokens() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_above(&pool);
    let id = open_loan(&mut pool, loan);
    let before = pool.peek(id).unwrap().backing;
    let deltas = pool.reflow(BORROWER, id, Quantity::Value(dec!(1)), None).unwrap();
    let after = pool.peek(id).unwrap().backing;
    assert!(deltas.token1 > Decimal::ZERO);
    assert!(deltas.token0 < Decimal::ZERO);
    assert!(close(deltas.token1, after[1] - before[1], dec!(1e-20)));
    assert!(close(deltas.token0, after[0] - before[0], dec!(1e-20)));
}

#[test]
fn test_reflow_rejections() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_above(&pool);
    let id = open_loan(&mut pool, loan);

    let err = pool.reflow(STRANGER, id, Quantity::Value(dec!(0.5)), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = pool.reflow(BORROWER, id, Quantity::Value(dec!(1.5)), None).unwrap_err();
    assert_eq!(err, EngineError::TokenMixOutOfRange { mix: dec!(1.5) });

    let stale = Twap {
        until: pool.era(),
        token: Token::Zero,
    };
    let err = pool
        .reflow(BORROWER, id, Quantity::Value(dec!(0.5)), Some(stale))
        .unwrap_err();
    assert!(matches!(err, EngineError::EraNotInFuture { .. }));
}

#[test]
fn test_reset_rejects_expiry_before_unlock() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_above(&pool);
    let id = open_loan(&mut pool, loan);
    let err = pool
        .reset(BORROWER, id, Some(pool.era() + days(2)), pool.era() + days(5))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::ExpiryBeforeUnlock {
            dead_era: days(2),
            unlock_era: days(5)
        }
    );
}

#[test]
fn test_unwind_rules() {
    let (mut pool, _) = seeded_pool();

    let locked = LoanRequest {
        unlock_era: pool.era() + days(1),
        ..loan_above(&pool)
    };
    let id = open_loan(&mut pool, locked);
    assert!(matches!(
        pool.unwind(BORROWER, id).unwrap_err(),
        EngineError::SwapperLocked { .. }
    ));

    let perpetual = LoanRequest {
        dead_era: None,
        ..loan_below(&pool)
    };
    let id = open_loan(&mut pool, perpetual);
    assert_eq!(pool.unwind(BORROWER, id).unwrap_err(), EngineError::NoExpiry);
}

#[test]
fn test_unwind_returns_liquidity() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_above(&pool);
    let id = open_loan(&mut pool, loan);
    let deltas = pool.unwind(BORROWER, id).unwrap();
    // the borrower hands back token0 and receives its backing
    assert!(deltas.token1 < Decimal::ZERO);

    for bin in pool.bin_liquidity(2060, 2064).unwrap() {
        assert_eq!(bin.lent, Decimal::ZERO);
        assert_eq!(bin.owed, Decimal::ZERO);
    }
    let view = pool.peek(id).unwrap();
    assert!(view.unwound);
    assert_eq!(view.backing, [Decimal::ZERO; 2]);
    assert_eq!(pool.unwind(BORROWER, id).unwrap_err(), EngineError::SwapperUnwound);
}

#[test]
fn test_expiry_releases_lent_liquidity_and_matures_flows() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_below(&pool);
    let id = open_loan(&mut pool, loan);
    assert!(pool.bin_liquidity(2030, 2031).unwrap()[0].lent > Decimal::ZERO);
    assert!(pool.pending_flows()[1] > Decimal::ZERO);

    pool.advance(days(10)).unwrap();
    assert_eq!(pool.bin_liquidity(2030, 2031).unwrap()[0].lent, Decimal::ZERO);
    assert!(pool.matured_flows()[1] > Decimal::ZERO);
    assert!(pool.peek(id).unwrap().expired);
    assert!(matches!(
        pool.reflow(BORROWER, id, Quantity::Value(dec!(0.5)), None),
        Err(EngineError::SwapperExpired { .. })
    ));
}

#[test]
fn test_lenders_earn_share_of_spot_fees() {
    let (mut pool, _) = seeded_pool();
    let loan = loan_below(&pool);
    let id = open_loan(&mut pool, loan);
    assert_eq!(pool.peek(id).unwrap().pending_fees, [Decimal::ZERO; 2]);

    pool.swap(TRADER, Token::Zero, Quantity::PosInf, Some(dec!(0.835)))
        .unwrap();
    assert!(pool.price_info().tick_bin < 2030);
    let fees = pool.peek(id).unwrap().pending_fees;
    assert!(fees[0] > Decimal::ZERO);

    // realized fees are paid out with the unwind
    let deltas = pool.unwind(BORROWER, id).unwrap();
    let view = pool.peek(id).unwrap();
    assert_eq!(view.pending_fees, [Decimal::ZERO; 2]);
    assert!(deltas.token0 < Decimal::ZERO);
}
