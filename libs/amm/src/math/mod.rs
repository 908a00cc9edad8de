//! Time and price mathematics
//!
//! Stateless conversions shared by every engine component: bin/tub/edge
//! discretization in [`price`], the era clock and stepped decay in
//! [`time`], and the decimal transcendental helpers below.
//!
//! `rust_decimal`'s built-in `exp` runs a fixed-length Taylor series that
//! loses precision (and eventually overflows) for arguments beyond a few
//! units, so `exp` and `ln` here use range reduction around powers of two.

pub mod price;
pub mod time;

pub use price::{Bin, PriceGrid};
pub use time::Clock;

use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

const SERIES_TERMS: u32 = 48;

/// ln 2 via `2·atanh(1/3)`
pub static LN_2: Lazy<Decimal> = Lazy::new(|| atanh_series(Decimal::ONE / dec!(3)) * Decimal::TWO);

/// `Σ z^(2n+1)/(2n+1)`, converges for |z| < 1
fn atanh_series(z: Decimal) -> Decimal {
    let z2 = z * z;
    let mut power = z;
    let mut sum = z;
    for n in 1..SERIES_TERMS {
        power *= z2;
        let term = power / Decimal::from(2 * n + 1);
        if term.is_zero() {
            break;
        }
        sum += term;
    }
    sum
}

/// Exact power of two for moderate exponents
fn pow2(k: u32) -> Option<Decimal> {
    if k > 95 {
        return None;
    }
    Some(Decimal::from_i128_with_scale(1i128 << k, 0))
}

/// `e^x`, `None` on overflow
pub fn checked_exp(x: Decimal) -> Option<Decimal> {
    if x.is_zero() {
        return Some(Decimal::ONE);
    }
    let k = (x / *LN_2).round();
    let r = x - k * *LN_2;

    let mut term = Decimal::ONE;
    let mut sum = Decimal::ONE;
    for n in 1..SERIES_TERMS {
        term = term * r / Decimal::from(n);
        if term.is_zero() {
            break;
        }
        sum += term;
    }

    let k = k.to_i64()?;
    if k >= 0 {
        sum.checked_mul(pow2(k as u32)?)
    } else {
        match pow2(k.unsigned_abs() as u32) {
            Some(scale) => Some(sum / scale),
            None => Some(Decimal::ZERO),
        }
    }
}

/// `e^x`, saturating at `Decimal::MAX`
pub fn exp(x: Decimal) -> Decimal {
    checked_exp(x).unwrap_or(Decimal::MAX)
}

/// Natural log, `None` for non-positive input
pub fn ln(x: Decimal) -> Option<Decimal> {
    if x <= Decimal::ZERO {
        return None;
    }
    let mut k = 0i64;
    let mut m = x;
    while m >= dec!(1.5) {
        m /= Decimal::TWO;
        k += 1;
    }
    while m < dec!(0.75) {
        m *= Decimal::TWO;
        k -= 1;
    }
    let z = (m - Decimal::ONE) / (m + Decimal::ONE);
    Some(Decimal::from(k) * *LN_2 + atanh_series(z) * Decimal::TWO)
}

/// Square root, zero for non-positive input
pub fn sqrt(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    x.sqrt().unwrap_or(Decimal::ZERO)
}

/// `sin(π/2 · t)` for `t ∈ [0, 1]`, the short-horizon ramp
pub fn quarter_wave(t: Decimal) -> Decimal {
    let x = Decimal::HALF_PI * t.max(Decimal::ZERO).min(Decimal::ONE);
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    for n in 1..SERIES_TERMS {
        term = -term * x2 / Decimal::from((2 * n) * (2 * n + 1));
        if term.is_zero() {
            break;
        }
        sum += term;
    }
    sum
}
