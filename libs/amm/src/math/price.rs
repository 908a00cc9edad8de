//! Price discretization
//!
//! Log-price is split into `BINS = 2^splits` equal bins. Tubs are the coarse
//! LP unit (`TUBS = 4096`, ratio 1.01 per tub); every tub spans
//! `2^(splits - 12)` bins. Edges are tubs re-centred on price 1.
//!
//! Inside bin `b` the sqrt price runs from `lower_sqrt(b)` to
//! `lower_sqrt(b + 1)`, log-linearly in the bin fraction.

use super::{exp, ln};
use crate::error::{EngineError, Result};
use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tidal_config::protocol::{MAX_SPLITS, MIN_SPLITS, TUBS, TUB_BITS, TUB_RATIO_DEN, TUB_RATIO_NUM};

pub type Bin = i64;

/// ln(1.01), the log-width of one tub
pub static LOG_TUB: Lazy<Decimal> = Lazy::new(|| {
    ln(Decimal::from(TUB_RATIO_NUM) / Decimal::from(TUB_RATIO_DEN)).unwrap_or_default()
});

/// Bin geometry for one `splits` setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceGrid {
    splits: u8,
    log_bin: Decimal,
    half_log_bin: Decimal,
}

impl PriceGrid {
    pub fn new(splits: u8) -> Result<Self> {
        if !(MIN_SPLITS..=MAX_SPLITS).contains(&splits) {
            return Err(EngineError::InvalidRange {
                start: splits as i64,
                stop: splits as i64 + 1,
                limit: MAX_SPLITS as i64 + 1,
            });
        }
        let sub = (splits as u32 - TUB_BITS) as i64;
        let log_bin = *LOG_TUB / Decimal::from(1i64 << sub);
        Ok(Self {
            splits,
            log_bin,
            half_log_bin: log_bin / Decimal::TWO,
        })
    }

    pub fn splits(&self) -> u8 {
        self.splits
    }

    /// `2^splits`
    pub fn bins(&self) -> Bin {
        1 << self.splits
    }

    /// Log-price width of one bin
    pub fn log_bin(&self) -> Decimal {
        self.log_bin
    }

    /// Log-sqrt-price width of one bin
    pub fn half_log_bin(&self) -> Decimal {
        self.half_log_bin
    }

    fn sub_splits(&self) -> u32 {
        self.splits as u32 - TUB_BITS
    }

    pub fn tub_to_bin(&self, tub: i64) -> Bin {
        tub << self.sub_splits()
    }

    pub fn bin_to_tub(&self, bin: Bin) -> i64 {
        bin >> self.sub_splits()
    }

    /// Bins per tub
    pub fn bins_per_tub(&self) -> Bin {
        1 << self.sub_splits()
    }

    /// Bin offset from the price-1 midpoint, as a decimal position
    fn centred(&self, bin: Bin, frac: Decimal) -> Decimal {
        Decimal::from(bin - self.bins() / 2) + frac
    }

    /// Sqrt price at fractional position `frac` inside `bin`
    pub fn sqrt_price_at(&self, bin: Bin, frac: Decimal) -> Decimal {
        exp(self.half_log_bin * self.centred(bin, frac))
    }

    /// Sqrt price of the lower edge of `bin`
    pub fn lower_sqrt(&self, bin: Bin) -> Decimal {
        self.sqrt_price_at(bin, Decimal::ZERO)
    }

    /// Sqrt price of the upper edge of `bin`
    pub fn upper_sqrt(&self, bin: Bin) -> Decimal {
        self.sqrt_price_at(bin, Decimal::ONE)
    }

    /// Geometric midpoint sqrt price of `bin`
    pub fn sqrt_strike(&self, bin: Bin) -> Decimal {
        self.sqrt_price_at(bin, dec!(0.5))
    }

    /// Geometric midpoint price of `bin`
    pub fn bin_strike(&self, bin: Bin) -> Decimal {
        exp(self.log_bin * self.centred(bin, dec!(0.5)))
    }

    /// Log price at a position
    pub fn log_price(&self, bin: Bin, frac: Decimal) -> Decimal {
        self.log_bin * self.centred(bin, frac)
    }

    /// Position `(bin, frac)` of a price, clamped to the grid
    pub fn position_of(&self, price: Decimal) -> Result<(Bin, Decimal)> {
        let log_price = ln(price).ok_or(EngineError::NonPositive {
            field: "price",
            value: price,
        })?;
        let pos = log_price / self.log_bin + Decimal::from(self.bins() / 2);
        let floor = pos.floor();
        let bin = floor
            .to_i64()
            .ok_or(EngineError::Overflow { context: "price position" })?;
        if bin < 0 {
            return Ok((0, Decimal::ZERO));
        }
        if bin >= self.bins() {
            return Ok((self.bins() - 1, Decimal::ONE));
        }
        Ok((bin, pos - floor))
    }

    /// Fraction of `bin` at which the sqrt price equals `sqrt_price`
    pub fn frac_of(&self, bin: Bin, sqrt_price: Decimal) -> Decimal {
        let lower = self.lower_sqrt(bin);
        match ln(sqrt_price / lower) {
            Some(log) => (log / self.half_log_bin).max(Decimal::ZERO).min(Decimal::ONE),
            None => Decimal::ZERO,
        }
    }

    /// Token0 held by one unit of liquidity between two sqrt prices
    pub fn reserve0(&self, sqrt_low: Decimal, sqrt_high: Decimal) -> Decimal {
        if sqrt_high <= sqrt_low || sqrt_low.is_zero() {
            return Decimal::ZERO;
        }
        Decimal::ONE / sqrt_low - Decimal::ONE / sqrt_high
    }

    /// Token1 held by one unit of liquidity between two sqrt prices
    pub fn reserve1(&self, sqrt_low: Decimal, sqrt_high: Decimal) -> Decimal {
        if sqrt_high <= sqrt_low {
            return Decimal::ZERO;
        }
        sqrt_high - sqrt_low
    }

    /// Value of one unit of liquidity across a full bin in √-price-neutral
    /// units (token1 value divided by the bin's sqrt strike)
    pub fn bin_value(&self, bin: Bin) -> Decimal {
        self.reserve1(self.lower_sqrt(bin), self.upper_sqrt(bin)) / self.sqrt_strike(bin)
    }
}

/// Re-centre a tub on price 1
pub fn tub_to_edge(tub: i64) -> i64 {
    tub - TUBS / 2
}

pub fn edge_to_tub(edge: i64) -> i64 {
    edge + TUBS / 2
}

/// Price at an edge, `1.01^edge`
pub fn edge_price(edge: i64) -> Decimal {
    exp(*LOG_TUB * Decimal::from(edge))
}
