//! Protocol constants for the Tidal engine
//!
//! Price discretization and clock parameters shared by every pool. These
//! are fixed at the protocol level; per-pool tunables live in
//! [`crate::pool_config`].

/// Number of tubs, the coarse price unit LP ranges are expressed in.
pub const TUBS: i64 = 1 << TUB_BITS;

/// Bits of tub resolution.
pub const TUB_BITS: u32 = 12;

/// Tub `t` has lower price `1.01^(t - TUBS/2)`. Numerator and denominator of
/// the per-tub price ratio.
pub const TUB_RATIO_NUM: i64 = 101;
pub const TUB_RATIO_DEN: i64 = 100;

/// Bin granularity bounds. At `MIN_SPLITS` a bin is exactly one tub.
pub const MIN_SPLITS: u8 = TUB_BITS as u8;
pub const MAX_SPLITS: u8 = 20;

/// Clock resolution
pub mod clock {
    /// Bits of era resolution within one day; the decay table has one step
    /// per bit.
    pub const ERA_BITS_PER_DAY: u32 = 13;

    /// Eras per day (~10.5 seconds per era).
    pub const ERAS_PER_DAY: i64 = 1 << ERA_BITS_PER_DAY;

    /// Join-stage horizon granularity. A position poured at era `e` starts
    /// earning at the next multiple of this value strictly after `e`.
    pub const EARN_JUMP_ERAS: i64 = 1 << 10;

    /// Genesis era of a freshly created pool.
    pub const GENESIS_ERA: i64 = 0;
}

/// Rebase threshold expressed as a power of two: once the deflator falls
/// below `2^-REBASE_BITS` every inflated store is rescaled.
pub const REBASE_BITS: u32 = 20;

/// Token count per pool
pub const TOKENS: usize = 2;
