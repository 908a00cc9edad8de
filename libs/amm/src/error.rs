//! Engine errors
//!
//! Every rejected operation surfaces one distinct variant. Variants are
//! grouped by [`ErrorKind`] so hosts can route failures without matching on
//! every case.

use crate::Token;
use rust_decimal::Decimal;
use thiserror::Error;
use tidal_config::SettingsError;

/// Broad class of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed ranges, non-positive amounts, undefined values
    Input,
    /// Wrong LP stage, expired or locked Swapper, creation disabled
    Lifecycle,
    /// Utilization cap, price inside a requested range, missing liquidity
    Capacity,
    /// Caller does not own the position
    Authorization,
    /// Payment could not be collected or verified
    Settlement,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // --- input validation ---
    #[error("invalid range [{start}, {stop}): must satisfy 0 <= start < stop <= {limit}")]
    InvalidRange { start: i64, stop: i64, limit: i64 },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("{field} is not a number")]
    NotANumber { field: &'static str },

    #[error("{field} must be finite")]
    Unbounded { field: &'static str },

    #[error("owed potential must contain at least one bin")]
    EmptyOwedPotential,

    #[error("owed potential at offset {index} is negative ({value})")]
    NegativeOwedPotential { index: usize, value: Decimal },

    #[error("owed potential sums to zero")]
    ZeroOwedPotential,

    #[error("single-bin strike {strike} must equal start bin {start}")]
    UnalignedStrike { start: i64, strike: i64 },

    #[error("strike bin may not be zero for a single-bin range")]
    StrikeAtZero,

    #[error("strike bin {strike} lies outside [{start}, {stop})")]
    StrikeOutsideRange { start: i64, strike: i64, stop: i64 },

    #[error("owed potential cannot be tilted around strike bin {strike}: all weight lies on one side")]
    TiltInfeasible { strike: i64 },

    #[error("token mix {mix} outside [0, 1]")]
    TokenMixOutOfRange { mix: Decimal },

    #[error("fixed {token} amount {amount} exceeds capacity {capacity}")]
    TwapAmountExceedsCapacity {
        token: Token,
        amount: Decimal,
        capacity: Decimal,
    },

    #[error("fixed {token} amount {amount} is below the expiry floor {floor}")]
    TwapAmountBelowFloor {
        token: Token,
        amount: Decimal,
        floor: Decimal,
    },

    #[error("invalid pool settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("expiry era {dead_era} precedes unlock era {unlock_era}")]
    ExpiryBeforeUnlock { dead_era: i64, unlock_era: i64 },

    #[error("twap end era {twap_until} must precede expiry era {dead_era}")]
    TwapBeyondExpiry { twap_until: i64, dead_era: i64 },

    #[error("era {era} is not in the future (current era {now})")]
    EraNotInFuture { era: i64, now: i64 },

    #[error("limit price {price} must be positive")]
    InvalidLimitPrice { price: Decimal },

    // --- state / lifecycle ---
    #[error("unknown LP position {0}")]
    UnknownLp(usize),

    #[error("unknown swapper position {0}")]
    UnknownSwapper(usize),

    #[error("LP position is still joining until era {earn_era} (now {era})")]
    StillJoining { earn_era: i64, era: i64 },

    #[error("LP position is already draining")]
    AlreadyDraining,

    #[error("LP position is not in the join stage")]
    NotJoining,

    #[error("swapper creation has not been enabled")]
    SwapperCreationDisabled,

    #[error("swapper creation is already enabled")]
    SwapperCreationAlreadyEnabled,

    #[error("swapper position expired at era {dead_era}")]
    SwapperExpired { dead_era: i64 },

    #[error("swapper position has been unwound")]
    SwapperUnwound,

    #[error("swapper position is locked until era {unlock_era} (now {era})")]
    SwapperLocked { unlock_era: i64, era: i64 },

    #[error("swapper position has no expiry and cannot be unwound")]
    NoExpiry,

    #[error("clock step of {eras} eras is invalid")]
    InvalidClockStep { eras: i64 },

    #[error("a pool for {0}/{1} already exists")]
    PoolExists(String, String),

    #[error("no pool for {0}/{1}")]
    UnknownPool(String, String),

    #[error("a pool needs two distinct assets, got {0} twice")]
    IdenticalAssets(String),

    // --- capacity ---
    #[error("utilization {utilization} in bin {bin} would exceed cap {cap}")]
    UtilizationBreach {
        bin: i64,
        utilization: Decimal,
        cap: Decimal,
    },

    #[error("current price bin {tick_bin} lies inside requested range [{start}, {stop})")]
    PriceInRange { start: i64, stop: i64, tick_bin: i64 },

    #[error("bin {bin} has no liquidity to lend")]
    NoLiquidity { bin: i64 },

    #[error("insufficient {token} balance: need {needed}, have {available}")]
    InsufficientBalance {
        token: Token,
        needed: i128,
        available: i128,
    },

    #[error("numeric overflow while computing {context}")]
    Overflow { context: &'static str },

    // --- authorization ---
    #[error("caller {caller} does not own position (owner {owner})")]
    NotOwner { caller: u64, owner: u64 },

    // --- settlement ---
    #[error("{token} payment mismatch: expected {expected}, received {received}")]
    PaymentMismatch {
        token: Token,
        expected: i128,
        received: i128,
    },

    #[error("settlement callback failed: {0}")]
    CallbackFailed(String),
}

impl EngineError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            InvalidRange { .. }
            | NonPositive { .. }
            | NotANumber { .. }
            | Unbounded { .. }
            | EmptyOwedPotential
            | NegativeOwedPotential { .. }
            | ZeroOwedPotential
            | UnalignedStrike { .. }
            | StrikeAtZero
            | StrikeOutsideRange { .. }
            | TiltInfeasible { .. }
            | TokenMixOutOfRange { .. }
            | TwapAmountExceedsCapacity { .. }
            | TwapAmountBelowFloor { .. }
            | InvalidSettings(_)
            | ExpiryBeforeUnlock { .. }
            | TwapBeyondExpiry { .. }
            | EraNotInFuture { .. }
            | InvalidLimitPrice { .. }
            | IdenticalAssets(_) => ErrorKind::Input,
            UnknownLp(_)
            | UnknownSwapper(_)
            | StillJoining { .. }
            | AlreadyDraining
            | NotJoining
            | SwapperCreationDisabled
            | SwapperCreationAlreadyEnabled
            | SwapperExpired { .. }
            | SwapperUnwound
            | SwapperLocked { .. }
            | NoExpiry
            | InvalidClockStep { .. }
            | PoolExists(..)
            | UnknownPool(..) => ErrorKind::Lifecycle,
            UtilizationBreach { .. }
            | PriceInRange { .. }
            | NoLiquidity { .. }
            | InsufficientBalance { .. }
            | Overflow { .. } => ErrorKind::Capacity,
            NotOwner { .. } => ErrorKind::Authorization,
            PaymentMismatch { .. } | CallbackFailed(_) => ErrorKind::Settlement,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
