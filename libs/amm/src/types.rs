//! Shared identifiers and value types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};

/// Engine clock tick. See [`crate::math::time`].
pub type Era = i64;

/// One side of the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    Zero,
    One,
}

impl Token {
    pub const BOTH: [Token; 2] = [Token::Zero, Token::One];

    pub fn index(self) -> usize {
        match self {
            Token::Zero => 0,
            Token::One => 1,
        }
    }

    pub fn other(self) -> Token {
        match self {
            Token::Zero => Token::One,
            Token::One => Token::Zero,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token{}", self.index())
    }
}

/// Account identity as seen by the engine. Ownership representation beyond
/// this opaque number belongs to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an LP position in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LpId(pub usize);

/// Index of a Swapper position in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapperId(pub usize);

/// Signed per-token amounts. Positive means the caller owes the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Deltas {
    pub token0: Decimal,
    pub token1: Decimal,
}

impl Deltas {
    pub const ZERO: Deltas = Deltas {
        token0: Decimal::ZERO,
        token1: Decimal::ZERO,
    };

    pub fn new(token0: Decimal, token1: Decimal) -> Self {
        Self { token0, token1 }
    }

    pub fn from_array(values: [Decimal; 2]) -> Self {
        Self::new(values[0], values[1])
    }

    pub fn of(token: Token, amount: Decimal) -> Self {
        match token {
            Token::Zero => Self::new(amount, Decimal::ZERO),
            Token::One => Self::new(Decimal::ZERO, amount),
        }
    }

    pub fn get(&self, token: Token) -> Decimal {
        match token {
            Token::Zero => self.token0,
            Token::One => self.token1,
        }
    }

    pub fn as_array(&self) -> [Decimal; 2] {
        [self.token0, self.token1]
    }
}

impl Add for Deltas {
    type Output = Deltas;

    fn add(self, rhs: Deltas) -> Deltas {
        Deltas::new(self.token0 + rhs.token0, self.token1 + rhs.token1)
    }
}

impl AddAssign for Deltas {
    fn add_assign(&mut self, rhs: Deltas) {
        *self = *self + rhs;
    }
}

impl Sub for Deltas {
    type Output = Deltas;

    fn sub(self, rhs: Deltas) -> Deltas {
        Deltas::new(self.token0 - rhs.token0, self.token1 - rhs.token1)
    }
}

impl Neg for Deltas {
    type Output = Deltas;

    fn neg(self) -> Deltas {
        Deltas::new(-self.token0, -self.token1)
    }
}
