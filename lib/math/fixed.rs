//! Signed 64.64 fixed-point arithmetic.
//!
//! A [`Fixed`] is an `i128` scaled by 2^64. Every operation is checked:
//! a result outside `[Fixed::MIN, Fixed::MAX]` is an error, never a wrapped
//! value. Pricing must be bit-for-bit reproducible, so nothing in this module
//! touches floating point except [`Fixed::to_f64`], which exists for
//! diagnostics and tests.

use std::cmp::Ordering;
use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::wide::U256;

/// Number of fractional bits
pub const FRACTION_BITS: u32 = 64;

/// Largest integer magnitude accepted by [`Fixed::from_int`] and
/// [`Fixed::from_uint`]
pub const MAX_INTEGER: u128 = i64::MAX as u128;

/// Raw magnitude of `i128::MIN`, which has no positive counterpart
const MIN_MAGNITUDE: u128 = 1 << 127;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("fixed-point overflow")]
    Overflow,
    #[error("fixed-point underflow")]
    Underflow,
    #[error("division by zero")]
    DivideByZero,
    #[error("argument outside the function domain")]
    DomainError,
}

/// Signed 64.64 fixed-point number
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct Fixed(i128);

// Checked arithmetic returns `Result`, so the std operator traits do not fit
#[allow(clippy::should_implement_trait)]
impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1 << FRACTION_BITS);
    pub const MIN: Self = Self(i128::MIN);
    pub const MAX: Self = Self(i128::MAX);
    /// ln(2), rounded to nearest
    pub const LN_2: Self = Self(0xB17217F7D1CF79AC);

    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub fn from_int(value: i128) -> Result<Self, FixedPointError> {
        if value.unsigned_abs() > MAX_INTEGER {
            return Err(FixedPointError::Overflow);
        }
        Ok(Self(value << FRACTION_BITS))
    }

    pub fn from_uint(value: u128) -> Result<Self, FixedPointError> {
        if value > MAX_INTEGER {
            return Err(FixedPointError::Overflow);
        }
        Ok(Self((value as i128) << FRACTION_BITS))
    }

    /// Integer part, truncated toward zero
    pub fn to_int(self) -> i64 {
        // |self / ONE| < 2^63 for every i128, so the cast is lossless
        (self.0 / Self::ONE.0) as i64
    }

    /// Integer part, truncated toward zero
    pub fn to_uint(self) -> Result<u64, FixedPointError> {
        if self.0 < 0 {
            return Err(FixedPointError::DomainError);
        }
        Ok((self.0 >> FRACTION_BITS) as u64)
    }

    /// `numerator / denominator` as a fixed-point value
    pub fn from_ratio(
        numerator: i128,
        denominator: i128,
    ) -> Result<Self, FixedPointError> {
        Self::from_int(numerator)?.div(Self::from_int(denominator)?)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn neg(self) -> Result<Self, FixedPointError> {
        self.0
            .checked_neg()
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    pub fn abs(self) -> Result<Self, FixedPointError> {
        self.0
            .checked_abs()
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    pub fn add(self, other: Self) -> Result<Self, FixedPointError> {
        self.0.checked_add(other.0).map(Self).ok_or(
            // both operands share a sign whenever the sum leaves the range
            if other.0 > 0 {
                FixedPointError::Overflow
            } else {
                FixedPointError::Underflow
            },
        )
    }

    pub fn sub(self, other: Self) -> Result<Self, FixedPointError> {
        self.0.checked_sub(other.0).map(Self).ok_or(if other.0 < 0 {
            FixedPointError::Overflow
        } else {
            FixedPointError::Underflow
        })
    }

    /// Product of two values, truncated toward zero
    pub fn mul(self, other: Self) -> Result<Self, FixedPointError> {
        let negative = (self.0 < 0) != (other.0 < 0);
        let product =
            U256::full_mul(self.0.unsigned_abs(), other.0.unsigned_abs())
                .shr(FRACTION_BITS);
        Self::from_magnitude(product, negative)
    }

    /// Quotient of two values, truncated toward zero
    pub fn div(self, other: Self) -> Result<Self, FixedPointError> {
        if other.0 == 0 {
            return Err(FixedPointError::DivideByZero);
        }
        let negative = (self.0 < 0) != (other.0 < 0);
        let quotient = U256::from_u128(self.0.unsigned_abs())
            .shl(FRACTION_BITS)
            .div_u128(other.0.unsigned_abs())
            .ok_or(FixedPointError::DivideByZero)?;
        Self::from_magnitude(quotient, negative)
    }

    /// `numerator / denominator` for unsigned integers, e.g. a raw token
    /// amount over the token's decimal unit
    pub fn divu(
        numerator: u128,
        denominator: u128,
    ) -> Result<Self, FixedPointError> {
        if denominator == 0 {
            return Err(FixedPointError::DivideByZero);
        }
        let quotient = U256::from_u128(numerator)
            .shl(FRACTION_BITS)
            .div_u128(denominator)
            .ok_or(FixedPointError::DivideByZero)?;
        Self::from_magnitude(quotient, false)
    }

    /// `self * multiplier` as an unsigned integer, truncated toward zero
    pub fn mulu(self, multiplier: u128) -> Result<u128, FixedPointError> {
        if self.0 < 0 {
            return Err(FixedPointError::DomainError);
        }
        U256::full_mul(self.0 as u128, multiplier)
            .shr(FRACTION_BITS)
            .to_u128()
            .ok_or(FixedPointError::Overflow)
    }

    /// Lossy conversion for display and test assertions
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1u128 << FRACTION_BITS) as f64
    }

    fn from_magnitude(
        magnitude: U256,
        negative: bool,
    ) -> Result<Self, FixedPointError> {
        let overflow = if negative {
            FixedPointError::Underflow
        } else {
            FixedPointError::Overflow
        };
        let magnitude = magnitude.to_u128().ok_or(overflow)?;
        match (negative, magnitude.cmp(&MIN_MAGNITUDE)) {
            (false, Ordering::Less) => Ok(Self(magnitude as i128)),
            (true, Ordering::Less) => Ok(Self(-(magnitude as i128))),
            (true, Ordering::Equal) => Ok(Self::MIN),
            _ => Err(overflow),
        }
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({self})")
    }
}

/// Renders the exact binary value rounded down to 18 decimal places
impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DECIMALS: u128 = 1_000_000_000_000_000_000;
        let magnitude = self.0.unsigned_abs();
        let integer = magnitude >> FRACTION_BITS;
        let fraction = magnitude & ((1 << FRACTION_BITS) - 1);
        let decimals = U256::full_mul(fraction, DECIMALS)
            .shr(FRACTION_BITS)
            .lo;
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{integer}.{decimals:018}")
    }
}
