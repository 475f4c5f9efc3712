//! Logarithm and exponential over [`Fixed`].
//!
//! `log_2` extracts one fractional bit per squaring, so it is accurate to
//! within one ulp. `exp_2` splits off the integer part as a shift and
//! approximates `2^f`, `f` in `[0, 1)`, with the Taylor series of `e^z` for
//! `z = f * ln 2` using a fixed number of terms.
//!
//! The pricing engine only ever sees these functions through the
//! [`Transcendental`] trait. A market must use one strategy for every cost
//! evaluation; mixing strategies breaks price monotonicity.

use std::fmt::Debug;

use crate::math::fixed::{FRACTION_BITS, Fixed, FixedPointError};
use crate::math::wide::U256;

/// Terms of the `e^z` series used by [`Fixed::exp_2`]. The truncation error
/// `z^20 / 20!` is below 2^-64 for every `z < ln 2`.
pub const PRECISE_EXP_TERMS: u32 = 20;

/// Terms of the short series used by [`CompactTaylor`]
pub const COMPACT_EXP_TERMS: u32 = 5;

const ONE_RAW: u128 = 1 << FRACTION_BITS;
const FRACTION_MASK: i128 = (1 << FRACTION_BITS) - 1;

/// `2^f` for `f` in `[0, 1)` given as raw fraction bits, as a raw 64.64
/// value in `[2^64, 2^65)`
fn exp_2_fraction(fraction: u128, terms: u32) -> u128 {
    let z = U256::full_mul(fraction, Fixed::LN_2.raw() as u128)
        .shr(FRACTION_BITS)
        .lo;
    let mut term = ONE_RAW;
    let mut sum = ONE_RAW;
    for k in 1..terms {
        term = U256::full_mul(term, z).shr(FRACTION_BITS).lo / u128::from(k);
        sum += term;
    }
    sum
}

fn exp_2_with_terms(x: Fixed, terms: u32) -> Result<Fixed, FixedPointError> {
    // floor for negative inputs keeps the fraction non-negative
    let integer = x.raw() >> FRACTION_BITS;
    let fraction = (x.raw() & FRACTION_MASK) as u128;
    if integer >= 128 {
        return Err(FixedPointError::Overflow);
    }
    if integer <= -128 {
        return Err(FixedPointError::Underflow);
    }
    let mantissa = exp_2_fraction(fraction, terms);
    if integer >= 0 {
        let shift = integer as u32;
        // the result must stay below 2^127
        if shift >= mantissa.leading_zeros() {
            return Err(FixedPointError::Overflow);
        }
        Ok(Fixed::from_raw((mantissa << shift) as i128))
    } else {
        let shift = integer.unsigned_abs() as u32;
        Ok(Fixed::from_raw((mantissa >> shift) as i128))
    }
}

impl Fixed {
    /// Binary logarithm
    pub fn log_2(self) -> Result<Self, FixedPointError> {
        if self.raw() <= 0 {
            return Err(FixedPointError::DomainError);
        }
        let raw = self.raw() as u128;
        let msb = 127 - raw.leading_zeros();
        let mut result =
            (i128::from(msb) - i128::from(FRACTION_BITS)) << FRACTION_BITS;

        // mantissa in [1, 2) with 127 fractional bits
        let mut mantissa = raw << (127 - msb);
        for bit in (0..FRACTION_BITS).rev() {
            let square = U256::full_mul(mantissa, mantissa);
            let carry = (square.hi >> 127) as u32;
            mantissa = square.shr(127 + carry).lo;
            result += i128::from(carry) << bit;
        }
        Ok(Self::from_raw(result))
    }

    /// Natural logarithm, `log_2(x) * ln 2`
    pub fn ln(self) -> Result<Self, FixedPointError> {
        self.log_2()?.mul(Self::LN_2)
    }

    /// Binary exponential
    pub fn exp_2(self) -> Result<Self, FixedPointError> {
        exp_2_with_terms(self, PRECISE_EXP_TERMS)
    }

    /// Natural exponential, `exp_2(x / ln 2)`
    pub fn exp(self) -> Result<Self, FixedPointError> {
        self.div(Self::LN_2)?.exp_2()
    }
}

/// Strategy for the transcendental functions used by the cost function
pub trait Transcendental:
    Clone + Copy + Debug + Default + Send + Sync + 'static
{
    /// Upper bound on the relative error of [`Self::exp`] for non-negative
    /// arguments. Negative arguments additionally lose up to one ulp to the
    /// final right shift.
    const EXP_RELATIVE_ERROR: f64;

    fn ln(x: Fixed) -> Result<Fixed, FixedPointError>;

    fn exp(x: Fixed) -> Result<Fixed, FixedPointError>;
}

/// Bit-extraction logarithm with the 20-term exponential series.
/// Relative error of `exp` is at most 2^-58.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryExpansion;

impl Transcendental for BinaryExpansion {
    const EXP_RELATIVE_ERROR: f64 = 3.5e-18;

    fn ln(x: Fixed) -> Result<Fixed, FixedPointError> {
        x.ln()
    }

    fn exp(x: Fixed) -> Result<Fixed, FixedPointError> {
        x.exp()
    }
}

/// Five-term exponential series, `1 + z + z^2/2 + z^3/6 + z^4/24`.
/// Cheaper, but `exp` is only accurate to within 1e-3 relative.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompactTaylor;

impl Transcendental for CompactTaylor {
    const EXP_RELATIVE_ERROR: f64 = 1e-3;

    fn ln(x: Fixed) -> Result<Fixed, FixedPointError> {
        x.ln()
    }

    fn exp(x: Fixed) -> Result<Fixed, FixedPointError> {
        exp_2_with_terms(x.div(Fixed::LN_2)?, COMPACT_EXP_TERMS)
    }
}
