//! Token unit conversion with standardized rounding.
//!
//! Collateral and outcome-token ledgers count in integer units scaled by the
//! collateral token's `decimals`. The market maker prices in [`Fixed`]
//! whole-token values. This module converts between the two with an explicit
//! rounding direction.
//!
//! # Rounding Conventions
//! - `Rounding::Up` (ceil): use for costs charged TO a user
//! - `Rounding::Down` (floor): use for amounts paid TO a user

use crate::math::fixed::{FRACTION_BITS, Fixed, FixedPointError};
use crate::math::wide::U256;

/// Largest decimal count whose unit fits in a `u128`
pub const MAX_DECIMALS: u8 = 38;

/// Rounding strategy for fixed-point to token-unit conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Round up (ceil) - use for costs charged TO a user.
    Up,
    /// Round down (floor) - use for amounts paid TO a user.
    Down,
}

/// `10^decimals`, the integer size of one whole token
pub fn decimal_unit(decimals: u8) -> Result<u128, FixedPointError> {
    if decimals > MAX_DECIMALS {
        return Err(FixedPointError::Overflow);
    }
    Ok(10u128.pow(u32::from(decimals)))
}

/// Convert an integer token amount to whole tokens.
///
/// # Examples
/// ```
/// use lslmsr_amm::math::{fixed::Fixed, tokens::from_token_units};
///
/// let value = from_token_units(2_500_000, 6).unwrap();
/// assert_eq!(value, Fixed::from_ratio(5, 2).unwrap());
/// ```
pub fn from_token_units(
    amount: u128,
    decimals: u8,
) -> Result<Fixed, FixedPointError> {
    Fixed::divu(amount, decimal_unit(decimals)?)
}

/// Convert whole tokens to an integer token amount.
///
/// # Errors
/// Returns `FixedPointError` if:
/// - `value` is negative (`DomainError`)
/// - the amount does not fit in a `u128` (`Overflow`)
///
/// # Examples
/// ```
/// use lslmsr_amm::math::{fixed::Fixed, tokens::{to_token_units, Rounding}};
///
/// let third = Fixed::from_ratio(1, 3).unwrap();
/// // Costs round up
/// assert_eq!(to_token_units(third, 2, Rounding::Up).unwrap(), 34);
/// // Payouts round down
/// assert_eq!(to_token_units(third, 2, Rounding::Down).unwrap(), 33);
/// ```
pub fn to_token_units(
    value: Fixed,
    decimals: u8,
    mode: Rounding,
) -> Result<u128, FixedPointError> {
    if value.is_negative() {
        return Err(FixedPointError::DomainError);
    }
    let unit = decimal_unit(decimals)?;
    let product = U256::full_mul(value.raw() as u128, unit);
    let floor = product
        .shr(FRACTION_BITS)
        .to_u128()
        .ok_or(FixedPointError::Overflow)?;
    let has_remainder = product.lo & u128::from(u64::MAX) != 0;
    match mode {
        Rounding::Up if has_remainder => {
            floor.checked_add(1).ok_or(FixedPointError::Overflow)
        }
        _ => Ok(floor),
    }
}
