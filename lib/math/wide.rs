//! 256-bit unsigned intermediates for 64.64 arithmetic.
//!
//! Only the handful of operations the fixed-point layer needs are provided:
//! a full 128x128 product, shifts, and division by a 128-bit divisor.

const LO_MASK: u128 = u64::MAX as u128;

/// 256-bit unsigned integer as two 128-bit halves
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256 {
    pub hi: u128,
    pub lo: u128,
}

impl U256 {
    pub const ZERO: Self = Self { hi: 0, lo: 0 };

    pub const fn new(hi: u128, lo: u128) -> Self {
        Self { hi, lo }
    }

    pub const fn from_u128(lo: u128) -> Self {
        Self { hi: 0, lo }
    }

    /// Full product of two 128-bit values, never overflows
    pub fn full_mul(a: u128, b: u128) -> Self {
        let (a0, a1) = (a & LO_MASK, a >> 64);
        let (b0, b1) = (b & LO_MASK, b >> 64);

        let ll = a0 * b0;
        let lh = a0 * b1;
        let hl = a1 * b0;
        let hh = a1 * b1;

        // < 3 * 2^64, cannot overflow
        let mid = (ll >> 64) + (lh & LO_MASK) + (hl & LO_MASK);

        Self {
            lo: (ll & LO_MASK) | (mid << 64),
            hi: hh + (lh >> 64) + (hl >> 64) + (mid >> 64),
        }
    }

    pub fn shr(self, shift: u32) -> Self {
        match shift {
            0 => self,
            1..=127 => Self {
                hi: self.hi >> shift,
                lo: (self.lo >> shift) | (self.hi << (128 - shift)),
            },
            128..=255 => Self {
                hi: 0,
                lo: self.hi >> (shift - 128),
            },
            _ => Self::ZERO,
        }
    }

    pub fn shl(self, shift: u32) -> Self {
        match shift {
            0 => self,
            1..=127 => Self {
                hi: (self.hi << shift) | (self.lo >> (128 - shift)),
                lo: self.lo << shift,
            },
            128..=255 => Self {
                hi: self.lo << (shift - 128),
                lo: 0,
            },
            _ => Self::ZERO,
        }
    }

    /// Returns the low half if the high half is empty
    pub fn to_u128(self) -> Option<u128> {
        (self.hi == 0).then_some(self.lo)
    }

    fn bit(&self, index: u32) -> bool {
        if index < 128 {
            (self.lo >> index) & 1 == 1
        } else {
            (self.hi >> (index - 128)) & 1 == 1
        }
    }

    fn set_bit(&mut self, index: u32) {
        if index < 128 {
            self.lo |= 1 << index;
        } else {
            self.hi |= 1 << (index - 128);
        }
    }

    /// Restoring long division, one quotient bit per step.
    /// Returns `None` when `divisor` is zero.
    pub fn div_u128(self, divisor: u128) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        let mut quotient = Self::ZERO;
        let mut rem: u128 = 0;
        for index in (0..256).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | u128::from(self.bit(index));
            if carry == 1 || rem >= divisor {
                rem = rem.wrapping_sub(divisor);
                quotient.set_bit(index);
            }
        }
        Some(quotient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mul_max() {
        // (2^128 - 1)^2 = 2^256 - 2^129 + 1
        let product = U256::full_mul(u128::MAX, u128::MAX);
        assert_eq!(product.lo, 1);
        assert_eq!(product.hi, u128::MAX - 1);
    }

    #[test]
    fn test_full_mul_small() {
        let product = U256::full_mul(1 << 64, 1 << 64);
        assert_eq!(product, U256::new(1, 0));
        assert_eq!(U256::full_mul(6, 7), U256::from_u128(42));
    }

    #[test]
    fn test_shifts() {
        let value = U256::new(1, 1);
        assert_eq!(value.shr(1), U256::new(0, 1 << 127));
        assert_eq!(value.shr(128), U256::from_u128(1));
        assert_eq!(value.shl(127), U256::new(1 << 127, 1 << 127));
        assert_eq!(U256::from_u128(1).shl(200), U256::new(1 << 72, 0));
        assert_eq!(value.shr(300), U256::ZERO);
    }

    #[test]
    fn test_div_u128() {
        let dividend = U256::full_mul(u128::MAX, 12345);
        let quotient = dividend.div_u128(12345).unwrap();
        assert_eq!(quotient.to_u128(), Some(u128::MAX));

        let quotient = U256::from_u128(100).div_u128(7).unwrap();
        assert_eq!(quotient.to_u128(), Some(14));

        assert!(U256::from_u128(1).div_u128(0).is_none());
    }

    #[test]
    fn test_div_u128_large_divisor() {
        // divisor with the top bit set exercises the carry path
        let divisor = (1u128 << 127) + 3;
        let dividend = U256::full_mul(divisor, 1 << 100);
        let quotient = dividend.div_u128(divisor).unwrap();
        assert_eq!(quotient.to_u128(), Some(1 << 100));
    }
}
