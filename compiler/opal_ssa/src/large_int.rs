//! Sign/magnitude integer immediates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer immediate large enough for the full `i64`/`u64` range.
///
/// Stored as sign + magnitude so both `u64::MAX` and `i64::MIN` are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LargeInt {
    negative: bool,
    magnitude: u64,
}

impl LargeInt {
    pub fn new(negative: bool, magnitude: u64) -> Self {
        Self {
            negative: negative && magnitude != 0,
            magnitude,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude == 0
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The two's-complement bit pattern, 64 bits wide.
    pub fn to_bits(&self) -> u64 {
        if self.negative {
            (self.magnitude as i64).wrapping_neg() as u64
        } else {
            self.magnitude
        }
    }

    pub fn to_u64(&self) -> u64 {
        self.magnitude
    }

    pub fn to_i64(&self) -> i64 {
        self.to_bits() as i64
    }

    pub fn to_i32(&self) -> i32 {
        self.to_i64() as i32
    }
}

impl From<u64> for LargeInt {
    fn from(value: u64) -> Self {
        Self::new(false, value)
    }
}

impl From<i64> for LargeInt {
    fn from(value: i64) -> Self {
        Self::new(value < 0, value.unsigned_abs())
    }
}

impl From<u32> for LargeInt {
    fn from(value: u32) -> Self {
        Self::from(value as u64)
    }
}

impl From<i32> for LargeInt {
    fn from(value: i32) -> Self {
        Self::from(value as i64)
    }
}

impl PartialEq<i64> for LargeInt {
    fn eq(&self, other: &i64) -> bool {
        *self == LargeInt::from(*other)
    }
}

impl fmt::Display for LargeInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips() {
        assert_eq!(LargeInt::from(-1i64).to_i64(), -1);
        assert_eq!(LargeInt::from(u64::MAX).to_u64(), u64::MAX);
        assert_eq!(LargeInt::from(i64::MIN).to_i64(), i64::MIN);
    }

    #[test]
    fn test_bits() {
        assert_eq!(LargeInt::from(-1i64).to_bits(), u64::MAX);
        assert_eq!(LargeInt::from(7i64).to_bits(), 7);
    }

    #[test]
    fn test_negative_zero_normalizes() {
        assert_eq!(LargeInt::new(true, 0), LargeInt::from(0i64));
        assert_eq!(LargeInt::new(true, 0).to_string(), "0");
    }
}
