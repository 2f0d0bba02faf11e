//! AArch64 immediate encoding checks.

use std::sync::OnceLock;

use hashbrown::HashSet;

/// Whether the value can be encoded in an `FMOV` 8-bit float immediate.
///
/// The encodable values are ±(16..31)/16 × 2^(-3..4); we enumerate the 128
/// positive bit patterns once and look up the absolute value.
pub fn is_float_encodable(value: f64) -> bool {
    static ENCODABLE: OnceLock<HashSet<u64>> = OnceLock::new();

    let encodable = ENCODABLE.get_or_init(|| {
        let mut patterns = HashSet::new();

        for encoding in 0u64..128 {
            let mut bits = if encoding & 0x40 != 0 {
                0x3FC0_0000_0000_0000
            } else {
                0x4000_0000_0000_0000
            };
            bits |= (encoding & 0x3F) << 48;
            patterns.insert(bits);
        }

        patterns
    });

    encodable.contains(&value.abs().to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_floats_are_encodable() {
        assert!(is_float_encodable(1.0));
        assert!(is_float_encodable(-1.0));
        assert!(is_float_encodable(0.5));
        assert!(is_float_encodable(2.5));
        assert!(is_float_encodable(31.0));
    }

    #[test]
    fn test_unencodable_floats() {
        assert!(!is_float_encodable(0.0));
        assert!(!is_float_encodable(0.1));
        assert!(!is_float_encodable(1000.0));
        assert!(!is_float_encodable(3.141592653589793));
    }
}
