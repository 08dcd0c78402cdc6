use crate::error::{CivError, Result};

/// Most decimal digits any CI-V numeric field carries.
pub const MAX_DIGITS: usize = 20;

/// Split `value` into decimal digits, least-significant first.
///
/// Writes into `out` and returns the number of significant digits. Unused
/// slots are zeroed, so a short value reads as if padded with leading zeros.
/// Zero has no significant digits and returns `0`.
pub fn digits_le(value: u64, out: &mut [u8]) -> usize {
    out.fill(0);
    let mut count = 0;
    let mut remaining = value;
    while remaining > 0 && count < out.len() {
        out[count] = (remaining % 10) as u8;
        remaining /= 10;
        count += 1;
    }
    count
}

/// Pack a low-first digit stream into bytes, two digits per byte.
///
/// The first digit of each pair goes in the low nibble.
/// For example `[0, 0, 0, 0, 2, 8]` packs to `[0x00, 0x00, 0x82]`.
pub fn pack_le(digits: &[u8]) -> Vec<u8> {
    digits
        .chunks(2)
        .map(|pair| pair[0] | pair.get(1).copied().unwrap_or(0) << 4)
        .collect()
}

/// Encode `value` as `count` BCD digits starting at digit index `first`.
///
/// `first = 0` starts at the units digit. `count` must be even.
pub fn encode_digits_le(value: u64, count: usize, first: usize) -> Vec<u8> {
    let mut digits = [0u8; MAX_DIGITS];
    digits_le(value, &mut digits);
    let end = (first + count).min(MAX_DIGITS);
    pack_le(&digits[first.min(end)..end])
}

/// Encode `value` as exactly `count` big-endian BCD digits.
///
/// Unlike [`encode_digits_le`] the digit count is a contract: a value with
/// more or fewer significant digits is rejected instead of being padded or
/// truncated.
pub fn encode_digits_exact_be(value: u64, count: usize) -> Result<Vec<u8>> {
    let mut digits = [0u8; MAX_DIGITS];
    let actual = digits_le(value, &mut digits);
    if actual != count {
        return Err(CivError::DigitCount {
            expected: count,
            actual,
            value,
        });
    }
    let mut reversed = digits[..count].to_vec();
    reversed.reverse();
    Ok(reversed
        .chunks(2)
        .map(|pair| pair[0] << 4 | pair.get(1).copied().unwrap_or(0))
        .collect())
}

/// Weighted sum of a low-first digit stream.
pub fn value_from_digits_le(digits: &[u8]) -> u64 {
    digits
        .iter()
        .rev()
        .fold(0u64, |acc, &d| acc * 10 + u64::from(d))
}

/// Parse a single nibble character as a decimal digit.
pub fn parse_digit(binding: &'static str, text: &str) -> Result<u8> {
    let mut chars = text.chars();
    match (chars.next().and_then(|c| c.to_digit(10)), chars.next()) {
        (Some(d), None) => Ok(d as u8),
        _ => Err(CivError::InvalidDigit {
            binding,
            text: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_le() {
        let mut out = [0u8; 10];
        assert_eq!(digits_le(146_820_000, &mut out), 9);
        assert_eq!(out, [0, 0, 0, 0, 2, 8, 6, 4, 1, 0]);
    }

    #[test]
    fn test_digits_le_zero() {
        let mut out = [9u8; 4];
        assert_eq!(digits_le(0, &mut out), 0);
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_frequency_digits() {
        // 146.820.000 Hz packs to 00 00 82 46 01
        assert_eq!(
            encode_digits_le(146_820_000, 10, 0),
            vec![0x00, 0x00, 0x82, 0x46, 0x01]
        );
    }

    #[test]
    fn test_encode_uhf_digits() {
        assert_eq!(
            encode_digits_le(430_250_000, 10, 0),
            vec![0x00, 0x00, 0x25, 0x30, 0x04]
        );
    }

    #[test]
    fn test_encode_offset_skips_low_digits() {
        // 600 kHz from the 100 Hz digit: 00 60 00
        assert_eq!(encode_digits_le(600_000, 6, 2), vec![0x00, 0x60, 0x00]);
        // 5 MHz: 00 00 05
        assert_eq!(encode_digits_le(5_000_000, 6, 2), vec![0x00, 0x00, 0x05]);
    }

    #[test]
    fn test_encode_tone_reversed() {
        assert_eq!(encode_digits_exact_be(1035, 4).unwrap(), vec![0x10, 0x35]);
        assert_eq!(encode_digits_exact_be(1413, 4).unwrap(), vec![0x14, 0x13]);
    }

    #[test]
    fn test_encode_tone_digit_count() {
        assert!(encode_digits_exact_be(885, 4).is_err());
        assert!(encode_digits_exact_be(12_345, 4).is_err());
        assert!(encode_digits_exact_be(0, 4).is_err());
    }

    #[test]
    fn test_value_from_digits() {
        assert_eq!(value_from_digits_le(&[0, 0, 0, 0, 2, 8, 6, 4, 1, 0]), 146_820_000);
        assert_eq!(value_from_digits_le(&[]), 0);
    }

    #[test]
    fn test_parse_digit() {
        assert_eq!(parse_digit("1Hz", "7").unwrap(), 7);
        assert!(parse_digit("1Hz", "A").is_err());
        assert!(parse_digit("1Hz", "").is_err());
        assert!(parse_digit("1Hz", "12").is_err());
    }

    #[test]
    fn test_frequency_roundtrip() {
        // Unpack the nibble stream the way the decoder does and sum it back.
        for hz in [0u64, 1, 9, 10, 53_170_000, 146_820_000, 444_637_500, 999_999_999] {
            let packed = encode_digits_le(hz, 10, 0);
            let digits: Vec<u8> = packed.iter().flat_map(|b| [b & 0x0F, b >> 4]).collect();
            assert_eq!(value_from_digits_le(&digits), hz, "roundtrip failed for {hz}");
        }
    }

    #[test]
    fn test_frequency_roundtrip_stride() {
        let mut hz = 0u64;
        while hz <= 999_999_999 {
            let packed = encode_digits_le(hz, 10, 0);
            let digits: Vec<u8> = packed.iter().flat_map(|b| [b & 0x0F, b >> 4]).collect();
            assert_eq!(value_from_digits_le(&digits), hz);
            hz += 7_919_111;
        }
    }
}
