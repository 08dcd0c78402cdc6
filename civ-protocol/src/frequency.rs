use std::fmt;

use crate::bcd;
use crate::error::{CivError, Result};

/// Binding names of the ten frequency nibbles, least-significant first.
///
/// Index `i` carries weight `10^i` Hz.
pub const DIGIT_NAMES: [&str; 10] = [
    "1Hz", "10Hz", "100Hz", "1kHz", "10kHz", "100kHz", "1MHz", "10MHz", "100MHz", "1GHz",
];

/// Number of BCD digits in a CI-V frequency field.
pub const FREQ_DIGITS: usize = 10;

/// A radio frequency stored as Hz.
///
/// CI-V encodes frequencies as 5 BCD bytes in little-endian order,
/// giving 10 decimal digits with 1 Hz resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(u64);

impl Frequency {
    /// Create a `Frequency` from a value in Hz.
    pub fn from_hz(hz: u64) -> Result<Self> {
        if hz > 9_999_999_999 {
            return Err(CivError::FrequencyOutOfRange(hz));
        }
        Ok(Self(hz))
    }

    /// Return the frequency in Hz.
    pub fn hz(self) -> u64 {
        self.0
    }

    /// Encode the frequency to 5 CI-V BCD bytes (little-endian, 1 Hz resolution).
    pub fn to_civ_bytes(self) -> [u8; 5] {
        let packed = bcd::encode_digits_le(self.0, FREQ_DIGITS, 0);
        let mut arr = [0u8; 5];
        arr.copy_from_slice(&packed);
        arr
    }

    /// MHz text without trailing zeros, e.g. `146.4125` or `53.17`.
    pub fn mhz_text(self) -> String {
        let whole = self.0 / 1_000_000;
        let frac = self.0 % 1_000_000;
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{frac:06}");
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", self.mhz_text())
    }
}
